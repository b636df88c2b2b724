//! Result manifest returned to the uploader

use serde::{Deserialize, Serialize};

use crate::ProcessingMode;

/// Session-relative URLs of every artifact a pipeline run produced
///
/// Fields are filled in as stages complete. Anything missing on disk stays
/// `None` and is left out of the JSON entirely.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultManifest {
    pub session_id: String,
    pub result_dir: String,
    pub mode: ProcessingMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub video: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub labeled_frames_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame_files: Option<Vec<String>>,
    #[serde(rename = "rawTracksCSV", default, skip_serializing_if = "Option::is_none")]
    pub raw_tracks_csv: Option<String>,
    #[serde(rename = "filteredTracksCSV", default, skip_serializing_if = "Option::is_none")]
    pub filtered_tracks_csv: Option<String>,
    #[serde(rename = "summaryCSV", default, skip_serializing_if = "Option::is_none")]
    pub summary_csv: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub zip: Option<String>,
}

impl ResultManifest {
    /// Empty manifest for a session; artifact fields start out absent
    pub fn new(session_id: impl Into<String>, mode: ProcessingMode) -> Self {
        let session_id = session_id.into();
        Self {
            result_dir: session_url(&session_id),
            session_id,
            mode,
            video: None,
            labeled_frames_dir: None,
            frame_files: None,
            raw_tracks_csv: None,
            filtered_tracks_csv: None,
            summary_csv: None,
            graph: None,
            zip: None,
        }
    }

    /// URL of a file relative to this session
    pub fn url_for(&self, name: &str) -> String {
        format!("{}/{}", self.result_dir, name)
    }

    /// All artifact URLs currently set (frame names are relative to the frames dir)
    pub fn urls(&self) -> Vec<&str> {
        [
            &self.video,
            &self.labeled_frames_dir,
            &self.raw_tracks_csv,
            &self.filtered_tracks_csv,
            &self.summary_csv,
            &self.graph,
            &self.zip,
        ]
        .into_iter()
        .filter_map(|field| field.as_deref())
        .collect()
    }
}

/// Base URL of a session's directory
pub fn session_url(session_id: &str) -> String {
    format!("/sessions/{}", session_id)
}
