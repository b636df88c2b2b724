//! Processing modes and their lookup table
//!
//! Each mode maps to exactly one [`ModeProfile`]: the worker script that runs,
//! the raw video it leaves behind, the tracking data it writes and the
//! manifest fields it is expected to populate. Adding a mode is a new row in
//! [`PROFILES`], nothing else.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::Error;

/// Labeled frames subdirectory written by every worker
pub const LABELED_FRAMES_DIR: &str = "labeled_frames";
/// Summary table written by tracking workers
pub const SUMMARY_CSV: &str = "final_summary.csv";
/// Default graph written by tracking workers
pub const GRAPH_IMAGE: &str = "graph.png";
/// On-demand graph written by the graph regenerator
pub const CUSTOM_GRAPH_IMAGE: &str = "graph_custom.png";
/// Bundle of all session artifacts
pub const ARCHIVE_NAME: &str = "results.zip";
/// Unfiltered tracking data
pub const SIMPLE_TRACKS_CSV: &str = "simple_tracks.csv";
/// Tracking data after bad tracks are removed
pub const FILTERED_TRACKS_CSV: &str = "filtered_tracks.csv";

/// Analysis variant selected by the requester
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingMode {
    /// Per-frame detection only
    Detection,
    /// Tracking without removal of bad tracks
    #[serde(alias = "tracking-noisy", alias = "tracking_noisy", alias = "tracking-noise")]
    TrackingNoise,
    /// Tracking with bad tracks removed
    #[serde(alias = "tracking-filtered")]
    TrackingFiltered,
}

/// Manifest fields a mode populates on success
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ManifestField {
    Video,
    LabeledFramesDir,
    FrameFiles,
    RawTracksCsv,
    FilteredTracksCsv,
    SummaryCsv,
    Graph,
}

/// Static description of what a mode runs and produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModeProfile {
    pub mode: ProcessingMode,
    /// Worker script file name, resolved against the configured scripts dir
    pub worker_script: &'static str,
    /// Raw video file name the worker leaves in the session directory
    pub raw_video: &'static str,
    /// Unfiltered tracking data, if the mode tracks
    pub tracks_csv: Option<&'static str>,
    /// Filtered tracking data, if the mode filters
    pub filtered_csv: Option<&'static str>,
    /// Manifest fields populated on success
    pub fields: &'static [ManifestField],
}

const DETECTION_FIELDS: &[ManifestField] = &[
    ManifestField::Video,
    ManifestField::LabeledFramesDir,
    ManifestField::FrameFiles,
];

const TRACKING_NOISE_FIELDS: &[ManifestField] = &[
    ManifestField::Video,
    ManifestField::LabeledFramesDir,
    ManifestField::FrameFiles,
    ManifestField::RawTracksCsv,
    ManifestField::SummaryCsv,
    ManifestField::Graph,
];

const TRACKING_FILTERED_FIELDS: &[ManifestField] = &[
    ManifestField::Video,
    ManifestField::LabeledFramesDir,
    ManifestField::FrameFiles,
    ManifestField::RawTracksCsv,
    ManifestField::FilteredTracksCsv,
    ManifestField::SummaryCsv,
    ManifestField::Graph,
];

/// Mode lookup table
pub const PROFILES: [ModeProfile; 3] = [
    ModeProfile {
        mode: ProcessingMode::Detection,
        worker_script: "run_detection_only.py",
        raw_video: "labeled_video.mp4",
        tracks_csv: None,
        filtered_csv: None,
        fields: DETECTION_FIELDS,
    },
    ModeProfile {
        mode: ProcessingMode::TrackingNoise,
        worker_script: "run_tracking_noise.py",
        raw_video: "tracked_video.mp4",
        tracks_csv: Some(SIMPLE_TRACKS_CSV),
        filtered_csv: None,
        fields: TRACKING_NOISE_FIELDS,
    },
    ModeProfile {
        mode: ProcessingMode::TrackingFiltered,
        worker_script: "run_tracking_filtered.py",
        raw_video: "filtered_tracking_video.mp4",
        tracks_csv: Some(SIMPLE_TRACKS_CSV),
        filtered_csv: Some(FILTERED_TRACKS_CSV),
        fields: TRACKING_FILTERED_FIELDS,
    },
];

impl ProcessingMode {
    pub const ALL: [ProcessingMode; 3] = [
        ProcessingMode::Detection,
        ProcessingMode::TrackingNoise,
        ProcessingMode::TrackingFiltered,
    ];

    /// Wire name used in requests and manifests
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessingMode::Detection => "detection",
            ProcessingMode::TrackingNoise => "tracking_noise",
            ProcessingMode::TrackingFiltered => "tracking_filtered",
        }
    }

    /// Look up this mode's row in the profile table
    pub fn profile(&self) -> &'static ModeProfile {
        match self {
            ProcessingMode::Detection => &PROFILES[0],
            ProcessingMode::TrackingNoise => &PROFILES[1],
            ProcessingMode::TrackingFiltered => &PROFILES[2],
        }
    }

    /// Tracking data the graph regenerator plots for this mode
    ///
    /// Filtered sessions plot the filtered tracks; every other mode plots the
    /// unfiltered tracks (which detection sessions never produce).
    pub fn graph_source_csv(&self) -> &'static str {
        self.profile().filtered_csv.unwrap_or(SIMPLE_TRACKS_CSV)
    }
}

impl fmt::Display for ProcessingMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProcessingMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "detection" => Ok(ProcessingMode::Detection),
            "tracking_noise" | "tracking_noisy" | "tracking-noise" | "tracking-noisy" => {
                Ok(ProcessingMode::TrackingNoise)
            }
            "tracking_filtered" | "tracking-filtered" => Ok(ProcessingMode::TrackingFiltered),
            other => Err(Error::InvalidInput(format!(
                "Invalid processing mode: {:?}",
                other
            ))),
        }
    }
}

impl ModeProfile {
    pub fn has_field(&self, field: ManifestField) -> bool {
        self.fields.contains(&field)
    }

    /// Normalized video name: `_ready` inserted before the extension
    pub fn ready_video(&self) -> String {
        ready_name(self.raw_video)
    }
}

/// Derive the fast-start output name from a raw video name
pub fn ready_name(raw: &str) -> String {
    match raw.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => format!("{}_ready.{}", stem, ext),
        _ => format!("{}_ready", raw),
    }
}
