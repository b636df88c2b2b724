//! Manifest builder
//!
//! Enumerates the artifacts a mode is expected to produce and records the ones
//! that actually exist. Missing optional artifacts are left out; building a
//! manifest never fails.

use std::path::Path;

use motility_common::mode::{
    ManifestField, GRAPH_IMAGE, LABELED_FRAMES_DIR, SUMMARY_CSV,
};
use motility_common::{ProcessingMode, ResultManifest};

/// Frame gallery image extensions
const FRAME_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg"];

/// Build a manifest for a finished session
pub async fn build_manifest(
    mode: ProcessingMode,
    session_id: &str,
    session_dir: &Path,
    ready_video: Option<&Path>,
) -> ResultManifest {
    let profile = mode.profile();
    let mut manifest = ResultManifest::new(session_id, mode);

    for field in profile.fields {
        match field {
            ManifestField::Video => {
                if let Some(name) = ready_video.and_then(|p| p.file_name()).and_then(|n| n.to_str()) {
                    if is_file(&session_dir.join(name)).await {
                        manifest.video = Some(manifest.url_for(name));
                    }
                }
            }
            ManifestField::LabeledFramesDir => {
                if is_dir(&session_dir.join(LABELED_FRAMES_DIR)).await {
                    manifest.labeled_frames_dir = Some(manifest.url_for(LABELED_FRAMES_DIR));
                }
            }
            ManifestField::FrameFiles => {
                manifest.frame_files = list_frames(&session_dir.join(LABELED_FRAMES_DIR)).await;
            }
            ManifestField::RawTracksCsv => {
                manifest.raw_tracks_csv = existing_url(&manifest, session_dir, profile.tracks_csv).await;
            }
            ManifestField::FilteredTracksCsv => {
                manifest.filtered_tracks_csv =
                    existing_url(&manifest, session_dir, profile.filtered_csv).await;
            }
            ManifestField::SummaryCsv => {
                manifest.summary_csv = existing_url(&manifest, session_dir, Some(SUMMARY_CSV)).await;
            }
            ManifestField::Graph => {
                manifest.graph = existing_url(&manifest, session_dir, Some(GRAPH_IMAGE)).await;
            }
        }
    }

    tracing::debug!(
        session_id = %session_id,
        mode = %mode,
        artifacts = manifest.urls().len(),
        frames = manifest.frame_files.as_ref().map(Vec::len).unwrap_or(0),
        "Manifest built"
    );
    manifest
}

async fn existing_url(
    manifest: &ResultManifest,
    session_dir: &Path,
    name: Option<&str>,
) -> Option<String> {
    let name = name?;
    if is_file(&session_dir.join(name)).await {
        Some(manifest.url_for(name))
    } else {
        tracing::debug!(session_id = %manifest.session_id, artifact = name, "Expected artifact missing");
        None
    }
}

/// Sorted image names in the frames directory, or `None` if it is absent
async fn list_frames(frames_dir: &Path) -> Option<Vec<String>> {
    let mut entries = tokio::fs::read_dir(frames_dir).await.ok()?;
    let mut frames = Vec::new();
    while let Ok(Some(entry)) = entries.next_entry().await {
        let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
        let Some(name) = entry.file_name().to_str().map(str::to_string) else {
            continue;
        };
        if is_file && is_frame_image(&name) {
            frames.push(name);
        }
    }
    frames.sort();
    Some(frames)
}

fn is_frame_image(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| FRAME_EXTENSIONS.iter().any(|x| e.eq_ignore_ascii_case(x)))
        .unwrap_or(false)
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_file()).unwrap_or(false)
}

async fn is_dir(path: &Path) -> bool {
    tokio::fs::metadata(path).await.map(|m| m.is_dir()).unwrap_or(false)
}
