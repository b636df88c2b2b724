//! Archive builder
//!
//! Bundles a session's top-level artifacts and its labeled frames into a zip.
//! The archive is written under a temporary name and renamed only after the
//! writer is finished and synced, so `results.zip` is either absent or
//! complete.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use motility_common::config::StorageConfig;
use motility_common::mode::{ARCHIVE_NAME, LABELED_FRAMES_DIR};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::PipelineError;

/// Builds `results.zip` for a session
#[derive(Debug, Clone)]
pub struct ArchiveBuilder {
    storage: Arc<StorageConfig>,
}

impl ArchiveBuilder {
    pub fn new(storage: Arc<StorageConfig>) -> Self {
        Self { storage }
    }

    /// Write the archive and return its path once it is durable on disk
    pub async fn bundle(&self, session_dir: &Path) -> Result<PathBuf, PipelineError> {
        let storage = self.storage.clone();
        let dir = session_dir.to_path_buf();
        tokio::task::spawn_blocking(move || write_archive(&storage, &dir))
            .await
            .map_err(|e| PipelineError::Storage(format!("Archive task failed: {}", e)))?
    }
}

fn write_archive(storage: &StorageConfig, session_dir: &Path) -> Result<PathBuf, PipelineError> {
    let final_path = session_dir.join(ARCHIVE_NAME);
    let part_path = session_dir.join(format!("{}.part", ARCHIVE_NAME));

    let result = write_entries(storage, session_dir, &part_path);
    let entries = match result {
        Ok(entries) => entries,
        Err(e) => {
            let _ = std::fs::remove_file(&part_path);
            return Err(e);
        }
    };

    std::fs::rename(&part_path, &final_path)
        .map_err(|e| PipelineError::storage("finalize archive", e))?;

    tracing::info!(archive = %final_path.display(), entries, "Archive written");
    Ok(final_path)
}

fn write_entries(
    storage: &StorageConfig,
    session_dir: &Path,
    part_path: &Path,
) -> Result<usize, PipelineError> {
    let file = File::create(part_path).map_err(|e| PipelineError::storage("create archive", e))?;
    let mut zip = ZipWriter::new(BufWriter::new(file));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .compression_level(Some(9));
    let mut entries = 0;

    let mut top_level: Vec<(String, PathBuf)> = std::fs::read_dir(session_dir)
        .map_err(|e| PipelineError::storage("read session dir", e))?
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().map(|t| t.is_file()).unwrap_or(false))
        .filter_map(|entry| {
            let name = entry.file_name().to_str()?.to_string();
            storage.is_archivable(&name).then(|| (name, entry.path()))
        })
        .collect();
    top_level.sort();

    for (name, path) in top_level {
        add_file(&mut zip, &name, &path, options)?;
        entries += 1;
    }

    let frames_dir = session_dir.join(LABELED_FRAMES_DIR);
    if frames_dir.is_dir() {
        for entry in WalkDir::new(&frames_dir).sort_by_file_name() {
            let entry = entry.map_err(|e| PipelineError::Storage(format!("walk frames: {}", e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let relative = entry
                .path()
                .strip_prefix(session_dir)
                .map_err(|e| PipelineError::Storage(e.to_string()))?;
            let name = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            add_file(&mut zip, &name, entry.path(), options)?;
            entries += 1;
        }
    }

    let mut writer = zip
        .finish()
        .map_err(|e| PipelineError::Storage(format!("finish archive: {}", e)))?;
    writer
        .flush()
        .map_err(|e| PipelineError::storage("flush archive", e))?;
    let file = writer
        .into_inner()
        .map_err(|e| PipelineError::storage("flush archive", e.into_error()))?;
    file.sync_all()
        .map_err(|e| PipelineError::storage("sync archive", e))?;

    Ok(entries)
}

fn add_file<W: Write + std::io::Seek>(
    zip: &mut ZipWriter<W>,
    name: &str,
    path: &Path,
    options: SimpleFileOptions,
) -> Result<(), PipelineError> {
    zip.start_file(name, options)
        .map_err(|e| PipelineError::Storage(format!("add {}: {}", name, e)))?;
    let mut source =
        File::open(path).map_err(|e| PipelineError::storage(format!("open {}", path.display()), e))?;
    std::io::copy(&mut source, zip)
        .map_err(|e| PipelineError::storage(format!("compress {}", name), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use motility_common::config::StorageSection;
    use std::io::Read;
    use tempfile::TempDir;

    fn builder(root: &Path) -> ArchiveBuilder {
        ArchiveBuilder::new(Arc::new(StorageConfig::from_root(root, &StorageSection::default())))
    }

    fn entry_names(path: &Path) -> Vec<String> {
        let archive = zip::ZipArchive::new(File::open(path).unwrap()).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_bundle_collects_allowed_files_and_frames() {
        let temp = TempDir::new().unwrap();
        let session = temp.path().join("sessions/1");
        std::fs::create_dir_all(session.join("labeled_frames")).unwrap();
        std::fs::create_dir_all(session.join("frames")).unwrap();
        std::fs::write(session.join("tracked_video_ready.mp4"), b"video").unwrap();
        std::fs::write(session.join("final_summary.csv"), b"a,b\n1,2\n").unwrap();
        std::fs::write(session.join("graph.png"), b"png").unwrap();
        std::fs::write(session.join("sort_input.txt"), b"skip me").unwrap();
        std::fs::write(session.join("frames/raw_0001.png"), b"skip me").unwrap();
        std::fs::write(session.join("labeled_frames/frame_0001.png"), b"f1").unwrap();

        let path = builder(temp.path()).bundle(&session).await.unwrap();

        assert_eq!(path, session.join("results.zip"));
        assert!(!session.join("results.zip.part").exists());
        assert_eq!(
            entry_names(&path),
            vec![
                "final_summary.csv",
                "graph.png",
                "labeled_frames/frame_0001.png",
                "tracked_video_ready.mp4",
            ]
        );

        let mut archive = zip::ZipArchive::new(File::open(&path).unwrap()).unwrap();
        let mut csv = String::new();
        archive
            .by_name("final_summary.csv")
            .unwrap()
            .read_to_string(&mut csv)
            .unwrap();
        assert_eq!(csv, "a,b\n1,2\n");
    }

    #[tokio::test]
    async fn test_rebundle_does_not_include_previous_archive() {
        let temp = TempDir::new().unwrap();
        let session = temp.path().join("s");
        std::fs::create_dir_all(&session).unwrap();
        std::fs::write(session.join("a.csv"), b"1").unwrap();

        let builder = builder(temp.path());
        builder.bundle(&session).await.unwrap();
        let path = builder.bundle(&session).await.unwrap();

        assert_eq!(entry_names(&path), vec!["a.csv"]);
    }

    #[tokio::test]
    async fn test_missing_session_dir_fails_without_archive() {
        let temp = TempDir::new().unwrap();
        let session = temp.path().join("absent");

        let err = builder(temp.path()).bundle(&session).await.unwrap_err();
        assert!(matches!(err, PipelineError::Storage(_)));
        assert!(!session.join("results.zip").exists());
    }
}
