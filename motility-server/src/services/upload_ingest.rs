//! Upload ingest
//!
//! Validates the submitted file name against the allowed extensions and
//! streams the body into the uploads root. Stored names are
//! `<token>-<sanitized original name>`; the asset is never touched again after
//! ingest except to discard it when the request is rejected.

use std::path::PathBuf;
use std::sync::Arc;

use motility_common::config::StorageConfig;
use motility_common::time::next_token;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::PipelineError;

/// A persisted upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredAsset {
    /// Absolute path handed to the analysis worker
    pub path: PathBuf,
    /// Name the client submitted
    pub original_name: String,
    pub stored_name: String,
    pub size: u64,
}

impl StoredAsset {
    /// Remove the asset after the request was rejected
    pub async fn discard(self) {
        if let Err(e) = tokio::fs::remove_file(&self.path).await {
            tracing::warn!(path = %self.path.display(), error = %e, "Failed to discard upload");
        }
    }
}

/// Upload being written to disk
///
/// Until `finish` renames it, the `.part` file belongs to this value: dropping
/// it (a client that disconnects mid-body drops the handler future) removes
/// the partial file.
pub struct PendingUpload {
    file: Option<File>,
    part_path: PathBuf,
    final_path: PathBuf,
    original_name: String,
    stored_name: String,
    size: u64,
    max_bytes: usize,
    armed: bool,
}

impl PendingUpload {
    pub async fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), PipelineError> {
        self.size += chunk.len() as u64;
        if self.size > self.max_bytes as u64 {
            return Err(PipelineError::Validation(format!(
                "Upload exceeds {} bytes",
                self.max_bytes
            )));
        }
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| PipelineError::Storage("upload already closed".to_string()))?;
        file.write_all(chunk)
            .await
            .map_err(|e| PipelineError::storage("write upload", e))
    }

    /// Flush and move the upload to its final name
    pub async fn finish(mut self) -> Result<StoredAsset, PipelineError> {
        if let Some(mut file) = self.file.take() {
            file.flush()
                .await
                .map_err(|e| PipelineError::storage("flush upload", e))?;
            file.sync_all()
                .await
                .map_err(|e| PipelineError::storage("sync upload", e))?;
        }

        tokio::fs::rename(&self.part_path, &self.final_path)
            .await
            .map_err(|e| PipelineError::storage("finalize upload", e))?;
        self.armed = false;

        let path = tokio::fs::canonicalize(&self.final_path)
            .await
            .unwrap_or_else(|_| self.final_path.clone());

        tracing::info!(
            stored = %self.stored_name,
            original = %self.original_name,
            bytes = self.size,
            "Upload stored"
        );

        Ok(StoredAsset {
            path,
            original_name: std::mem::take(&mut self.original_name),
            stored_name: std::mem::take(&mut self.stored_name),
            size: self.size,
        })
    }

    /// Drop the partial file
    pub async fn abort(mut self) {
        self.file.take();
        self.armed = false;
        if let Err(e) = tokio::fs::remove_file(&self.part_path).await {
            tracing::warn!(path = %self.part_path.display(), error = %e, "Failed to remove partial upload");
        }
    }
}

impl Drop for PendingUpload {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        self.file.take();
        match std::fs::remove_file(&self.part_path) {
            Ok(()) => {
                tracing::debug!(path = %self.part_path.display(), "Abandoned upload removed");
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!(path = %self.part_path.display(), error = %e, "Failed to remove abandoned upload");
            }
        }
    }
}

/// Accepts uploads into the uploads root
#[derive(Debug, Clone)]
pub struct UploadIngest {
    storage: Arc<StorageConfig>,
}

impl UploadIngest {
    pub fn new(storage: Arc<StorageConfig>) -> Self {
        Self { storage }
    }

    /// Validate the submitted name and open a collision-free destination
    pub async fn begin(&self, submitted_name: Option<&str>) -> Result<PendingUpload, PipelineError> {
        let original_name = submitted_name
            .map(base_name)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| PipelineError::Validation("Missing file".to_string()))?;

        // Suffix check only; content is never sniffed
        if !self.storage.is_allowed_upload(&original_name) {
            return Err(PipelineError::Validation(format!(
                "File type not allowed: {} (allowed: {})",
                original_name,
                self.storage.allowed_extensions.join(", ")
            )));
        }

        tokio::fs::create_dir_all(&self.storage.uploads_root)
            .await
            .map_err(|e| PipelineError::storage("create uploads dir", e))?;

        let stored_name = format!("{}-{}", next_token(), sanitize_name(&original_name));
        let final_path = self.storage.uploads_root.join(&stored_name);
        let part_path = self.storage.uploads_root.join(format!("{}.part", stored_name));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&part_path)
            .await
            .map_err(|e| PipelineError::storage(format!("create {}", part_path.display()), e))?;

        Ok(PendingUpload {
            file: Some(file),
            part_path,
            final_path,
            original_name,
            stored_name,
            size: 0,
            max_bytes: self.storage.max_upload_bytes,
            armed: true,
        })
    }

    /// Ingest an in-memory file
    pub async fn ingest(
        &self,
        submitted_name: Option<&str>,
        bytes: &[u8],
    ) -> Result<StoredAsset, PipelineError> {
        let mut pending = self.begin(submitted_name).await?;
        if let Err(e) = pending.write_chunk(bytes).await {
            pending.abort().await;
            return Err(e);
        }
        pending.finish().await
    }
}

/// Last path component of a client-supplied name
fn base_name(name: &str) -> String {
    name.rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or_default()
        .trim()
        .to_string()
}

/// Replace every whitespace run with a single underscore
pub fn sanitize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut in_space = false;
    for c in name.chars() {
        if c.is_whitespace() {
            if !in_space {
                out.push('_');
            }
            in_space = true;
        } else {
            out.push(c);
            in_space = false;
        }
    }
    out
}
