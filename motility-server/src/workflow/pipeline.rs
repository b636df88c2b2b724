//! Linear upload pipeline
//!
//! session → dispatch → normalize → manifest → archive. Each stage starts only
//! after the previous one finished. Dispatch and normalization failures abort
//! the run; an archive failure only drops the `zip` field.

use std::sync::Arc;
use std::time::Instant;

use motility_common::config::{StorageConfig, WorkerConfig};
use motility_common::mode::ARCHIVE_NAME;
use motility_common::{ProcessingMode, ResultManifest};

use crate::error::PipelineError;
use crate::services::{
    build_manifest, ArchiveBuilder, JobRunner, OutputNormalizer, ProcessDispatcher, SessionStore,
    StoredAsset,
};

/// Runs one upload through every stage
#[derive(Clone)]
pub struct Pipeline {
    sessions: SessionStore,
    dispatcher: ProcessDispatcher,
    normalizer: OutputNormalizer,
    archiver: ArchiveBuilder,
}

impl Pipeline {
    pub fn new(
        sessions: SessionStore,
        runner: Arc<dyn JobRunner>,
        workers: Arc<WorkerConfig>,
        storage: Arc<StorageConfig>,
    ) -> Self {
        Self {
            sessions,
            dispatcher: ProcessDispatcher::new(runner.clone(), workers.clone()),
            normalizer: OutputNormalizer::new(runner, workers),
            archiver: ArchiveBuilder::new(storage),
        }
    }

    /// Run the pipeline on its own task
    ///
    /// The worker keeps running to completion even if the caller (an HTTP
    /// request whose client went away) is dropped.
    pub async fn run_detached(
        &self,
        mode: ProcessingMode,
        asset: StoredAsset,
    ) -> Result<ResultManifest, PipelineError> {
        let pipeline = self.clone();
        tokio::spawn(async move { pipeline.run(mode, &asset).await })
            .await
            .map_err(|e| PipelineError::Storage(format!("Pipeline task failed: {}", e)))?
    }

    pub async fn run(
        &self,
        mode: ProcessingMode,
        asset: &StoredAsset,
    ) -> Result<ResultManifest, PipelineError> {
        let started = Instant::now();
        let session = self.sessions.create_session().await?;
        tracing::info!(
            session_id = %session.id,
            mode = %mode,
            asset = %asset.stored_name,
            "Pipeline started"
        );

        let dispatched = self
            .dispatcher
            .dispatch(mode, &asset.path, &session.dir)
            .await
            .inspect_err(|e| {
                tracing::error!(session_id = %session.id, mode = %mode, error = %e, "Dispatch failed");
            })?;
        if !dispatched.output.stdout.is_empty() {
            tracing::debug!(
                session_id = %session.id,
                stdout = %dispatched.output.stdout.trim_end(),
                "Worker output"
            );
        }

        let ready = self
            .normalizer
            .normalize(&dispatched.raw_video)
            .await
            .inspect_err(|e| {
                tracing::error!(session_id = %session.id, mode = %mode, error = %e, "Normalization failed");
            })?;

        let mut manifest = build_manifest(mode, &session.id, &session.dir, Some(&ready)).await;

        match self.archiver.bundle(&session.dir).await {
            Ok(_) => manifest.zip = Some(manifest.url_for(ARCHIVE_NAME)),
            Err(e) => {
                tracing::warn!(
                    session_id = %session.id,
                    error = %e,
                    "Archive failed, returning manifest without zip"
                );
            }
        }

        tracing::info!(
            session_id = %session.id,
            mode = %mode,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Pipeline finished"
        );
        Ok(manifest)
    }
}
