//! Graph regenerator
//!
//! Re-plots a finished session's tracking data with a caller-chosen track
//! limit. The plotting worker writes to a hidden temporary file which is then
//! renamed over `graph_custom.png`, so readers see either the old image or the
//! new one.

use std::path::Path;
use std::sync::Arc;

use motility_common::config::WorkerConfig;
use motility_common::manifest::session_url;
use motility_common::mode::CUSTOM_GRAPH_IMAGE;
use motility_common::time::next_token;
use motility_common::ProcessingMode;

use crate::error::PipelineError;
use crate::services::job_runner::{ExternalJob, JobRunner};
use crate::services::session_store::SessionStore;

/// Renders custom graphs for existing sessions
#[derive(Clone)]
pub struct GraphRegenerator {
    sessions: SessionStore,
    runner: Arc<dyn JobRunner>,
    workers: Arc<WorkerConfig>,
}

impl GraphRegenerator {
    pub fn new(sessions: SessionStore, runner: Arc<dyn JobRunner>, workers: Arc<WorkerConfig>) -> Self {
        Self {
            sessions,
            runner,
            workers,
        }
    }

    /// `<interpreter> <graph_script> <csv> <png> <limit>`
    pub fn job_for(&self, csv: &Path, png: &Path, limit: u32) -> ExternalJob {
        ExternalJob::new("graph", self.workers.interpreter.clone())
            .path_arg(&self.workers.graph_script)
            .path_arg(csv)
            .path_arg(png)
            .arg(limit.to_string())
            .timeout(self.workers.timeout)
    }

    /// Re-plot and return the graph URL with a fresh cache-busting token
    pub async fn regenerate(
        &self,
        session_id: &str,
        limit: u32,
        mode: ProcessingMode,
    ) -> Result<String, PipelineError> {
        if limit == 0 {
            return Err(PipelineError::Validation(
                "limit must be a positive integer".to_string(),
            ));
        }

        let session = self.sessions.open(session_id).await?;

        let csv = session.dir.join(mode.graph_source_csv());
        if !tokio::fs::metadata(&csv).await.map(|m| m.is_file()).unwrap_or(false) {
            tracing::warn!(
                session_id = %session_id,
                mode = %mode,
                csv = %csv.display(),
                "No tracking data to plot"
            );
            return Err(PipelineError::NotFound(format!(
                "Tracking data not found for session {} ({})",
                session_id, mode
            )));
        }

        let token = next_token();
        let staging = session.dir.join(format!(".graph_custom-{}.png", token));
        let target = session.dir.join(CUSTOM_GRAPH_IMAGE);
        let job = self.job_for(&csv, &staging, limit);
        tracing::info!(
            session_id = %session_id,
            mode = %mode,
            limit,
            command = %job.command_line(),
            "Regenerating graph"
        );

        let output = match self.runner.run(&job).await {
            Ok(output) => output,
            Err(e) => {
                tracing::error!(
                    session_id = %session_id,
                    command = %e.command(),
                    error = %e,
                    stderr = %e.stderr(),
                    "Graph worker failed"
                );
                remove_staging(&staging).await;
                return Err(PipelineError::Worker {
                    command: job.command_line(),
                    message: e.to_string(),
                    stderr: e.stderr().to_string(),
                });
            }
        };

        if let Err(e) = tokio::fs::rename(&staging, &target).await {
            remove_staging(&staging).await;
            return Err(PipelineError::Worker {
                command: job.command_line(),
                message: format!("Graph worker produced no image: {}", e),
                stderr: output.stderr,
            });
        }

        tracing::info!(
            session_id = %session_id,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "Custom graph written"
        );

        Ok(graph_url(session_id, &token))
    }
}

fn graph_url(session_id: &str, token: &str) -> String {
    format!("{}/{}?t={}", session_url(session_id), CUSTOM_GRAPH_IMAGE, token)
}

async fn remove_staging(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != std::io::ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove staging graph");
        }
    }
}
