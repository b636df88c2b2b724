//! Process dispatcher
//!
//! Maps a processing mode to its worker script and runs it against a session
//! directory. This is the long pole of every upload: the call blocks until the
//! worker exits, with no progress reporting.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use motility_common::config::WorkerConfig;
use motility_common::ProcessingMode;

use crate::error::PipelineError;
use crate::services::job_runner::{ExternalJob, JobOutput, JobRunner};

/// Outcome of a successful worker run
#[derive(Debug, Clone)]
pub struct DispatchResult {
    /// Where the worker left its raw video
    pub raw_video: PathBuf,
    pub output: JobOutput,
}

/// Parse a client-supplied mode, rejecting anything outside the enumeration
pub fn resolve_mode(mode: Option<&str>) -> Result<ProcessingMode, PipelineError> {
    let mode = mode
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| PipelineError::Validation("Missing mode".to_string()))?;
    mode.parse::<ProcessingMode>().map_err(PipelineError::from)
}

/// Runs analysis workers
#[derive(Clone)]
pub struct ProcessDispatcher {
    runner: Arc<dyn JobRunner>,
    workers: Arc<WorkerConfig>,
}

impl ProcessDispatcher {
    pub fn new(runner: Arc<dyn JobRunner>, workers: Arc<WorkerConfig>) -> Self {
        Self { runner, workers }
    }

    /// Command for a mode: `<interpreter> <script> <asset> <session_dir>`
    pub fn job_for(&self, mode: ProcessingMode, asset: &Path, session_dir: &Path) -> ExternalJob {
        let script = self.workers.scripts_dir.join(mode.profile().worker_script);
        ExternalJob::new("dispatch", self.workers.interpreter.clone())
            .path_arg(&script)
            .path_arg(asset)
            .path_arg(session_dir)
            .timeout(self.workers.timeout)
    }

    /// Run the mode's worker and wait for it
    pub async fn dispatch(
        &self,
        mode: ProcessingMode,
        asset: &Path,
        session_dir: &Path,
    ) -> Result<DispatchResult, PipelineError> {
        let job = self.job_for(mode, asset, session_dir);
        let command = job.command_line();
        tracing::info!(mode = %mode, command = %command, "Dispatching analysis worker");

        let output = self.runner.run(&job).await.map_err(|e| {
            tracing::error!(
                mode = %mode,
                command = %command,
                error = %e,
                stderr = %e.stderr(),
                "Analysis worker failed"
            );
            PipelineError::Worker {
                command: command.clone(),
                message: e.to_string(),
                stderr: e.stderr().to_string(),
            }
        })?;

        tracing::info!(
            mode = %mode,
            elapsed_ms = output.elapsed.as_millis() as u64,
            "Analysis worker finished"
        );

        Ok(DispatchResult {
            raw_video: session_dir.join(mode.profile().raw_video),
            output,
        })
    }
}
