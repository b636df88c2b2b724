//! Output normalizer
//!
//! Re-encodes the worker's raw video with the index moved to the head of the
//! file, so players can start range-based playback before the download ends.
//! The output name is the raw name with `_ready` before the extension.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use motility_common::config::WorkerConfig;
use motility_common::mode::ready_name;

use crate::error::PipelineError;
use crate::services::job_runner::{ExternalJob, JobRunner};

/// Fast-start transcoding
#[derive(Clone)]
pub struct OutputNormalizer {
    runner: Arc<dyn JobRunner>,
    workers: Arc<WorkerConfig>,
}

impl OutputNormalizer {
    pub fn new(runner: Arc<dyn JobRunner>, workers: Arc<WorkerConfig>) -> Self {
        Self { runner, workers }
    }

    /// Deterministic output path for a raw video
    pub fn ready_path(raw: &Path) -> Result<PathBuf, PipelineError> {
        let name = raw
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| PipelineError::Transcode {
                message: format!("Invalid video path: {}", raw.display()),
                stderr: String::new(),
            })?;
        Ok(raw.with_file_name(ready_name(name)))
    }

    pub fn job_for(&self, raw: &Path, ready: &Path) -> ExternalJob {
        ExternalJob::new("normalize", self.workers.transcoder.clone())
            .arg("-y")
            .arg("-i")
            .path_arg(raw)
            .arg("-c:v")
            .arg("libx264")
            .arg("-c:a")
            .arg("aac")
            .arg("-movflags")
            .arg("+faststart")
            .path_arg(ready)
            .timeout(self.workers.timeout)
    }

    /// Produce the streaming-ready copy of `raw`
    pub async fn normalize(&self, raw: &Path) -> Result<PathBuf, PipelineError> {
        if !tokio::fs::try_exists(raw).await.unwrap_or(false) {
            tracing::error!(raw = %raw.display(), "Raw video missing after worker run");
            return Err(PipelineError::Transcode {
                message: format!("Raw video not produced: {}", raw.display()),
                stderr: String::new(),
            });
        }

        let ready = Self::ready_path(raw)?;
        let job = self.job_for(raw, &ready);

        let output = self.runner.run(&job).await.map_err(|e| {
            tracing::error!(
                command = %e.command(),
                error = %e,
                "Fast-start normalization failed"
            );
            PipelineError::Transcode {
                message: e.to_string(),
                stderr: e.stderr().to_string(),
            }
        })?;

        if !tokio::fs::try_exists(&ready).await.unwrap_or(false) {
            return Err(PipelineError::Transcode {
                message: format!("Transcoder produced no output: {}", ready.display()),
                stderr: output.stderr,
            });
        }

        tracing::info!(
            ready = %ready.display(),
            elapsed_ms = output.elapsed.as_millis() as u64,
            "Video normalized for streaming"
        );
        Ok(ready)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::job_runner::{JobError, JobOutput};
    use async_trait::async_trait;
    use motility_common::config::WorkerSection;
    use tempfile::TempDir;

    /// Copies input to output like a successful transcode
    struct CopyRunner;

    #[async_trait]
    impl JobRunner for CopyRunner {
        async fn run(&self, job: &ExternalJob) -> Result<JobOutput, JobError> {
            let input = &job.args[2];
            let output = job.args.last().unwrap();
            std::fs::copy(input, output).unwrap();
            Ok(JobOutput::default())
        }
    }

    struct FailingRunner;

    #[async_trait]
    impl JobRunner for FailingRunner {
        async fn run(&self, job: &ExternalJob) -> Result<JobOutput, JobError> {
            Err(JobError::Failed {
                command: job.command_line(),
                code: Some(1),
                stdout: String::new(),
                stderr: "moov atom not found".to_string(),
            })
        }
    }

    fn workers() -> Arc<WorkerConfig> {
        Arc::new(WorkerConfig::from(&WorkerSection::default()))
    }

    #[test]
    fn test_ready_path_is_deterministic() {
        let ready = OutputNormalizer::ready_path(Path::new("/s/1/tracked_video.mp4")).unwrap();
        assert_eq!(ready, PathBuf::from("/s/1/tracked_video_ready.mp4"));
        assert_eq!(
            OutputNormalizer::ready_path(Path::new("/s/1/tracked_video.mp4")).unwrap(),
            ready
        );
    }

    #[test]
    fn test_job_moves_index_to_front() {
        let normalizer = OutputNormalizer::new(Arc::new(CopyRunner), workers());
        let job = normalizer.job_for(Path::new("in.mp4"), Path::new("out.mp4"));
        assert_eq!(
            job.command_line(),
            "ffmpeg -y -i in.mp4 -c:v libx264 -c:a aac -movflags +faststart out.mp4"
        );
    }

    #[tokio::test]
    async fn test_normalize_produces_ready_file() {
        let temp = TempDir::new().unwrap();
        let raw = temp.path().join("labeled_video.mp4");
        std::fs::write(&raw, b"raw-bytes").unwrap();

        let normalizer = OutputNormalizer::new(Arc::new(CopyRunner), workers());
        let ready = normalizer.normalize(&raw).await.unwrap();

        assert_eq!(ready, temp.path().join("labeled_video_ready.mp4"));
        assert!(ready.is_file());
    }

    #[tokio::test]
    async fn test_missing_raw_video_is_transcode_error() {
        let temp = TempDir::new().unwrap();
        let normalizer = OutputNormalizer::new(Arc::new(CopyRunner), workers());

        let err = normalizer
            .normalize(&temp.path().join("labeled_video.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Transcode { .. }));
    }

    #[tokio::test]
    async fn test_tool_failure_is_transcode_error() {
        let temp = TempDir::new().unwrap();
        let raw = temp.path().join("tracked_video.mp4");
        std::fs::write(&raw, b"garbage").unwrap();

        let normalizer = OutputNormalizer::new(Arc::new(FailingRunner), workers());
        match normalizer.normalize(&raw).await {
            Err(PipelineError::Transcode { stderr, .. }) => {
                assert_eq!(stderr, "moov atom not found");
            }
            other => panic!("expected transcode error, got {:?}", other),
        }
    }
}
