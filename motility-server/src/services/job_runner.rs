//! External job execution
//!
//! Analysis scripts, the plotting script and the transcoder are all opaque
//! processes: a program, positional arguments and an exit status. An
//! [`ExternalJob`] describes one invocation; a [`JobRunner`] executes it.
//! [`ProcessRunner`] is the real implementation; tests substitute fakes.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::process::Command;
use tokio::sync::Semaphore;

/// Job runner errors
#[derive(Debug, Error)]
pub enum JobError {
    /// Program could not be started
    #[error("Failed to spawn {command}: {message}")]
    Spawn { command: String, message: String },

    /// Program ran past its deadline and was killed
    #[error("{command} timed out after {}s", .timeout.as_secs())]
    TimedOut { command: String, timeout: Duration },

    /// Program exited unsuccessfully
    #[error("{command} exited with {}", describe_exit(.code))]
    Failed {
        command: String,
        code: Option<i32>,
        stdout: String,
        stderr: String,
    },
}

fn describe_exit(code: &Option<i32>) -> String {
    match code {
        Some(code) => format!("status {}", code),
        None => "signal".to_string(),
    }
}

impl JobError {
    /// Captured standard error, if the program got far enough to write any
    pub fn stderr(&self) -> &str {
        match self {
            JobError::Failed { stderr, .. } => stderr,
            _ => "",
        }
    }

    pub fn command(&self) -> &str {
        match self {
            JobError::Spawn { command, .. }
            | JobError::TimedOut { command, .. }
            | JobError::Failed { command, .. } => command,
        }
    }
}

/// One invocation of an external program
#[derive(Debug, Clone)]
pub struct ExternalJob {
    /// Short name for logs ("dispatch", "normalize", "graph")
    pub label: &'static str,
    pub program: OsString,
    pub args: Vec<OsString>,
    pub timeout: Option<Duration>,
}

impl ExternalJob {
    pub fn new(label: &'static str, program: impl Into<OsString>) -> Self {
        Self {
            label,
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.as_os_str().to_os_string())
    }

    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Printable command line for logs and error reports
    pub fn command_line(&self) -> String {
        std::iter::once(&self.program)
            .chain(self.args.iter())
            .map(|part| {
                let text = part.to_string_lossy();
                if text.contains(char::is_whitespace) {
                    format!("\"{}\"", text)
                } else {
                    text.into_owned()
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Output of a successful job
#[derive(Debug, Clone, Default)]
pub struct JobOutput {
    pub stdout: String,
    pub stderr: String,
    pub elapsed: Duration,
}

/// Executes external jobs to completion
#[async_trait]
pub trait JobRunner: Send + Sync {
    /// Run the job, blocking the caller until it exits
    async fn run(&self, job: &ExternalJob) -> Result<JobOutput, JobError>;
}

/// Runs jobs as child processes
///
/// A shared semaphore bounds how many children run at once; callers beyond
/// the limit wait for a slot.
#[derive(Debug, Clone)]
pub struct ProcessRunner {
    slots: Arc<Semaphore>,
}

impl ProcessRunner {
    pub fn new(max_concurrent_jobs: usize) -> Self {
        Self {
            slots: Arc::new(Semaphore::new(max_concurrent_jobs.max(1))),
        }
    }
}

#[async_trait]
impl JobRunner for ProcessRunner {
    async fn run(&self, job: &ExternalJob) -> Result<JobOutput, JobError> {
        let command = job.command_line();

        let _slot = self
            .slots
            .clone()
            .acquire_owned()
            .await
            .map_err(|e| JobError::Spawn {
                command: command.clone(),
                message: e.to_string(),
            })?;

        tracing::debug!(job = job.label, command = %command, "Spawning external job");
        let started = Instant::now();

        let child = Command::new(&job.program)
            .args(&job.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| JobError::Spawn {
                command: command.clone(),
                message: e.to_string(),
            })?;

        let output = match job.timeout {
            Some(limit) => match tokio::time::timeout(limit, child.wait_with_output()).await {
                Ok(result) => result,
                Err(_) => {
                    // Dropping the wait future kills the child
                    return Err(JobError::TimedOut {
                        command,
                        timeout: limit,
                    });
                }
            },
            None => child.wait_with_output().await,
        }
        .map_err(|e| JobError::Spawn {
            command: command.clone(),
            message: e.to_string(),
        })?;

        let elapsed = started.elapsed();
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            return Err(JobError::Failed {
                command,
                code: output.status.code(),
                stdout,
                stderr,
            });
        }

        tracing::debug!(
            job = job.label,
            elapsed_ms = elapsed.as_millis() as u64,
            "External job completed"
        );

        Ok(JobOutput {
            stdout,
            stderr,
            elapsed,
        })
    }
}
