//! Session directories
//!
//! A session is one upload-to-results run. Its id is a token from the
//! store's clock (the process-wide one unless a test injects another) and
//! its directory is created with exclusive semantics,
//! so a directory is never handed to two sessions.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use motility_common::time::{token_clock, TokenClock};

use crate::error::PipelineError;

/// Fresh tokens tried before giving up on directory creation
const CREATE_ATTEMPTS: usize = 16;

/// A materialized session directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub dir: PathBuf,
}

/// Allocates and resolves session directories under a sessions root
#[derive(Debug, Clone)]
pub struct SessionStore {
    root: PathBuf,
    clock: &'static TokenClock,
}

impl SessionStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self::with_clock(root, token_clock())
    }

    pub fn with_clock(root: impl Into<PathBuf>, clock: &'static TokenClock) -> Self {
        Self {
            root: root.into(),
            clock,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create a never-before-used session directory
    pub async fn create_session(&self) -> Result<Session, PipelineError> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| PipelineError::storage(format!("create {}", self.root.display()), e))?;

        for _ in 0..CREATE_ATTEMPTS {
            let id = self.clock.next().to_string();
            let dir = self.root.join(&id);

            // create_dir (not create_dir_all) fails if the directory exists
            match tokio::fs::create_dir(&dir).await {
                Ok(()) => {
                    tracing::info!(session_id = %id, dir = %dir.display(), "Session created");
                    return Ok(Session { id, dir });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    tracing::warn!(session_id = %id, "Session directory already exists, retrying");
                    continue;
                }
                Err(e) => {
                    return Err(PipelineError::storage(
                        format!("create session dir {}", dir.display()),
                        e,
                    ));
                }
            }
        }

        Err(PipelineError::Storage(format!(
            "No free session id after {} attempts",
            CREATE_ATTEMPTS
        )))
    }

    /// Resolve an existing session by id
    ///
    /// Ids that could escape the sessions root resolve to not-found.
    pub async fn open(&self, session_id: &str) -> Result<Session, PipelineError> {
        if !is_valid_session_id(session_id) {
            return Err(PipelineError::NotFound(format!(
                "Session not found: {}",
                session_id
            )));
        }

        let dir = self.root.join(session_id);
        match tokio::fs::metadata(&dir).await {
            Ok(meta) if meta.is_dir() => Ok(Session {
                id: session_id.to_string(),
                dir,
            }),
            _ => Err(PipelineError::NotFound(format!(
                "Session not found: {}",
                session_id
            ))),
        }
    }
}

/// Session ids are decimal tokens, optionally with `-` separators
pub fn is_valid_session_id(session_id: &str) -> bool {
    !session_id.is_empty()
        && session_id.len() <= 64
        && session_id.chars().all(|c| c.is_ascii_digit() || c == '-')
        && session_id.chars().any(|c| c.is_ascii_digit())
}
