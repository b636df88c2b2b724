//! Media gateway
//!
//! Serves session files over HTTP with single byte-range support so video
//! players can seek. The on-demand graph is always sent as a download.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use axum::body::Body;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::Response;
use motility_common::mode::CUSTOM_GRAPH_IMAGE;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio_util::io::ReaderStream;

use crate::error::PipelineError;
use crate::services::session_store::SessionStore;

/// Read buffer for streamed bodies
const STREAM_CHUNK: usize = 64 * 1024;

/// Interpretation of a `Range` header against a file size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RangeRequest {
    /// No usable range; send everything
    Full,
    /// Inclusive byte span
    Partial { start: u64, end: u64 },
    /// Well-formed but outside the file
    Unsatisfiable,
}

impl RangeRequest {
    /// Parse a single `bytes=` range
    ///
    /// Accepts `start-end`, `start-` and suffix `-N`. Malformed and multi-range
    /// headers are ignored (full response); `end` past the file is clamped.
    pub fn parse(header: Option<&str>, total: u64) -> Self {
        let Some(header) = header else {
            return RangeRequest::Full;
        };
        let Some(ranges) = header.trim().strip_prefix("bytes=") else {
            return RangeRequest::Full;
        };
        if ranges.contains(',') {
            return RangeRequest::Full;
        }
        let Some((start, end)) = ranges.split_once('-') else {
            return RangeRequest::Full;
        };
        let (start, end) = (start.trim(), end.trim());

        if start.is_empty() {
            let Ok(suffix) = end.parse::<u64>() else {
                return RangeRequest::Full;
            };
            if suffix == 0 || total == 0 {
                return RangeRequest::Unsatisfiable;
            }
            return RangeRequest::Partial {
                start: total.saturating_sub(suffix),
                end: total - 1,
            };
        }

        let Ok(start) = start.parse::<u64>() else {
            return RangeRequest::Full;
        };
        let end = if end.is_empty() {
            None
        } else {
            match end.parse::<u64>() {
                Ok(end) if end >= start => Some(end),
                _ => return RangeRequest::Full,
            }
        };

        if start >= total {
            return RangeRequest::Unsatisfiable;
        }
        let last = total - 1;
        RangeRequest::Partial {
            start,
            end: end.map_or(last, |end| end.min(last)),
        }
    }
}

/// Content type by extension; `.mp4` is always `video/mp4`
pub fn content_type_for(path: &Path) -> String {
    let is_mp4 = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("mp4"))
        .unwrap_or(false);
    if is_mp4 {
        return "video/mp4".to_string();
    }
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// Reject anything that is not a plain relative path of visible names
fn safe_relative_path(requested: &str) -> Option<PathBuf> {
    if requested.is_empty() || requested.contains('\\') {
        return None;
    }
    let path = Path::new(requested);
    let mut clean = PathBuf::new();
    for component in path.components() {
        match component {
            Component::Normal(part) => {
                let part = part.to_str()?;
                if part.starts_with('.') {
                    return None;
                }
                clean.push(part);
            }
            _ => return None,
        }
    }
    (!clean.as_os_str().is_empty()).then_some(clean)
}

/// Serves files out of session directories
#[derive(Debug, Clone)]
pub struct MediaGateway {
    sessions: SessionStore,
}

impl MediaGateway {
    pub fn new(sessions: SessionStore) -> Self {
        Self { sessions }
    }

    /// Respond with a session file, honoring a byte range if present
    pub async fn serve(
        &self,
        session_id: &str,
        requested: &str,
        range: Option<&str>,
    ) -> Result<Response, PipelineError> {
        let not_found = || PipelineError::NotFound(format!("File not found: {}/{}", session_id, requested));

        let session = self.sessions.open(session_id).await.map_err(|_| not_found())?;
        let relative = safe_relative_path(requested).ok_or_else(not_found)?;
        let path = session.dir.join(&relative);

        let metadata = tokio::fs::metadata(&path).await.map_err(|_| not_found())?;
        if !metadata.is_file() {
            return Err(not_found());
        }
        let total = metadata.len();
        let content_type = content_type_for(&path);

        if relative.as_os_str() == CUSTOM_GRAPH_IMAGE {
            tracing::debug!(session_id = %session_id, "Serving custom graph as download");
            return download_response(&path, total, &content_type).await;
        }

        let request = RangeRequest::parse(range, total);
        tracing::debug!(
            session_id = %session_id,
            file = %requested,
            content_type = %content_type,
            range = ?request,
            "Serving session file"
        );

        match request {
            RangeRequest::Full => {
                let body = stream_body(&path, 0, total).await?;
                build(
                    Response::builder()
                        .status(StatusCode::OK)
                        .header(header::CONTENT_TYPE, &content_type)
                        .header(header::CONTENT_LENGTH, total)
                        .header(header::ACCEPT_RANGES, "bytes"),
                    body,
                )
            }
            RangeRequest::Partial { start, end } => {
                let length = end - start + 1;
                let body = stream_body(&path, start, length).await?;
                build(
                    Response::builder()
                        .status(StatusCode::PARTIAL_CONTENT)
                        .header(header::CONTENT_TYPE, &content_type)
                        .header(header::CONTENT_LENGTH, length)
                        .header(header::ACCEPT_RANGES, "bytes")
                        .header(
                            header::CONTENT_RANGE,
                            format!("bytes {}-{}/{}", start, end, total),
                        ),
                    body,
                )
            }
            RangeRequest::Unsatisfiable => build(
                Response::builder()
                    .status(StatusCode::RANGE_NOT_SATISFIABLE)
                    .header(header::ACCEPT_RANGES, "bytes")
                    .header(header::CONTENT_RANGE, format!("bytes */{}", total)),
                Body::empty(),
            ),
        }
    }
}

async fn download_response(
    path: &Path,
    total: u64,
    content_type: &str,
) -> Result<Response, PipelineError> {
    let body = stream_body(path, 0, total).await?;
    build(
        Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, content_type)
            .header(header::CONTENT_LENGTH, total)
            .header(
                header::CONTENT_DISPOSITION,
                HeaderValue::from_static("attachment; filename=\"graph_custom.png\""),
            ),
        body,
    )
}

/// Stream `length` bytes starting at `start`
async fn stream_body(path: &Path, start: u64, length: u64) -> Result<Body, PipelineError> {
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| PipelineError::storage(format!("open {}", path.display()), e))?;
    if start > 0 {
        file.seek(SeekFrom::Start(start))
            .await
            .map_err(|e| PipelineError::storage("seek", e))?;
    }
    let stream = ReaderStream::with_capacity(file.take(length), STREAM_CHUNK);
    Ok(Body::from_stream(stream))
}

fn build(builder: axum::http::response::Builder, body: Body) -> Result<Response, PipelineError> {
    builder
        .body(body)
        .map_err(|e| PipelineError::Storage(format!("build response: {}", e)))
}
