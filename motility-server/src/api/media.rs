//! Session file delivery
//!
//! GET /sessions/:session_id/*path

use axum::{
    extract::{Path, State},
    http::{header, HeaderMap},
    response::Response,
    routing::get,
    Router,
};

use crate::{error::ApiResult, AppState};

/// GET /sessions/:session_id/*path
///
/// Range-aware delivery; see [`crate::services::MediaGateway`].
pub async fn serve_session_file(
    State(state): State<AppState>,
    Path((session_id, path)): Path<(String, String)>,
    headers: HeaderMap,
) -> ApiResult<Response> {
    let range = headers
        .get(header::RANGE)
        .and_then(|value| value.to_str().ok());

    Ok(state.media.serve(&session_id, &path, range).await?)
}

pub fn media_routes() -> Router<AppState> {
    Router::new().route("/sessions/:session_id/*path", get(serve_session_file))
}
