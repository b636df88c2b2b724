//! Custom graph endpoint

use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use motility_common::ProcessingMode;
use serde::{Deserialize, Serialize};

use crate::{error::ApiResult, PipelineError, AppState};

/// POST /generate-graph request
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphRequest {
    pub session_id: String,
    /// Maximum number of tracks to plot
    pub limit: u32,
    pub mode: String,
}

/// POST /generate-graph response
#[derive(Debug, Serialize)]
pub struct GraphResponse {
    /// Session-relative URL with a cache-busting token
    pub graph: String,
}

/// POST /generate-graph
///
/// Bodies that do not deserialize (negative `limit`, missing `mode`) are 400s
/// in the usual error envelope.
pub async fn generate_graph(
    State(state): State<AppState>,
    payload: Result<Json<GraphRequest>, JsonRejection>,
) -> ApiResult<Json<GraphResponse>> {
    let Json(request) = payload?;
    let mode = request
        .mode
        .parse::<ProcessingMode>()
        .map_err(PipelineError::from)?;

    let graph = state
        .graphs
        .regenerate(&request.session_id, request.limit, mode)
        .await?;

    Ok(Json(GraphResponse { graph }))
}

pub fn graph_routes() -> Router<AppState> {
    Router::new().route("/generate-graph", post(generate_graph))
}
