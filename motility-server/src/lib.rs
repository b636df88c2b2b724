//! motility-server library
//!
//! Upload-to-results pipeline for microscopy videos plus the HTTP surface that
//! serves session artifacts. Exposed as a library for integration testing.

pub mod api;
pub mod error;
pub mod services;
pub mod workflow;

pub use crate::error::{ApiError, ApiResult, PipelineError};

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::Router;
use chrono::{DateTime, Utc};
use motility_common::config::{StorageConfig, WorkerConfig};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::services::{GraphRegenerator, JobRunner, MediaGateway, SessionStore, UploadIngest};
use crate::workflow::Pipeline;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub storage: Arc<StorageConfig>,
    pub ingest: UploadIngest,
    pub pipeline: Pipeline,
    pub media: MediaGateway,
    pub graphs: GraphRegenerator,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    /// Wire every service against one storage layout and job runner
    pub fn new(
        storage: Arc<StorageConfig>,
        workers: Arc<WorkerConfig>,
        runner: Arc<dyn JobRunner>,
    ) -> Self {
        let sessions = SessionStore::new(storage.sessions_root.clone());
        Self {
            ingest: UploadIngest::new(storage.clone()),
            pipeline: Pipeline::new(
                sessions.clone(),
                runner.clone(),
                workers.clone(),
                storage.clone(),
            ),
            media: MediaGateway::new(sessions.clone()),
            graphs: GraphRegenerator::new(sessions, runner, workers),
            storage,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    let body_limit = state.storage.max_upload_bytes;

    Router::new()
        .merge(api::upload_routes())
        .merge(api::media_routes())
        .merge(api::graph_routes())
        .merge(api::health_routes())
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
