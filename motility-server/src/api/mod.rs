//! HTTP API handlers for motility-server

pub mod graph;
pub mod health;
pub mod media;
pub mod upload;

pub use graph::graph_routes;
pub use health::health_routes;
pub use media::media_routes;
pub use upload::upload_routes;
