//! Upload-to-results workflow

pub mod pipeline;

pub use pipeline::Pipeline;
