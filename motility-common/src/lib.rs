//! # Motility Common Library
//!
//! Shared code for the motility analysis server including:
//! - Error types shared by configuration and storage code
//! - Configuration loading and root folder resolution
//! - Processing mode lookup table
//! - Result manifest type
//! - Monotonic token generation for session and upload names

pub mod config;
pub mod error;
pub mod manifest;
pub mod mode;
pub mod time;

pub use error::{Error, Result};
pub use manifest::ResultManifest;
pub use mode::{ModeProfile, ProcessingMode};
