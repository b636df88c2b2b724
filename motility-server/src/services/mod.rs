//! Pipeline stages and the standalone session services

pub mod archive_builder;
pub mod dispatcher;
pub mod graph_regenerator;
pub mod job_runner;
pub mod manifest_builder;
pub mod media_gateway;
pub mod normalizer;
pub mod session_store;
pub mod upload_ingest;

pub use archive_builder::ArchiveBuilder;
pub use dispatcher::{resolve_mode, DispatchResult, ProcessDispatcher};
pub use graph_regenerator::GraphRegenerator;
pub use job_runner::{ExternalJob, JobError, JobOutput, JobRunner, ProcessRunner};
pub use manifest_builder::build_manifest;
pub use media_gateway::{MediaGateway, RangeRequest};
pub use normalizer::OutputNormalizer;
pub use session_store::{Session, SessionStore};
pub use upload_ingest::{PendingUpload, StoredAsset, UploadIngest};
