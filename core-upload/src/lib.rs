//! # Core Upload
//!
//! Failover-chain upload of content assets plus manifest submission.
//!
//! [`UploadOrchestrator`] tries uploader backends in priority order,
//! reports weighted progress over the whole flow, submits the manifest
//! through the catalog, and persists the canonical server record.

pub mod error;
pub mod orchestrator;

pub use error::{Result, UploadError};
pub use orchestrator::UploadOrchestrator;
