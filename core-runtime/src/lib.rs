//! # Core Runtime
//!
//! Ambient runtime services shared by the sync core crates: the
//! broadcast [`EventBus`](events::EventBus) connecting the core to
//! presentation collaborators, and `tracing` logging setup.

pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
pub use events::{AuthEvent, CoreEvent, EventBus, EventSeverity, SyncEvent, UploadEvent};
pub use logging::{init_logging, LogFormat, LoggingConfig};
