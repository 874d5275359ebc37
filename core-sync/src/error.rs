use bridge_traits::VideoId;
use core_auth::AuthError;
use thiserror::Error;

/// Errors produced by reconciliation nodes.
///
/// `Clone` because the task graph fans a node's error up to every
/// ancestor's aggregated list.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("Remote call failed with status {status}: {context}")]
    Remote { status: u16, context: String },

    #[error("Unexpected response shape: {0}")]
    UnexpectedResponse(String),

    #[error("Local store error: {0}")]
    Store(String),

    #[error("No local record for {0}")]
    MissingLocalRecord(VideoId),

    #[error("A sync pass is already running")]
    AlreadyRunning,
}

impl SyncError {
    pub(crate) fn store(err: bridge_traits::BridgeError) -> Self {
        SyncError::Store(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
