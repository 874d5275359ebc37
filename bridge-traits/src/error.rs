use thiserror::Error;

/// Errors produced by host bridge implementations.
///
/// Variants carry string payloads rather than wrapped error types so that
/// higher layers can clone them into aggregated error reports.
#[derive(Error, Debug, Clone)]
pub enum BridgeError {
    #[error("Bridge capability not available: {0}")]
    NotAvailable(String),

    #[error("Bridge operation failed: {0}")]
    OperationFailed(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<std::io::Error> for BridgeError {
    fn from(e: std::io::Error) -> Self {
        BridgeError::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
