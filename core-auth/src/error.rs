use thiserror::Error;

/// Errors from the credential layer.
///
/// `Clone` because a single failed refresh is reported to every request
/// that was coalesced behind it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Unexpected response: {0}")]
    UnexpectedResponse(String),
}

impl From<bridge_traits::BridgeError> for AuthError {
    fn from(err: bridge_traits::BridgeError) -> Self {
        AuthError::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
