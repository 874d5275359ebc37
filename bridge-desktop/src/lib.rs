//! # Desktop Bridge Implementations
//!
//! Desktop implementations of the transport-side bridge traits:
//!
//! - [`ReqwestHttpClient`] - HTTP transport over reqwest (rustls)
//! - [`KeyringTokenCache`] - token persistence in the OS keychain
//!
//! The content store and uploader backends stay host-provided; this
//! crate only covers the pieces every desktop host shares.

pub mod http;
#[cfg(feature = "token-cache")]
pub mod token_cache;

pub use http::ReqwestHttpClient;
#[cfg(feature = "token-cache")]
pub use token_cache::KeyringTokenCache;
