//! # Host Bridge Traits
//!
//! Boundary contracts between the sync core and its host environment.
//!
//! ## Overview
//!
//! This crate defines the capabilities the core requires but does not
//! implement itself. Each trait represents one external collaborator:
//!
//! - [`HttpClient`](http::HttpClient) - Raw HTTP transport (no retry, no credentials)
//! - [`LocalStore`](store::LocalStore) - Key-value store of content records by id
//! - [`TokenProvider`](token::TokenProvider) - OAuth2 code exchange and refresh
//! - [`TokenCache`](token::TokenCache) - Credential persistence across restarts
//! - [`MediaUploader`](uploader::MediaUploader) - Asset upload backend
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//!
//! ## Error Handling
//!
//! All bridge traits use the [`BridgeError`](error::BridgeError) type.
//! Implementations should convert platform-specific errors and keep the
//! messages actionable; variants are string-backed so the core can clone
//! them into aggregated sync reports.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` bounds to support concurrent
//! usage across async tasks.

pub mod error;
pub mod http;
pub mod store;
pub mod time;
pub mod token;
pub mod uploader;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
pub use store::{GroupRecord, LocalRecord, LocalStore, VideoId};
pub use time::{Clock, SystemClock};
pub use token::{TokenCache, TokenProvider, TokenSet};
pub use uploader::{AssetKind, AssetUpload, MediaUploader, ProgressFn, UploadedAssets};
