//! # Core Auth
//!
//! Credential management for the content backend.
//!
//! ## Overview
//!
//! [`AuthClient`] fronts every backend request: it attaches the bearer
//! token, refreshes it when expired, and retries a rejected request
//! exactly once after a reactive refresh. Token acquisition is delegated
//! to a host-provided [`TokenProvider`](bridge_traits::TokenProvider);
//! persistence to a [`TokenCache`](bridge_traits::TokenCache).

pub mod client;
pub mod error;

pub use client::{AuthClient, RETRY_STATUSES};
pub use error::{AuthError, Result};
