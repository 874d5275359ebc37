//! Token Provider Abstraction
//!
//! OAuth2 credential acquisition as seen by the core: exchange an
//! authorization code, refresh with a refresh token, build an
//! authorization URL. URL and body construction for a concrete identity
//! provider are the implementation's concern.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A bearer credential set returned by the token endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    /// Instant after which the access token must be refreshed
    pub expires_at: DateTime<Utc>,
    pub refresh_token: Option<String>,
}

impl TokenSet {
    pub fn new(
        access_token: impl Into<String>,
        expires_at: DateTime<Utc>,
        refresh_token: Option<String>,
    ) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
            refresh_token,
        }
    }

    /// Whether the access token needs refreshing at `now`.
    ///
    /// A token is stale once `now >= expires_at`.
    pub fn needs_refresh(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// OAuth2 token acquisition trait
#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Exchange an authorization code for a token set
    async fn exchange_code(&self, code: &str) -> Result<TokenSet>;

    /// Obtain a fresh token set using a refresh token
    ///
    /// # Errors
    ///
    /// Fails when the refresh token itself has been revoked or expired,
    /// in which case the user must sign in again.
    async fn refresh(&self, refresh_token: &str) -> Result<TokenSet>;

    /// Build the authorization URL the host should open for sign-in
    fn authorization_url(&self, scopes: &[String], extra_params: &[(String, String)]) -> String;
}

/// Persistence for a token set across process restarts.
///
/// Implementations should use the platform credential store; tokens
/// must never land in plain configuration files.
pub trait TokenCache: Send + Sync {
    fn store(&self, tokens: &TokenSet) -> Result<()>;
    fn load(&self) -> Result<Option<TokenSet>>;
    fn clear(&self) -> Result<()>;
}
