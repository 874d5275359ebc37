//! # Authenticated HTTP Client
//!
//! Bearer credential attachment, expiry-driven refresh, and the
//! refresh-and-retry-once policy for requests the backend rejects.
//!
//! ## Overview
//!
//! Every call to the content backend goes through [`AuthClient`]. The
//! client owns the current [`TokenSet`], attaches the access token to
//! outgoing requests, refreshes proactively when the token has expired,
//! and reissues a rejected request exactly once after a reactive
//! refresh. Concurrent requests that hit an expired token coalesce into
//! a single refresh; the one network call's outcome is shared with every
//! waiter.
//!
//! ## Usage
//!
//! ```no_run
//! use core_auth::AuthClient;
//! use core_runtime::events::EventBus;
//! use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest};
//! use std::sync::Arc;
//!
//! # async fn demo(http: Arc<dyn HttpClient>) -> core_auth::Result<()> {
//! let client = AuthClient::new(http, EventBus::new(100));
//! let request = HttpRequest::new(HttpMethod::Get, "https://rails.example/videos.json");
//! let response = client.authorized_request(request).await?;
//! # Ok(())
//! # }
//! ```

use crate::error::{AuthError, Result};
use bridge_traits::http::{HttpClient, HttpRequest, HttpResponse};
use bridge_traits::time::{Clock, SystemClock};
use bridge_traits::token::{TokenCache, TokenProvider, TokenSet};
use core_runtime::events::{AuthEvent, CoreEvent, EventBus};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// Response statuses that trigger a reactive refresh-and-retry.
///
/// The backend reports a stale session through any of these, not just
/// 401, so all four are treated as "credentials may be stale". A 404 or
/// 500 with valid credentials costs one redundant refresh round-trip
/// before the original response is surfaced.
pub const RETRY_STATUSES: [u16; 4] = [401, 403, 404, 500];

struct TokenState {
    tokens: Option<TokenSet>,
    /// Bumped after every refresh attempt, success or failure.
    refresh_epoch: u64,
    /// Outcome of the most recent refresh, shared with coalesced waiters.
    last_refresh: Option<Result<()>>,
}

/// Credential-aware HTTP client fronting the content backend.
///
/// Construction is cheap; wrap in an `Arc` and share. The transport, the
/// identity provider and the credential cache are all injected, so tests
/// script them and production wires the reqwest and keyring
/// implementations from `bridge-desktop`.
pub struct AuthClient {
    http: Arc<dyn HttpClient>,
    provider: Option<Arc<dyn TokenProvider>>,
    cache: Option<Arc<dyn TokenCache>>,
    clock: Arc<dyn Clock>,
    event_bus: EventBus,
    state: Mutex<TokenState>,
    /// Serializes refreshes so exactly one network call happens per
    /// stale-token episode. Fair (FIFO), so waiters observe the leader's
    /// epoch bump when they acquire it.
    refresh_gate: Mutex<()>,
}

impl AuthClient {
    pub fn new(http: Arc<dyn HttpClient>, event_bus: EventBus) -> Self {
        Self {
            http,
            provider: None,
            cache: None,
            clock: Arc::new(SystemClock),
            event_bus,
            state: Mutex::new(TokenState {
                tokens: None,
                refresh_epoch: 0,
                last_refresh: None,
            }),
            refresh_gate: Mutex::new(()),
        }
    }

    /// Attach the identity provider used for code exchange and refresh.
    ///
    /// Without a provider the client can still issue requests with
    /// injected tokens but cannot refresh them.
    pub fn with_provider(mut self, provider: Arc<dyn TokenProvider>) -> Self {
        self.provider = Some(provider);
        self
    }

    /// Attach a credential cache and restore any persisted token set.
    pub fn with_cache(mut self, cache: Arc<dyn TokenCache>) -> Self {
        match cache.load() {
            Ok(tokens) => {
                if tokens.is_some() {
                    debug!("restored persisted credentials");
                }
                self.state.get_mut().tokens = tokens;
            }
            Err(err) => warn!(error = %err, "failed to restore persisted credentials"),
        }
        self.cache = Some(cache);
        self
    }

    /// Override the time source (tests use a fixed clock).
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Install a token set directly, bypassing the code-exchange flow.
    pub async fn install_tokens(&self, tokens: TokenSet) {
        self.persist(&tokens);
        self.state.lock().await.tokens = Some(tokens);
    }

    /// Current token set, if any.
    pub async fn tokens(&self) -> Option<TokenSet> {
        self.state.lock().await.tokens.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.state.lock().await.tokens.is_some()
    }

    /// Authorization URL the host should open for interactive sign-in.
    pub fn authorization_url(
        &self,
        scopes: &[String],
        extra_params: &[(String, String)],
    ) -> Result<String> {
        let provider = self.require_provider()?;
        Ok(provider.authorization_url(scopes, extra_params))
    }

    /// Completes sign-in by exchanging the authorization code.
    #[instrument(skip(self, code))]
    pub async fn authenticate_with_code(&self, code: &str) -> Result<()> {
        let provider = self.require_provider()?;
        let tokens = provider
            .exchange_code(code)
            .await
            .map_err(|e| AuthError::AuthenticationFailed(e.to_string()))?;

        info!("code exchange succeeded");
        self.install_tokens(tokens).await;
        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SignedIn));
        Ok(())
    }

    /// Discards the token set and clears the credential cache.
    #[instrument(skip(self))]
    pub async fn sign_out(&self) {
        {
            let mut state = self.state.lock().await;
            state.tokens = None;
            state.last_refresh = None;
        }
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.clear() {
                warn!(error = %err, "failed to clear credential cache");
            }
        }
        let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::SignedOut));
        info!("signed out");
    }

    /// Executes `request` with credentials attached.
    ///
    /// The flow:
    ///
    /// 1. Refresh proactively when the stored token has expired.
    /// 2. Attach the bearer token and execute.
    /// 3. If the status is in [`RETRY_STATUSES`], refresh and reissue the
    ///    request exactly once. A second rejection is returned as-is.
    /// 4. If the reactive refresh itself fails, return the original
    ///    rejected response; the caller sees the backend's verdict, not
    ///    the refresh failure.
    ///
    /// Non-2xx statuses outside the retry set are returned untouched;
    /// interpreting them is the caller's business.
    #[instrument(skip(self, request), fields(url = %request.url))]
    pub async fn authorized_request(&self, request: HttpRequest) -> Result<HttpResponse> {
        let token = self.valid_access_token().await?;
        let response = self
            .http
            .execute(request.clone().bearer_token(token))
            .await?;

        if !RETRY_STATUSES.contains(&response.status) {
            return Ok(response);
        }

        debug!(status = response.status, "response suggests stale credentials");
        if self.refresh().await.is_err() {
            return Ok(response);
        }

        let token = self.valid_access_token().await?;
        let retried = self.http.execute(request.bearer_token(token)).await?;
        Ok(retried)
    }

    /// Returns an access token that was valid at the time of the check,
    /// refreshing first when the stored one has expired.
    async fn valid_access_token(&self) -> Result<String> {
        let (token, stale) = {
            let state = self.state.lock().await;
            match &state.tokens {
                None => return Err(AuthError::NotAuthenticated),
                Some(tokens) => (
                    tokens.access_token.clone(),
                    tokens.needs_refresh(self.clock.now()),
                ),
            }
        };
        if !stale {
            return Ok(token);
        }

        debug!("access token expired, refreshing before request");
        self.refresh().await?;

        let state = self.state.lock().await;
        state
            .tokens
            .as_ref()
            .map(|t| t.access_token.clone())
            .ok_or(AuthError::NotAuthenticated)
    }

    /// Refreshes the token set, coalescing concurrent callers.
    ///
    /// The first caller through the gate performs the network refresh
    /// and bumps the epoch; callers that were already waiting observe
    /// the bump and reuse the stored outcome instead of refreshing
    /// again.
    pub async fn refresh(&self) -> Result<()> {
        let epoch_before = self.state.lock().await.refresh_epoch;
        let _gate = self.refresh_gate.lock().await;
        {
            let state = self.state.lock().await;
            if state.refresh_epoch != epoch_before {
                debug!("refresh already performed by concurrent caller");
                return state.last_refresh.clone().unwrap_or(Ok(()));
            }
        }

        let _ = self
            .event_bus
            .emit(CoreEvent::Auth(AuthEvent::TokenRefreshing));
        let outcome = self.refresh_via_provider().await;

        let mut state = self.state.lock().await;
        state.refresh_epoch += 1;
        match outcome {
            Ok(tokens) => {
                let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::TokenRefreshed {
                    expires_at: tokens.expires_at.timestamp(),
                }));
                self.persist(&tokens);
                state.tokens = Some(tokens);
                state.last_refresh = Some(Ok(()));
                info!("token refresh succeeded");
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "token refresh failed");
                let _ = self.event_bus.emit(CoreEvent::Auth(AuthEvent::AuthError {
                    message: err.to_string(),
                    recoverable: false,
                }));
                state.last_refresh = Some(Err(err.clone()));
                Err(err)
            }
        }
    }

    async fn refresh_via_provider(&self) -> Result<TokenSet> {
        let provider = self.require_provider()?;
        let refresh_token = {
            let state = self.state.lock().await;
            state
                .tokens
                .as_ref()
                .and_then(|t| t.refresh_token.clone())
                .ok_or(AuthError::NotAuthenticated)?
        };
        provider
            .refresh(&refresh_token)
            .await
            .map_err(|e| AuthError::AuthenticationFailed(e.to_string()))
    }

    // No provider means there is no way to obtain credentials at all.
    fn require_provider(&self) -> Result<&Arc<dyn TokenProvider>> {
        self.provider.as_ref().ok_or(AuthError::NotAuthenticated)
    }

    fn persist(&self, tokens: &TokenSet) {
        if let Some(cache) = &self.cache {
            if let Err(err) = cache.store(tokens) {
                warn!(error = %err, "failed to persist credentials");
            }
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
