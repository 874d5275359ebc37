//! Credential Persistence using the OS Keychain

use bridge_traits::{
    error::{BridgeError, Result},
    token::{TokenCache, TokenSet},
};
use keyring::Entry;
use tracing::debug;

/// Keyring-backed token cache
///
/// Uses platform-specific secure storage:
/// - macOS: Keychain
/// - Windows: Credential Manager (DPAPI)
/// - Linux: Secret Service (libsecret)
///
/// The token set is stored as one JSON entry under a fixed account
/// name, so signing in on one run and syncing on the next needs no
/// interactive flow.
pub struct KeyringTokenCache {
    service_name: String,
    account: String,
}

impl KeyringTokenCache {
    /// Create a cache with the default service name
    pub fn new() -> Self {
        Self::with_service_name("video-sync-core")
    }

    /// Create a cache with a custom service name
    pub fn with_service_name(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            account: "oauth-tokens".to_string(),
        }
    }

    fn entry(&self) -> Result<Entry> {
        Entry::new(&self.service_name, &self.account).map_err(map_keyring_error)
    }
}

impl Default for KeyringTokenCache {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCache for KeyringTokenCache {
    fn store(&self, tokens: &TokenSet) -> Result<()> {
        let json = serde_json::to_string(tokens)
            .map_err(|e| BridgeError::Store(format!("Failed to encode tokens: {}", e)))?;
        self.entry()?
            .set_password(&json)
            .map_err(map_keyring_error)?;
        debug!("stored token set in keyring");
        Ok(())
    }

    fn load(&self) -> Result<Option<TokenSet>> {
        match self.entry()?.get_password() {
            Ok(json) => {
                let tokens = serde_json::from_str(&json)
                    .map_err(|e| BridgeError::Store(format!("Failed to decode tokens: {}", e)))?;
                debug!("loaded token set from keyring");
                Ok(Some(tokens))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(map_keyring_error(e)),
        }
    }

    fn clear(&self) -> Result<()> {
        match self.entry()?.delete_credential() {
            Ok(()) => {
                debug!("cleared token set from keyring");
                Ok(())
            }
            // Already absent, consider it cleared
            Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(map_keyring_error(e)),
        }
    }
}

fn map_keyring_error(e: keyring::Error) -> BridgeError {
    BridgeError::Store(format!("Keyring error: {}", e))
}
