use std::sync::Arc;

use tracing::debug;

use crate::storage::{keys, StorageBackend};

/// Access/refresh token pair as persisted between visits.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Provider-reported lifetime in seconds. Informational only; expiry is
    /// enforced upstream, not locally.
    pub expires_in: Option<f64>,
}

/// Persists the token pair across reloads.
///
/// Token contents are not inspected here; a malformed stored token counts as
/// present until the backend rejects it.
pub struct TokenStore {
    storage: Arc<dyn StorageBackend>,
}

impl TokenStore {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }

    pub fn store(&self, tokens: &TokenPair) {
        self.storage.set(keys::ACCESS_TOKEN, &tokens.access_token);
        self.storage.set(keys::REFRESH_TOKEN, &tokens.refresh_token);
        match tokens.expires_in {
            Some(expires_in) => self.storage.set(keys::EXPIRES_IN, &expires_in.to_string()),
            None => self.storage.remove(keys::EXPIRES_IN),
        }
    }

    /// `None` unless both tokens are present. A stored `expires_in` that does
    /// not parse is dropped without invalidating the pair.
    pub fn load(&self) -> Option<TokenPair> {
        let access_token = self.storage.get(keys::ACCESS_TOKEN)?;
        let refresh_token = self.storage.get(keys::REFRESH_TOKEN)?;
        let expires_in = self
            .storage
            .get(keys::EXPIRES_IN)
            .and_then(|raw| raw.parse::<f64>().ok());

        Some(TokenPair {
            access_token,
            refresh_token,
            expires_in,
        })
    }

    pub fn clear(&self) {
        debug!("clearing stored credentials");
        self.storage.remove(keys::ACCESS_TOKEN);
        self.storage.remove(keys::REFRESH_TOKEN);
        self.storage.remove(keys::EXPIRES_IN);
    }
}
