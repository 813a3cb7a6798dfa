use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::api::types::NewOAuthProfile;
use crate::api::PortalApi;
use crate::error::PortalError;
use crate::provider::IdentityProvider;
use crate::session::claims::peek_claims;
use crate::session::tokens::{TokenPair, TokenStore};
use crate::session::{SessionAction, SessionState, SessionStore};
use crate::storage::{keys, StorageBackend};

/// Drives session lifecycle transitions: restoration on startup, login
/// completion, token refresh, and sign-out. All state lands in the shared
/// [`SessionStore`]; all credentials land in the [`TokenStore`].
pub struct SessionManager {
    store: Arc<SessionStore>,
    tokens: TokenStore,
    storage: Arc<dyn StorageBackend>,
    provider: Arc<dyn IdentityProvider>,
    api: Arc<dyn PortalApi>,
}

impl SessionManager {
    pub fn new(
        store: Arc<SessionStore>,
        storage: Arc<dyn StorageBackend>,
        provider: Arc<dyn IdentityProvider>,
        api: Arc<dyn PortalApi>,
    ) -> Self {
        Self {
            store,
            tokens: TokenStore::new(Arc::clone(&storage)),
            storage,
            provider,
            api,
        }
    }

    pub fn store(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Rebuild the authenticated session from stored tokens.
    ///
    /// Runs once at startup. The restoration flag stays raised for the whole
    /// attempt so guards blocked on [`SessionStore::wait_settled`] never see
    /// a half-restored session.
    ///
    /// Outcomes, by backend profile fetch result:
    /// - success: authenticated session with the profile cached;
    /// - connectivity failure: optimistic offline session, tokens kept;
    /// - auth rejection: tokens cleared, session left unauthenticated;
    /// - anything else: rethrown, tokens kept, session left unauthenticated.
    pub async fn restore(&self) -> Result<SessionState, PortalError> {
        self.store.dispatch(SessionAction::RestoreStarted);

        let Some(stored) = self.tokens.load() else {
            debug!("no stored tokens, starting unauthenticated");
            self.store.dispatch(SessionAction::RestoreSettled);
            return Ok(self.store.state());
        };

        // Provider re-establishment comes first; its errors are logged, not
        // fatal, because the backend is the authority on token validity.
        let provider_session = match self.provider.refresh_session(&stored.refresh_token).await {
            Ok(session) => Some(session),
            Err(e) => {
                warn!("identity provider session refresh failed: {}", e);
                None
            }
        };

        let effective = match &provider_session {
            Some(session) => {
                let pair = TokenPair {
                    access_token: session.access_token.clone(),
                    refresh_token: session
                        .refresh_token
                        .clone()
                        .unwrap_or_else(|| stored.refresh_token.clone()),
                    expires_in: session.expires_in,
                };
                self.tokens.store(&pair);
                pair
            }
            None => stored,
        };

        let provider_user = provider_session.and_then(|session| session.user);

        match self.api.get_profile(&effective.access_token).await {
            Ok(Some(profile)) => {
                let user_id = provider_user
                    .as_ref()
                    .map(|user| user.id.clone())
                    .unwrap_or_else(|| effective.access_token.clone());
                let email = provider_user
                    .and_then(|user| user.email)
                    .or_else(|| profile.email.clone());

                info!("session restored for {}", profile.display_name().unwrap_or_else(|| user_id.clone()));
                self.store.dispatch(SessionAction::SignedIn {
                    user_id,
                    email,
                    tokens: effective,
                    profile,
                });
                Ok(self.store.state())
            }
            Ok(None) => {
                // Tokens check out but no profile exists yet; an interrupted
                // first sign-in. Treated like the unknown-failure branch so
                // login completion can retry profile creation.
                self.store.dispatch(SessionAction::RestoreSettled);
                Err(PortalError::unknown("backend profile missing for stored session"))
            }
            Err(e) if e.is_connectivity() => {
                warn!("backend unreachable during restore, continuing offline: {}", e);
                self.store.dispatch(SessionAction::RestoredOffline {
                    user_id: provider_user.as_ref().map(|user| user.id.clone()),
                    email: provider_user.and_then(|user| user.email),
                    tokens: effective,
                });
                Ok(self.store.state())
            }
            Err(e) if e.is_auth() => {
                info!("stored tokens rejected, clearing credentials");
                self.tokens.clear();
                self.store.dispatch(SessionAction::RestoreSettled);
                Ok(self.store.state())
            }
            Err(e) => {
                self.store.dispatch(SessionAction::RestoreSettled);
                Err(e)
            }
        }
    }

    /// Finish an interactive login with the token pair delivered by the
    /// provider redirect. Creates the backend profile on first OAuth sign-in.
    pub async fn complete_login(&self, tokens: TokenPair) -> Result<SessionState, PortalError> {
        self.store.dispatch(SessionAction::RestoreStarted);
        self.tokens.store(&tokens);

        let claims = peek_claims(&tokens.access_token);
        let user_id = claims
            .as_ref()
            .and_then(|c| c.sub.clone())
            .unwrap_or_else(|| tokens.access_token.clone());
        let claim_email = claims.and_then(|c| c.email);

        let profile = match self.api.get_profile(&tokens.access_token).await {
            Ok(Some(profile)) => profile,
            Ok(None) => {
                let Some(email) = claim_email.clone() else {
                    self.store.dispatch(SessionAction::RestoreSettled);
                    return Err(PortalError::missing_field("email"));
                };
                info!("first sign-in for {}, creating backend profile", email);
                self.api
                    .create_oauth_user_profile(
                        &tokens.access_token,
                        &NewOAuthProfile {
                            email,
                            first_name: None,
                            last_name: None,
                        },
                    )
                    .await?
            }
            Err(e) => {
                self.store.dispatch(SessionAction::RestoreSettled);
                return Err(e);
            }
        };

        let email = claim_email.or_else(|| profile.email.clone());
        self.store.dispatch(SessionAction::SignedIn {
            user_id,
            email,
            tokens,
            profile,
        });
        Ok(self.store.state())
    }

    /// Re-fetch the backend profile for the active session, e.g. after an
    /// offline restore once connectivity returns.
    pub async fn refresh_profile(&self) -> Result<SessionState, PortalError> {
        let state = self.store.state();
        let Some(access_token) = state.access_token else {
            return Err(PortalError::auth("no active session"));
        };

        match self.api.get_profile(&access_token).await? {
            Some(profile) => {
                self.store.dispatch(SessionAction::ProfileUpdated { profile });
                Ok(self.store.state())
            }
            None => Err(PortalError::unknown("backend profile missing for active session")),
        }
    }

    /// Persist rotated tokens mid-session, e.g. from a provider auto-refresh.
    pub fn apply_refreshed_tokens(&self, tokens: TokenPair) {
        self.tokens.store(&tokens);
        self.store.dispatch(SessionAction::TokensRefreshed { tokens });
    }

    /// Sign out: best-effort provider revocation, then local teardown.
    /// Provider failures are logged and swallowed; local state always clears.
    pub async fn logout(&self) {
        let state = self.store.state();
        if let Some(access_token) = state.access_token {
            if let Err(e) = self.provider.revoke(&access_token).await {
                warn!("provider sign-out failed: {}", e);
            }
        }
        // User-scoped leftovers go with the session; preferences stay.
        if let Some(user_id) = state.user_id {
            self.storage.remove(&keys::chat_history(&user_id));
        }
        self.tokens.clear();
        self.store.dispatch(SessionAction::SignedOut);
    }
}
