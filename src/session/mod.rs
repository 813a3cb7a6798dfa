pub mod claims;
pub mod manager;
pub mod tokens;

pub use manager::SessionManager;
pub use tokens::{TokenPair, TokenStore};

use tokio::sync::watch;

use crate::api::types::UserProfile;

/// Snapshot of the viewer's authentication state.
///
/// Immutable from the outside: every change goes through a [`SessionAction`]
/// dispatched on the [`SessionStore`], and readers only ever see complete
/// snapshots.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionState {
    pub user_id: Option<String>,
    pub email: Option<String>,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub expires_in: Option<f64>,
    pub is_authenticated: bool,
    /// True from process start until the first restoration attempt settles.
    pub is_loading: bool,
    /// True while a restoration attempt is actively running.
    pub is_restoring_session: bool,
    pub is_new_user: bool,
    /// Backend profile cached at sign-in. When the backend is unreachable a
    /// default profile is synthesized so onboarding flags read as unset.
    pub profile: Option<UserProfile>,
}

impl SessionState {
    /// Restoration has run to completion, successfully or not.
    pub fn is_settled(&self) -> bool {
        !self.is_loading && !self.is_restoring_session
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            user_id: None,
            email: None,
            access_token: None,
            refresh_token: None,
            expires_in: None,
            is_authenticated: false,
            is_loading: true,
            is_restoring_session: false,
            is_new_user: false,
            profile: None,
        }
    }
}

/// Typed transitions over [`SessionState`].
#[derive(Debug, Clone)]
pub enum SessionAction {
    /// A restoration or login-completion attempt began.
    RestoreStarted,
    /// Authenticated with a backend profile in hand.
    SignedIn {
        user_id: String,
        email: Option<String>,
        tokens: TokenPair,
        profile: UserProfile,
    },
    /// Backend unreachable; continue optimistically on stored credentials.
    RestoredOffline {
        user_id: Option<String>,
        email: Option<String>,
        tokens: TokenPair,
    },
    /// Restoration finished without an authenticated session.
    RestoreSettled,
    TokensRefreshed { tokens: TokenPair },
    ProfileUpdated { profile: UserProfile },
    SignedOut,
}

/// Pure state transition; all session mutation flows through here.
pub fn reduce(state: &SessionState, action: SessionAction) -> SessionState {
    match action {
        SessionAction::RestoreStarted => SessionState {
            is_restoring_session: true,
            is_loading: true,
            ..state.clone()
        },
        SessionAction::SignedIn {
            user_id,
            email,
            tokens,
            profile,
        } => SessionState {
            user_id: Some(user_id),
            email,
            access_token: Some(tokens.access_token),
            refresh_token: Some(tokens.refresh_token),
            expires_in: tokens.expires_in,
            is_authenticated: true,
            is_loading: false,
            is_restoring_session: false,
            is_new_user: profile.effective_is_new_user(),
            profile: Some(profile),
        },
        SessionAction::RestoredOffline {
            user_id,
            email,
            tokens,
        } => {
            let profile = UserProfile {
                email: email.clone(),
                ..UserProfile::default()
            };
            SessionState {
                user_id,
                email,
                access_token: Some(tokens.access_token),
                refresh_token: Some(tokens.refresh_token),
                expires_in: tokens.expires_in,
                is_authenticated: true,
                is_loading: false,
                is_restoring_session: false,
                is_new_user: profile.effective_is_new_user(),
                profile: Some(profile),
            }
        }
        SessionAction::RestoreSettled => SessionState {
            is_authenticated: false,
            is_loading: false,
            is_restoring_session: false,
            ..state.clone()
        },
        SessionAction::TokensRefreshed { tokens } => SessionState {
            access_token: Some(tokens.access_token),
            refresh_token: Some(tokens.refresh_token),
            expires_in: tokens.expires_in,
            ..state.clone()
        },
        SessionAction::ProfileUpdated { profile } => SessionState {
            is_new_user: profile.effective_is_new_user(),
            profile: Some(profile),
            ..state.clone()
        },
        SessionAction::SignedOut => SessionState {
            is_loading: false,
            ..SessionState::default()
        },
    }
}

/// Shared session state container.
///
/// Built on a watch channel: dispatches are atomic read-modify-write
/// transitions, subscribers observe the latest snapshot, and updates sent
/// after a subscriber has gone away are discarded silently. There is no
/// cancellation of in-flight work; a late dispatch simply lands on whoever
/// is still listening.
pub struct SessionStore {
    tx: watch::Sender<SessionState>,
}

impl SessionStore {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(SessionState::default());
        Self { tx }
    }

    /// Apply one typed transition.
    pub fn dispatch(&self, action: SessionAction) {
        self.tx.send_modify(|state| *state = reduce(state, action));
    }

    pub fn state(&self) -> SessionState {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.tx.subscribe()
    }

    /// Wait until restoration has run to completion (success or failure).
    ///
    /// Guards call this before evaluating auth state so an authenticated but
    /// not-yet-restored visitor is never bounced to the login page.
    pub async fn wait_settled(&self) -> SessionState {
        let mut rx = self.tx.subscribe();
        loop {
            {
                let state = rx.borrow_and_update();
                if state.is_settled() {
                    return state.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.state();
            }
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn pair() -> TokenPair {
        TokenPair {
            access_token: "acc".into(),
            refresh_token: "ref".into(),
            expires_in: Some(3600.0),
        }
    }

    #[test]
    fn starts_unsettled_and_unauthenticated() {
        let state = SessionState::default();
        assert!(!state.is_authenticated);
        assert!(!state.is_settled());
    }

    #[test]
    fn sign_in_transition_populates_session() {
        let store = SessionStore::new();
        store.dispatch(SessionAction::RestoreStarted);
        assert!(store.state().is_restoring_session);

        store.dispatch(SessionAction::SignedIn {
            user_id: "user-1".into(),
            email: Some("pat@example.com".into()),
            tokens: pair(),
            profile: UserProfile {
                onboarding_completed: true,
                ..UserProfile::default()
            },
        });

        let state = store.state();
        assert!(state.is_authenticated);
        assert!(state.is_settled());
        assert!(!state.is_new_user);
        assert_eq!(state.user_id.as_deref(), Some("user-1"));
        assert_eq!(state.access_token.as_deref(), Some("acc"));
    }

    #[test]
    fn offline_restore_synthesizes_profile_defaults() {
        let store = SessionStore::new();
        store.dispatch(SessionAction::RestoreStarted);
        store.dispatch(SessionAction::RestoredOffline {
            user_id: None,
            email: Some("pat@example.com".into()),
            tokens: pair(),
        });

        let state = store.state();
        assert!(state.is_authenticated);
        assert!(state.is_settled());
        assert!(state.is_new_user);

        let profile = state.profile.unwrap();
        assert!(!profile.onboarding_completed);
        assert_eq!(profile.email.as_deref(), Some("pat@example.com"));
    }

    #[test]
    fn sign_out_resets_to_settled_empty_state() {
        let store = SessionStore::new();
        store.dispatch(SessionAction::SignedIn {
            user_id: "user-1".into(),
            email: None,
            tokens: pair(),
            profile: UserProfile::default(),
        });
        store.dispatch(SessionAction::SignedOut);

        let state = store.state();
        assert!(!state.is_authenticated);
        assert!(state.is_settled());
        assert!(state.access_token.is_none());
        assert!(state.profile.is_none());
    }

    #[tokio::test]
    async fn wait_settled_blocks_until_restore_finishes() {
        let store = Arc::new(SessionStore::new());
        store.dispatch(SessionAction::RestoreStarted);

        let waiter = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.wait_settled().await })
        };

        tokio::task::yield_now().await;
        assert!(!waiter.is_finished());

        store.dispatch(SessionAction::RestoreSettled);
        let state = waiter.await.unwrap();
        assert!(state.is_settled());
        assert!(!state.is_authenticated);
    }
}
