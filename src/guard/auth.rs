use std::sync::Arc;

use tracing::debug;

use crate::config::PolicyConfig;
use crate::guard::GuardOutcome;
use crate::navigation::{path_matches, routes};
use crate::session::SessionStore;

/// Whether new users are forced through onboarding before the patient area.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnboardingRedirectPolicy {
    /// Leave new users wherever they navigated; onboarding stays reachable
    /// but is not imposed.
    Disabled,
    /// Bounce new users into the onboarding flow until it completes.
    Enforce,
}

impl OnboardingRedirectPolicy {
    pub fn from_config(config: &PolicyConfig) -> Self {
        if config.enforce_onboarding_redirects {
            OnboardingRedirectPolicy::Enforce
        } else {
            OnboardingRedirectPolicy::Disabled
        }
    }
}

impl Default for OnboardingRedirectPolicy {
    fn default() -> Self {
        OnboardingRedirectPolicy::Disabled
    }
}

/// Section-level guard: gates a whole area (patient pages, onboarding) on
/// authentication state.
pub struct AuthGuard {
    store: Arc<SessionStore>,
    require_auth: bool,
    onboarding_policy: OnboardingRedirectPolicy,
}

impl AuthGuard {
    pub fn new(store: Arc<SessionStore>, require_auth: bool) -> Self {
        Self {
            store,
            require_auth,
            onboarding_policy: OnboardingRedirectPolicy::default(),
        }
    }

    pub fn with_onboarding_policy(mut self, policy: OnboardingRedirectPolicy) -> Self {
        self.onboarding_policy = policy;
        self
    }

    /// Run the check to a terminal outcome.
    ///
    /// Blocks on session restoration first, so an authenticated visitor is
    /// never bounced to login while their session is still being rebuilt.
    pub async fn evaluate(&self, current_path: &str) -> GuardOutcome {
        let state = self.store.wait_settled().await;

        if self.require_auth && !state.is_authenticated {
            debug!("unauthenticated visitor on {}, sending to login", current_path);
            return GuardOutcome::Redirect(routes::LOGIN.to_string());
        }

        if self.onboarding_policy == OnboardingRedirectPolicy::Enforce
            && state.is_authenticated
            && state.is_new_user
            && !path_matches(current_path, routes::ONBOARDING)
        {
            debug!("new user on {}, sending to onboarding", current_path);
            return GuardOutcome::Redirect(routes::ONBOARDING.to_string());
        }

        GuardOutcome::Authorized
    }
}
