use std::sync::Arc;

use tracing::{debug, info};

use crate::api::types::PermissionSet;
use crate::guard::{check_fingerprint, CompletedChecks, GuardOutcome};
use crate::navigation::{routes, Capability, NavigationContext};
use crate::permissions::{
    AccessDecision, IndeterminatePolicy, IndeterminateReason, PermissionResolver,
};
use crate::session::SessionStore;

/// Page-level guard: checks the viewer's grant for the requested patient
/// before the page renders.
///
/// Checks are idempotent per input set: the viewer, the patient selector,
/// and the requested path form a fingerprint, and a completed check for
/// that fingerprint is reused instead of re-fetching grants. Overlapping
/// checks for different inputs may still race; the last one to finish wins,
/// which is the intended model.
pub struct PermissionGuard {
    store: Arc<SessionStore>,
    resolver: Arc<PermissionResolver>,
    policy: IndeterminatePolicy,
    completed: CompletedChecks,
}

impl PermissionGuard {
    pub fn new(store: Arc<SessionStore>, resolver: Arc<PermissionResolver>) -> Self {
        Self {
            store,
            resolver,
            policy: IndeterminatePolicy::default(),
            completed: CompletedChecks::new(),
        }
    }

    pub fn with_policy(mut self, policy: IndeterminatePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Forget completed checks, e.g. after grants were edited.
    pub fn reset(&self) {
        self.completed.reset();
    }

    /// Evaluate the requested path to a terminal outcome. Blocks on session
    /// restoration first.
    pub async fn check(&self, requested_path: &str) -> GuardOutcome {
        let state = self.store.wait_settled().await;

        if !state.is_authenticated {
            return GuardOutcome::Redirect(routes::LOGIN.to_string());
        }

        let context = NavigationContext::from_path(requested_path);
        if !context.is_viewing_other_patient {
            // Own data is unrestricted; nothing to resolve.
            return GuardOutcome::Authorized;
        }

        let Some(access_token) = state.access_token.clone() else {
            return GuardOutcome::Redirect(routes::LOGIN.to_string());
        };

        let fingerprint = check_fingerprint(&[
            state.user_id.as_deref().unwrap_or(""),
            context.patient_id.as_deref().unwrap_or(""),
            context.patient_token.as_deref().unwrap_or(""),
            requested_path,
        ]);
        if let Some(outcome) = self.completed.get(&fingerprint) {
            debug!("reusing completed permission check for {}", requested_path);
            return outcome;
        }

        let outcome = self
            .check_uncached(&access_token, &context, requested_path)
            .await;
        self.completed.record(fingerprint, outcome.clone());
        outcome
    }

    async fn check_uncached(
        &self,
        access_token: &str,
        context: &NavigationContext,
        requested_path: &str,
    ) -> GuardOutcome {
        let patient_key = context
            .patient_id
            .as_deref()
            .or(context.patient_token.as_deref())
            .unwrap_or_default();

        let Some(capability) = Capability::for_path(requested_path) else {
            // Statically off limits for another patient: profile, permission
            // management, and unrecognized paths. Grants are consulted only
            // to pick the redirect target.
            info!(
                "{} is not available for another patient, redirecting",
                requested_path
            );
            let permissions = self.known_permissions(access_token, patient_key).await;
            return GuardOutcome::Redirect(context.redirect_target(permissions.as_ref()));
        };

        let (decision, permissions) = match self.resolver.accessible_patients(access_token).await {
            Ok(patients) => (
                AccessDecision::evaluate(&patients, patient_key, capability),
                PermissionResolver::find_patient(&patients, patient_key).map(|p| p.permissions),
            ),
            Err(e) => match IndeterminateReason::classify(&e) {
                Some(reason) => (AccessDecision::Indeterminate(reason), None),
                None => {
                    info!("grant fetch rejected for {}, sending to login", requested_path);
                    return GuardOutcome::Redirect(routes::LOGIN.to_string());
                }
            },
        };

        if decision.admitted_under(self.policy) {
            GuardOutcome::Authorized
        } else {
            let target = context.redirect_target(permissions.as_ref());
            if Capability::for_path(&target) == Some(capability) {
                // The fallback is the page just refused; nothing is
                // accessible for this patient, so the check ends here
                // rather than redirecting the page to itself.
                info!("{} denied for patient {} with nothing accessible", requested_path, patient_key);
                GuardOutcome::Denied
            } else {
                info!("{} denied for patient {}, redirecting to {}", requested_path, patient_key, target);
                GuardOutcome::Redirect(target)
            }
        }
    }

    async fn known_permissions(
        &self,
        access_token: &str,
        patient_key: &str,
    ) -> Option<PermissionSet> {
        match self.resolver.accessible_patients(access_token).await {
            Ok(patients) => {
                PermissionResolver::find_patient(&patients, patient_key).map(|p| p.permissions)
            }
            Err(e) => {
                debug!("grant fetch failed while picking a redirect target: {}", e);
                None
            }
        }
    }
}
