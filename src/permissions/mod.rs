use std::fmt;
use std::sync::Arc;

use tracing::warn;

use crate::api::types::AccessiblePatient;
use crate::api::PortalApi;
use crate::config::PolicyConfig;
use crate::error::PortalError;
use crate::navigation::Capability;

/// Why a permission check could not reach a definitive answer.
#[derive(Debug, Clone, PartialEq)]
pub enum IndeterminateReason {
    /// Backend unreachable while fetching grants.
    Connectivity,
    /// Grant fetch failed in an uncategorized way.
    Unknown(String),
}

impl IndeterminateReason {
    /// Classify a failed grant fetch. Auth failures return `None`: they are
    /// not indeterminate, the caller must send the viewer back to login.
    pub fn classify(error: &PortalError) -> Option<IndeterminateReason> {
        if error.is_auth() {
            return None;
        }
        if error.is_connectivity() {
            return Some(IndeterminateReason::Connectivity);
        }
        Some(IndeterminateReason::Unknown(error.to_string()))
    }
}

impl fmt::Display for IndeterminateReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndeterminateReason::Connectivity => write!(f, "backend unreachable"),
            IndeterminateReason::Unknown(message) => write!(f, "grant fetch failed: {}", message),
        }
    }
}

/// Outcome of asking "may the viewer use this capability on this patient?".
///
/// `Denied` is reserved for definitive answers: the patient is not in the
/// viewer's grant list, or the grant exists with the capability off.
/// Anything short of definitive is `Indeterminate` and left for the
/// [`IndeterminatePolicy`] to resolve.
#[derive(Debug, Clone, PartialEq)]
pub enum AccessDecision {
    Granted,
    Denied,
    Indeterminate(IndeterminateReason),
}

impl AccessDecision {
    /// Pure decision over an already-fetched grant list.
    pub fn evaluate(
        patients: &[AccessiblePatient],
        patient_id: &str,
        capability: Capability,
    ) -> AccessDecision {
        match PermissionResolver::find_patient(patients, patient_id) {
            Some(patient) if capability.allowed(&patient.permissions) => AccessDecision::Granted,
            Some(_) | None => AccessDecision::Denied,
        }
    }

    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted)
    }

    /// Collapse to admit/refuse under the given indeterminate policy.
    pub fn admitted_under(&self, policy: IndeterminatePolicy) -> bool {
        match self {
            AccessDecision::Granted => true,
            AccessDecision::Denied => false,
            AccessDecision::Indeterminate(reason) => policy.admits(reason),
        }
    }
}

/// Single rule for resolving indeterminate permission checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndeterminatePolicy {
    /// Admit the viewer; the backend still rejects unauthorized data calls.
    FailOpen,
    /// Refuse whenever grants cannot be fetched.
    FailClosed,
}

impl IndeterminatePolicy {
    pub fn from_config(config: &PolicyConfig) -> Self {
        if config.permissions_fail_closed {
            IndeterminatePolicy::FailClosed
        } else {
            IndeterminatePolicy::FailOpen
        }
    }

    pub fn admits(&self, reason: &IndeterminateReason) -> bool {
        match self {
            IndeterminatePolicy::FailOpen => {
                warn!("admitting viewer on indeterminate permission check: {}", reason);
                true
            }
            IndeterminatePolicy::FailClosed => false,
        }
    }
}

impl Default for IndeterminatePolicy {
    fn default() -> Self {
        IndeterminatePolicy::FailOpen
    }
}

/// Answers what the current viewer may do with a given patient's data.
pub struct PermissionResolver {
    api: Arc<dyn PortalApi>,
}

impl PermissionResolver {
    pub fn new(api: Arc<dyn PortalApi>) -> Self {
        Self { api }
    }

    /// Fetch the viewer's grant list. Always fetched fresh; grants change
    /// server-side without notice.
    pub async fn accessible_patients(
        &self,
        access_token: &str,
    ) -> Result<Vec<AccessiblePatient>, PortalError> {
        let patients = self.api.get_accessible_patients(access_token).await?;

        let self_entries = patients.iter().filter(|p| p.is_self()).count();
        if self_entries != 1 {
            warn!(
                "expected exactly one self grant, backend returned {}",
                self_entries
            );
        }

        Ok(patients)
    }

    /// Pure lookup over an already-fetched grant list.
    pub fn find_patient<'a>(
        patients: &'a [AccessiblePatient],
        patient_id: &str,
    ) -> Option<&'a AccessiblePatient> {
        patients.iter().find(|p| p.patient_id == patient_id)
    }
}
