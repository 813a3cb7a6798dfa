pub mod auth;
pub mod permission;
pub mod task;

pub use auth::{AuthGuard, OnboardingRedirectPolicy};
pub use permission::PermissionGuard;
pub use task::GuardTask;

use std::collections::HashMap;
use std::sync::RwLock;

use sha2::{Digest, Sha256};

/// Render decision for a guarded page.
///
/// Guards move from `Pending` to exactly one terminal state; inputs changing
/// after that starts a new check rather than mutating the old one.
#[derive(Debug, Clone, PartialEq)]
pub enum GuardOutcome {
    /// Check not finished; render the loading indicator, never a redirect.
    Pending,
    /// Render the wrapped page.
    Authorized,
    /// Refused with nowhere else to send the viewer; render the
    /// permission-denied state in place.
    Denied,
    /// Send the viewer to the contained target; the page never renders.
    Redirect(String),
}

impl GuardOutcome {
    pub fn is_authorized(&self) -> bool {
        matches!(self, GuardOutcome::Authorized)
    }

    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            GuardOutcome::Redirect(target) => Some(target),
            _ => None,
        }
    }
}

/// Fingerprint of a check's permission-relevant inputs. Parts are length
/// separated so `["ab", "c"]` and `["a", "bc"]` hash differently.
pub fn check_fingerprint(parts: &[&str]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// Cache of completed checks keyed by input fingerprint.
///
/// Re-running a guard with unchanged inputs reuses the recorded outcome;
/// any input change produces a new fingerprint and a fresh check. Only
/// terminal outcomes belong here, never `Pending`.
#[derive(Default)]
pub struct CompletedChecks {
    entries: RwLock<HashMap<String, GuardOutcome>>,
}

impl CompletedChecks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, fingerprint: &str) -> Option<GuardOutcome> {
        self.entries.read().ok()?.get(fingerprint).cloned()
    }

    pub fn record(&self, fingerprint: String, outcome: GuardOutcome) {
        if let Ok(mut entries) = self.entries.write() {
            entries.insert(fingerprint, outcome);
        }
    }

    /// Drop every recorded outcome, e.g. after a sign-in change.
    pub fn reset(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }
}
