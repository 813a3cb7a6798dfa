use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortalConfig {
    pub api: ApiConfig,
    pub provider: ProviderConfig,
    pub policy: PolicyConfig,
}

/// Backend REST API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

/// Identity provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

/// Behavior toggles for the session/permission layer.
///
/// Both toggles exist so the current production behavior (permissive
/// permission checks, onboarding redirects off) can be flipped without a
/// code change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Treat indeterminate permission results as denied instead of granted.
    pub permissions_fail_closed: bool,
    /// Redirect authenticated users with unfinished onboarding into the flow.
    pub enforce_onboarding_redirects: bool,
}

impl PortalConfig {
    pub fn from_env() -> Self {
        Self::defaults().with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // API overrides
        if let Ok(v) = env::var("PORTAL_API_URL") {
            self.api.base_url = v;
        }
        if let Ok(v) = env::var("PORTAL_API_TIMEOUT_SECS") {
            self.api.request_timeout_secs = v.parse().unwrap_or(self.api.request_timeout_secs);
        }

        // Provider overrides
        if let Ok(v) = env::var("PORTAL_PROVIDER_URL") {
            self.provider.base_url = v;
        }
        if let Ok(v) = env::var("PORTAL_PROVIDER_TIMEOUT_SECS") {
            self.provider.request_timeout_secs =
                v.parse().unwrap_or(self.provider.request_timeout_secs);
        }

        // Policy overrides
        if let Ok(v) = env::var("PORTAL_PERMISSIONS_FAIL_CLOSED") {
            self.policy.permissions_fail_closed =
                v.parse().unwrap_or(self.policy.permissions_fail_closed);
        }
        if let Ok(v) = env::var("PORTAL_ENFORCE_ONBOARDING") {
            self.policy.enforce_onboarding_redirects =
                v.parse().unwrap_or(self.policy.enforce_onboarding_redirects);
        }

        self
    }

    fn defaults() -> Self {
        Self {
            api: ApiConfig {
                base_url: "http://localhost:4000/api".to_string(),
                request_timeout_secs: 15,
            },
            provider: ProviderConfig {
                base_url: "http://localhost:4000/auth".to_string(),
                request_timeout_secs: 15,
            },
            policy: PolicyConfig {
                permissions_fail_closed: false,
                enforce_onboarding_redirects: false,
            },
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

impl ProviderConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// Global singleton config - initialized once on first access
pub static CONFIG: Lazy<PortalConfig> = Lazy::new(PortalConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static PortalConfig {
    &CONFIG
}
