pub mod http;

pub use http::HttpIdentityProvider;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::PortalError;

/// Identity attached to a provider session.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct ProviderUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Session material returned by the identity provider on refresh.
///
/// Providers rotate the refresh token on use; `refresh_token` is optional
/// so a provider that does not rotate keeps the stored one valid.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<f64>,
    #[serde(default)]
    pub user: Option<ProviderUser>,
}

/// Upstream identity provider operations the session layer depends on.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Exchange a stored refresh token for a fresh session.
    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, PortalError>;

    /// Revoke the session server-side during sign-out.
    async fn revoke(&self, access_token: &str) -> Result<(), PortalError>;
}
