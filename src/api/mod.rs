pub mod http;
pub mod types;

pub use http::HttpPortalApi;
pub use types::{
    AccessiblePatient, FamilyHistoryEntry, Integrations, IntegrationsUpdate, NewOAuthProfile,
    PermissionSet, ProfileUpdate, UserProfile, GRANTED_FOR_SELF,
};

use async_trait::async_trait;

use crate::error::PortalError;

/// Backend profile/permission REST API, as consumed by the session and
/// permission layers. Calls carry the viewer's bearer access token.
#[async_trait]
pub trait PortalApi: Send + Sync {
    /// Fetch the viewer's own profile. `Ok(None)` means the account exists at
    /// the identity provider but has no backend profile yet (first OAuth
    /// sign-in).
    async fn get_profile(&self, access_token: &str) -> Result<Option<UserProfile>, PortalError>;

    async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, PortalError>;

    /// Create the backend profile for a first-time OAuth user.
    async fn create_oauth_user_profile(
        &self,
        access_token: &str,
        profile: &NewOAuthProfile,
    ) -> Result<UserProfile, PortalError>;

    /// All patients the viewer may access, own record included.
    async fn get_accessible_patients(
        &self,
        access_token: &str,
    ) -> Result<Vec<AccessiblePatient>, PortalError>;

    async fn get_integrations(&self, access_token: &str) -> Result<Integrations, PortalError>;

    async fn update_integrations(
        &self,
        access_token: &str,
        update: &IntegrationsUpdate,
    ) -> Result<Integrations, PortalError>;
}
