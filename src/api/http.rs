use async_trait::async_trait;
use serde::de::DeserializeOwned;

use crate::api::types::{
    AccessiblePatient, Integrations, IntegrationsUpdate, NewOAuthProfile, ProfileUpdate,
    UserProfile,
};
use crate::api::PortalApi;
use crate::config::ApiConfig;
use crate::error::PortalError;

/// Backend REST client.
///
/// Transport failures (timeout, refused or reset connections) classify as
/// connectivity errors, non-success statuses via `PortalError::from_status`.
pub struct HttpPortalApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpPortalApi {
    pub fn new(config: &ApiConfig) -> Result<Self, PortalError> {
        let base_url = normalize_base_url(&config.base_url)?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PortalError::unknown(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn handle_response<T: DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, PortalError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let body = response.text().await.unwrap_or_default();
        Err(PortalError::from_status(status.as_u16(), &body))
    }
}

#[async_trait]
impl PortalApi for HttpPortalApi {
    async fn get_profile(&self, access_token: &str) -> Result<Option<UserProfile>, PortalError> {
        let response = self
            .client
            .get(self.url("/profile"))
            .bearer_auth(access_token)
            .send()
            .await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Self::handle_response(response).await.map(Some)
    }

    async fn update_profile(
        &self,
        access_token: &str,
        update: &ProfileUpdate,
    ) -> Result<UserProfile, PortalError> {
        let response = self
            .client
            .patch(self.url("/profile"))
            .bearer_auth(access_token)
            .json(update)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn create_oauth_user_profile(
        &self,
        access_token: &str,
        profile: &NewOAuthProfile,
    ) -> Result<UserProfile, PortalError> {
        let response = self
            .client
            .post(self.url("/profile/oauth"))
            .bearer_auth(access_token)
            .json(profile)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn get_accessible_patients(
        &self,
        access_token: &str,
    ) -> Result<Vec<AccessiblePatient>, PortalError> {
        let response = self
            .client
            .get(self.url("/patients/accessible"))
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn get_integrations(&self, access_token: &str) -> Result<Integrations, PortalError> {
        let response = self
            .client
            .get(self.url("/integrations"))
            .bearer_auth(access_token)
            .send()
            .await?;
        Self::handle_response(response).await
    }

    async fn update_integrations(
        &self,
        access_token: &str,
        update: &IntegrationsUpdate,
    ) -> Result<Integrations, PortalError> {
        let response = self
            .client
            .patch(self.url("/integrations"))
            .bearer_auth(access_token)
            .json(update)
            .send()
            .await?;
        Self::handle_response(response).await
    }
}

/// Validate and normalize a configured base URL (scheme check, no trailing
/// slash). Shared with the identity-provider client.
pub(crate) fn normalize_base_url(raw: &str) -> Result<String, PortalError> {
    let cleaned = raw.trim_end_matches('/');
    let parsed = url::Url::parse(cleaned)
        .map_err(|e| PortalError::unknown(format!("invalid base URL '{}': {}", cleaned, e)))?;

    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(PortalError::unknown(format!(
            "base URL must use http or https, got: {}",
            parsed.scheme()
        )));
    }

    Ok(cleaned.to_string())
}
