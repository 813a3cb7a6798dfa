use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

use crate::api::http::normalize_base_url;
use crate::config::ProviderConfig;
use crate::error::PortalError;
use crate::provider::{IdentityProvider, ProviderSession};

/// HTTP client for the hosted identity provider.
pub struct HttpIdentityProvider {
    client: reqwest::Client,
    base_url: String,
}

impl HttpIdentityProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, PortalError> {
        let base_url = normalize_base_url(&config.base_url)?;
        let client = reqwest::Client::builder()
            .connect_timeout(config.request_timeout())
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| PortalError::unknown(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl IdentityProvider for HttpIdentityProvider {
    async fn refresh_session(&self, refresh_token: &str) -> Result<ProviderSession, PortalError> {
        debug!("requesting session refresh from identity provider");

        let response = self
            .client
            .post(format!("{}/token", self.base_url))
            .query(&[("grant_type", "refresh_token")])
            .json(&json!({ "refresh_token": refresh_token }))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<ProviderSession>().await?);
        }

        let body = response.text().await.unwrap_or_default();
        Err(PortalError::from_status(status.as_u16(), &body))
    }

    async fn revoke(&self, access_token: &str) -> Result<(), PortalError> {
        debug!("revoking provider session");

        let response = self
            .client
            .post(format!("{}/logout", self.base_url))
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        Err(PortalError::from_status(status.as_u16(), &body))
    }
}
