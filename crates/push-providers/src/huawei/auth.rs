//! OAuth client-credentials tokens for Push Kit.

use std::time::Duration;

use async_trait::async_trait;
use push_core::{CredentialError, CredentialSource, RefreshedToken};
use serde::Deserialize;
use tracing::debug;

use super::HuaweiSettings;

/// Huawei OAuth 2.0 token endpoint.
pub const TOKEN_URL: &str = "https://oauth-login.cloud.huawei.com/oauth2/v3/token";

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds.
    expires_in: u64,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: Option<serde_json::Value>,
    #[serde(default)]
    error_description: String,
}

pub struct HuaweiTokenSource {
    client_id: String,
    client_secret: String,
    token_url: String,
    client: reqwest::Client,
}

impl HuaweiTokenSource {
    pub fn new(settings: &HuaweiSettings, client: reqwest::Client) -> Self {
        Self {
            client_id: settings.client_id().to_string(),
            client_secret: settings.client_secret.clone(),
            token_url: TOKEN_URL.to_string(),
            client,
        }
    }
}

#[async_trait]
impl CredentialSource for HuaweiTokenSource {
    async fn refresh(&self) -> Result<RefreshedToken, CredentialError> {
        let response = self
            .client
            .post(&self.token_url)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ])
            .send()
            .await
            .map_err(|e| CredentialError::RequestFailed(e.to_string()))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| CredentialError::RequestFailed(e.to_string()))?;

        if !status.is_success() {
            return Err(token_error(status.as_u16(), &body));
        }

        let token: TokenResponse = serde_json::from_str(&body)
            .map_err(|e| CredentialError::InvalidResponse(e.to_string()))?;
        debug!(expires_in = token.expires_in, "Received Huawei access token");

        Ok(RefreshedToken::new(
            token.access_token,
            Duration::from_secs(token.expires_in),
        ))
    }
}

fn token_error(status: u16, body: &str) -> CredentialError {
    let parsed: TokenErrorResponse = serde_json::from_str(body).unwrap_or_default();
    let detail = match parsed.error {
        Some(error) => format!("{}: {}", error, parsed.error_description),
        None => format!("HTTP {}: {}", status, body),
    };

    match status {
        400 | 401 | 403 => CredentialError::Unauthorized(detail),
        _ => CredentialError::RequestFailed(detail),
    }
}
