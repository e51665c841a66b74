//! OAuth access tokens for FCM via a signed service-account assertion.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use push_core::{CredentialError, CredentialSource, RefreshedToken};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::FirebaseSettings;
use crate::error::SettingsError;

/// OAuth scope required to send FCM messages.
pub const FIREBASE_MESSAGING_SCOPE: &str = "https://www.googleapis.com/auth/firebase.messaging";

const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Assertions must be short lived; Google accepts at most one hour.
const ASSERTION_LIFETIME_SECS: u64 = 3600;

/// Claims of the self-signed assertion exchanged for an access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionClaims {
    pub iss: String,
    pub scope: String,
    pub aud: String,
    pub iat: u64,
    pub exp: u64,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    /// Seconds.
    expires_in: u64,
}

#[derive(Debug, Default, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

/// Exchanges an RS256 service-account assertion for an access token.
pub struct FirebaseTokenSource {
    client_email: String,
    token_uri: String,
    key: EncodingKey,
    client: reqwest::Client,
}

impl FirebaseTokenSource {
    pub fn new(settings: &FirebaseSettings, client: reqwest::Client) -> Result<Self, SettingsError> {
        let key = EncodingKey::from_rsa_pem(settings.private_key.as_bytes())
            .map_err(|e| SettingsError::invalid("private_key", e.to_string()))?;

        Ok(Self {
            client_email: settings.client_email.clone(),
            token_uri: settings.token_uri.clone(),
            key,
            client,
        })
    }

    /// Build the signed assertion issued at `iat` (Unix seconds).
    pub fn assertion(&self, iat: u64) -> Result<String, CredentialError> {
        let claims = AssertionClaims {
            iss: self.client_email.clone(),
            scope: FIREBASE_MESSAGING_SCOPE.to_string(),
            aud: self.token_uri.clone(),
            iat,
            exp: iat + ASSERTION_LIFETIME_SECS,
        };

        encode(&Header::new(Algorithm::RS256), &claims, &self.key)
            .map_err(|e| CredentialError::InvalidSettings(format!("Failed to sign assertion: {}", e)))
    }
}

#[async_trait]
impl CredentialSource for FirebaseTokenSource {
    async fn refresh(&self) -> Result<RefreshedToken, CredentialError> {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_err(|e| CredentialError::InvalidSettings(e.to_string()))?
            .as_secs();
        let assertion = self.assertion(now)?;

        let response = self
            .client
            .post(&self.token_uri)
            .form(&[("grant_type", JWT_BEARER_GRANT), ("assertion", assertion.as_str())])
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
        debug!(expires_in = token.expires_in, "Received Firebase access token");

        Ok(RefreshedToken::new(
            token.access_token,
            Duration::from_secs(token.expires_in),
        ))
    }
}

/// Map a failed token exchange to a credential error.
fn token_error(status: u16, body: &str) -> CredentialError {
    let parsed: TokenErrorResponse = serde_json::from_str(body).unwrap_or_default();
    let detail = if parsed.error.is_empty() {
        format!("HTTP {}: {}", status, body)
    } else {
        format!("{}: {}", parsed.error, parsed.error_description)
    };

    match status {
        // invalid_grant / invalid_client: the service account itself is bad.
        400 | 401 | 403 => CredentialError::Unauthorized(detail),
        _ => CredentialError::RequestFailed(detail),
    }
}
