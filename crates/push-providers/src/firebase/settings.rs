//! Service-account settings.

use std::path::Path;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::SettingsError;

/// Google OAuth token endpoint used when the service account omits one.
pub const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

const SEND_URL_BASE: &str = "https://fcm.googleapis.com/v1/projects";

/// The fields of a Google service-account JSON document that FCM needs.
///
/// Unknown fields of the document are ignored.
#[derive(Clone, Serialize, Deserialize)]
pub struct FirebaseSettings {
    pub project_id: String,
    /// PEM encoded RSA private key.
    pub private_key: String,
    pub client_email: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_token_uri() -> String {
    DEFAULT_TOKEN_URI.to_string()
}

impl FirebaseSettings {
    pub fn new(
        project_id: impl Into<String>,
        private_key: impl Into<String>,
        client_email: impl Into<String>,
        token_uri: impl Into<String>,
    ) -> Result<Self, SettingsError> {
        let settings = Self {
            project_id: project_id.into(),
            private_key: private_key.into(),
            client_email: client_email.into(),
            token_uri: token_uri.into(),
        };
        settings.validate()?;
        Ok(settings)
    }

    /// Parse the contents of a service-account JSON file.
    pub fn from_json(json: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.project_id.trim().is_empty() {
            return Err(SettingsError::Missing("project_id"));
        }
        if self.private_key.trim().is_empty() {
            return Err(SettingsError::Missing("private_key"));
        }
        if self.client_email.trim().is_empty() {
            return Err(SettingsError::Missing("client_email"));
        }
        Url::parse(&self.token_uri).map_err(|e| SettingsError::invalid("token_uri", e.to_string()))?;
        Ok(())
    }

    /// FCM HTTP v1 send endpoint for this project.
    pub fn send_url(&self) -> String {
        format!("{}/{}/messages:send", SEND_URL_BASE, self.project_id)
    }
}

impl std::fmt::Debug for FirebaseSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseSettings")
            .field("project_id", &self.project_id)
            .field("private_key", &"<redacted>")
            .field("client_email", &self.client_email)
            .field("token_uri", &self.token_uri)
            .finish()
    }
}
