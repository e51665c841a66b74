//! Provider error types.

use std::fmt;

use thiserror::Error;

/// A request the provider answered but refused.
///
/// Carried as the source of [`PushError::Unclassified`](push_core::PushError)
/// so callers can still inspect the raw status and body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    pub provider: &'static str,
    /// HTTP status of the response.
    pub status: u16,
    /// Provider-specific error code, when the body carried one.
    pub code: Option<String>,
    pub message: String,
    /// Raw response body.
    pub body: Option<String>,
}

impl ProviderError {
    pub fn new(provider: &'static str, status: u16, message: impl Into<String>) -> Self {
        Self {
            provider,
            status,
            code: None,
            message: message.into(),
            body: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        let body = body.into();
        self.body = (!body.is_empty()).then_some(body);
        self
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} rejected the request (HTTP {}", self.provider, self.status)?;
        if let Some(code) = &self.code {
            write!(f, ", code {}", code)?;
        }
        write!(f, "): {}", self.message)
    }
}

impl std::error::Error for ProviderError {}

impl From<ProviderError> for push_core::PushError {
    fn from(err: ProviderError) -> Self {
        push_core::PushError::unclassified(err)
    }
}

/// Errors raised while loading provider settings.
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse settings: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid setting {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl SettingsError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
