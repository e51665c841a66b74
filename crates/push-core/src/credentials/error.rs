//! Credential error types.

use thiserror::Error;

/// Errors raised while obtaining a provider access token.
///
/// `Clone` because one failed refresh is shared with every caller that was
/// waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    /// The provider rejected the client credentials or the access token.
    #[error("Credential rejected by provider: {0}")]
    Unauthorized(String),

    /// The provider reports the access token as expired.
    #[error("Access token expired: {0}")]
    Expired(String),

    /// The token endpoint could not be reached or returned an error status.
    #[error("Token request failed: {0}")]
    RequestFailed(String),

    /// The token endpoint answered with something we could not parse.
    #[error("Invalid token response: {0}")]
    InvalidResponse(String),

    /// Local credential material is unusable (bad key, missing field).
    #[error("Invalid credential settings: {0}")]
    InvalidSettings(String),
}

impl CredentialError {
    /// Check if this error means the configured credentials must be fixed.
    pub fn requires_reconfiguration(&self) -> bool {
        matches!(self, Self::Unauthorized(_) | Self::InvalidSettings(_))
    }

    /// Check if this error is transient and a later refresh may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::RequestFailed(_) | Self::InvalidResponse(_) | Self::Expired(_)
        )
    }
}
