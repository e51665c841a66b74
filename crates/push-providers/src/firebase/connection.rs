//! FCM HTTP v1 connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use push_core::{
    CancellationToken, Connection, ConnectionFactory, CredentialCache, CredentialError,
    Notification, PushError,
};
use reqwest::StatusCode;
use serde::Deserialize;
use tracing::{debug, trace};

use super::{FirebaseNotification, FirebaseSettings, FirebaseTokenSource};
use crate::error::{ProviderError, SettingsError};
use crate::http::{self, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_AFTER};

const PROVIDER: &str = "firebase";

/// Tokens are refreshed this long before Google's deadline.
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(10);

#[derive(Debug, Default, Deserialize)]
struct SendResponse {
    name: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorBody {
    message: String,
    status: Option<String>,
    details: Vec<ErrorDetail>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ErrorDetail {
    #[serde(rename = "errorCode")]
    error_code: Option<String>,
}

impl ErrorBody {
    /// The FCM error code, falling back to the canonical status.
    fn code(&self) -> Option<&str> {
        self.details
            .iter()
            .find_map(|d| d.error_code.as_deref())
            .or(self.status.as_deref())
    }
}

/// How a `messages:send` response should be reported.
#[derive(Debug)]
pub(crate) enum Verdict {
    /// Accepted; carries the message name.
    Delivered(Option<String>),
    /// The access token was rejected.
    Unauthorized(String),
    Failed(PushError),
}

pub(crate) fn classify(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
    target: &str,
) -> Verdict {
    if status.is_success() {
        let response: SendResponse = serde_json::from_str(body).unwrap_or_default();
        return Verdict::Delivered(response.name);
    }

    let error = serde_json::from_str::<ErrorEnvelope>(body)
        .ok()
        .and_then(|e| e.error)
        .unwrap_or_default();
    let code = error.code().map(str::to_string);
    let message = if error.message.is_empty() {
        status.canonical_reason().unwrap_or("Unknown error").to_string()
    } else {
        error.message.clone()
    };

    if code.as_deref() == Some("UNREGISTERED") || status == StatusCode::NOT_FOUND {
        return Verdict::Failed(PushError::subscription_expired(target, None));
    }

    if status == StatusCode::UNAUTHORIZED {
        return Verdict::Unauthorized(message);
    }

    if status == StatusCode::TOO_MANY_REQUESTS {
        let delay = retry_after.unwrap_or(DEFAULT_RETRY_AFTER);
        return Verdict::Failed(PushError::retry_after(message, delay));
    }

    if status.is_server_error()
        && let Some(delay) = retry_after
    {
        return Verdict::Failed(PushError::retry_after(message, delay));
    }

    let mut err = ProviderError::new(PROVIDER, status.as_u16(), message).with_body(body);
    if let Some(code) = code {
        err = err.with_code(code);
    }
    Verdict::Failed(err.into())
}

/// Sends messages through the FCM HTTP v1 API.
pub struct FirebaseConnection {
    client: reqwest::Client,
    credentials: Arc<CredentialCache>,
    send_url: String,
}

impl FirebaseConnection {
    async fn deliver(&self, notification: &mut FirebaseNotification) -> Result<(), PushError> {
        let token = self.credentials.get_token().await?;
        let target = notification.target().unwrap_or_default().to_string();

        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(&token)
            .json(&notification.to_request_body())
            .send()
            .await
            .map_err(http::request_failed)?;

        let status = response.status();
        let retry_after = http::parse_retry_after(response.headers());
        let body = response.text().await.map_err(http::request_failed)?;
        trace!(status = status.as_u16(), %body, "FCM response");

        match classify(status, retry_after, &body, &target) {
            Verdict::Delivered(name) => {
                if let Some(name) = name {
                    notification.set_provider_id(name);
                }
                Ok(())
            }
            Verdict::Unauthorized(message) => {
                debug!("FCM rejected the access token, invalidating it");
                self.credentials.invalidate(&token);
                Err(CredentialError::Unauthorized(message).into())
            }
            Verdict::Failed(err) => Err(err),
        }
    }
}

#[async_trait]
impl Connection<FirebaseNotification> for FirebaseConnection {
    async fn send(
        &self,
        notification: &mut FirebaseNotification,
        cancel: &CancellationToken,
    ) -> Result<(), PushError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PushError::Cancelled),
            result = self.deliver(notification) => result,
        }
    }
}

/// Creates one [`FirebaseConnection`] per worker, all sharing one token cache.
pub struct FirebaseConnectionFactory {
    credentials: Arc<CredentialCache>,
    send_url: String,
    timeout: Duration,
}

impl FirebaseConnectionFactory {
    pub fn new(settings: &FirebaseSettings) -> Result<Self, SettingsError> {
        Self::with_timeout(settings, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(settings: &FirebaseSettings, timeout: Duration) -> Result<Self, SettingsError> {
        settings.validate()?;
        let source = FirebaseTokenSource::new(settings, http::build_client(timeout))?;

        Ok(Self {
            credentials: Arc::new(
                CredentialCache::new(source).with_refresh_margin(TOKEN_REFRESH_MARGIN),
            ),
            send_url: settings.send_url(),
            timeout,
        })
    }

    pub fn credentials(&self) -> &Arc<CredentialCache> {
        &self.credentials
    }
}

impl ConnectionFactory<FirebaseNotification> for FirebaseConnectionFactory {
    fn create(&self) -> Box<dyn Connection<FirebaseNotification>> {
        Box::new(FirebaseConnection {
            client: http::build_client(self.timeout),
            credentials: self.credentials.clone(),
            send_url: self.send_url.clone(),
        })
    }
}
