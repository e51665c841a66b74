//! Push Kit HTTP connection.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use push_core::{
    CancellationToken, Connection, ConnectionFactory, CredentialCache, CredentialError,
    Notification, PushError,
};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, trace};

use super::{HuaweiNotification, HuaweiSettings, HuaweiTokenSource};
use crate::error::{ProviderError, SettingsError};
use crate::http::{self, DEFAULT_REQUEST_TIMEOUT, DEFAULT_RETRY_AFTER};

const PROVIDER: &str = "huawei";

/// Huawei tokens are refreshed a minute before they expire.
pub const TOKEN_REFRESH_MARGIN: Duration = Duration::from_secs(60);

const SUCCESS: &str = "80000000";
const OAUTH_ERROR: &str = "80200001";
const OAUTH_TOKEN_EXPIRED: &str = "80200003";
const INVALID_TOKEN: &str = "80300007";

/// Human readable meaning of a Push Kit result code.
pub fn code_description(code: &str) -> Option<&'static str> {
    let description = match code {
        "80000000" => "Success",
        "80100000" => "Some tokens were rejected; verify the illegal_tokens in the response",
        "80100001" => "Some request parameters are incorrect",
        "80100002" => "The number of tokens must be 1 when sending in synchronous mode",
        "80100003" => "Incorrect message structure",
        "80100004" => "The message expiration time is earlier than the current time",
        "80100013" => "The collapse_key message field is invalid",
        "80100017" => "A maximum of 100 topic-based messages can be sent at the same time",
        "80200001" => "OAuth authentication error",
        "80200003" => "OAuth token expired",
        "80300002" => "The app does not have permission to send messages",
        "80300007" => "All tokens are invalid",
        "80300008" => "The message body size exceeds 4096 bytes",
        "80300010" => "The number of tokens in the message body exceeds the limit",
        "80600003" => "Failed to request the OAuth service",
        "81000001" => "Internal Push Kit error",
        _ => return None,
    };
    Some(description)
}

/// Human readable meaning of an HTTP status returned by Push Kit.
pub fn status_description(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "Incorrect request parameters; rectify the fault as prompted",
        401 => "Verify the access token in the Authorization header",
        404 => "Verify the request URI",
        500 => "Internal service error; contact Huawei technical support",
        502 => "Connection could not be established; try again later",
        503 => "Service flow control; reduce the QPS",
        _ => status.canonical_reason().unwrap_or("Unknown error"),
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct SendResponse {
    /// Push Kit sends this as a string, older gateways as a number.
    code: Option<Value>,
    msg: Option<String>,
    #[serde(rename = "requestId")]
    request_id: Option<String>,
}

impl SendResponse {
    fn code(&self) -> Option<String> {
        match self.code.as_ref()? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug)]
pub(crate) enum Verdict {
    Delivered(Option<String>),
    /// Access token expired; worth one retry with a fresh token.
    TokenExpired(String),
    Unauthorized(String),
    Failed(PushError),
}

pub(crate) fn classify(
    status: StatusCode,
    retry_after: Option<Duration>,
    body: &str,
    first_token: &str,
) -> Verdict {
    let response: SendResponse = serde_json::from_str(body).unwrap_or_default();
    let code = response.code();
    let message = response
        .msg
        .clone()
        .filter(|m| !m.is_empty())
        .or_else(|| code.as_deref().and_then(code_description).map(str::to_string))
        .unwrap_or_else(|| status_description(status).to_string());

    if status == StatusCode::UNAUTHORIZED {
        return Verdict::Unauthorized(message);
    }

    if matches!(
        status,
        StatusCode::BAD_GATEWAY | StatusCode::SERVICE_UNAVAILABLE
    ) {
        let delay = retry_after.unwrap_or(DEFAULT_RETRY_AFTER);
        return Verdict::Failed(PushError::retry_after(message, delay));
    }

    match code.as_deref() {
        Some(SUCCESS) if status.is_success() => return Verdict::Delivered(response.request_id),
        Some(OAUTH_TOKEN_EXPIRED) => return Verdict::TokenExpired(message),
        Some(OAUTH_ERROR) => return Verdict::Unauthorized(message),
        Some(INVALID_TOKEN) => {
            return Verdict::Failed(PushError::subscription_expired(first_token, None));
        }
        _ => {}
    }

    let mut err = ProviderError::new(PROVIDER, status.as_u16(), message).with_body(body);
    if let Some(code) = code {
        err = err.with_code(code);
    }
    Verdict::Failed(err.into())
}

/// Sends messages through the Push Kit `messages:send` API.
pub struct HuaweiConnection {
    client: reqwest::Client,
    credentials: Arc<CredentialCache>,
    send_url: String,
}

impl HuaweiConnection {
    async fn deliver(&self, notification: &mut HuaweiNotification) -> Result<(), PushError> {
        let first_token = notification.first_token().unwrap_or_default().to_string();
        let body = notification.to_request_body();
        let mut retried = false;

        loop {
            let token = self.credentials.get_token().await?;

            let response = self
                .client
                .post(&self.send_url)
                .bearer_auth(&token)
                .json(&body)
                .send()
                .await
                .map_err(http::request_failed)?;

            let status = response.status();
            let retry_after = http::parse_retry_after(response.headers());
            let text = response.text().await.map_err(http::request_failed)?;
            trace!(status = status.as_u16(), body = %text, "Push Kit response");

            match classify(status, retry_after, &text, &first_token) {
                Verdict::Delivered(request_id) => {
                    if let Some(request_id) = request_id {
                        notification.set_provider_id(request_id);
                    }
                    return Ok(());
                }
                Verdict::TokenExpired(message) => {
                    self.credentials.invalidate(&token);
                    if retried {
                        return Err(CredentialError::Expired(message).into());
                    }
                    debug!("Push Kit access token expired, retrying with a fresh one");
                    retried = true;
                }
                Verdict::Unauthorized(message) => {
                    self.credentials.invalidate(&token);
                    return Err(CredentialError::Unauthorized(message).into());
                }
                Verdict::Failed(err) => return Err(err),
            }
        }
    }
}

#[async_trait]
impl Connection<HuaweiNotification> for HuaweiConnection {
    async fn send(
        &self,
        notification: &mut HuaweiNotification,
        cancel: &CancellationToken,
    ) -> Result<(), PushError> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(PushError::Cancelled),
            result = self.deliver(notification) => result,
        }
    }
}

/// Creates one [`HuaweiConnection`] per worker, all sharing one token cache.
pub struct HuaweiConnectionFactory {
    credentials: Arc<CredentialCache>,
    send_url: String,
    timeout: Duration,
}

impl HuaweiConnectionFactory {
    pub fn new(settings: &HuaweiSettings) -> Result<Self, SettingsError> {
        Self::with_timeout(settings, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(settings: &HuaweiSettings, timeout: Duration) -> Result<Self, SettingsError> {
        settings.validate()?;
        let source = HuaweiTokenSource::new(settings, http::build_client(timeout));

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

impl ConnectionFactory<HuaweiNotification> for HuaweiConnectionFactory {
    fn create(&self) -> Box<dyn Connection<HuaweiNotification>> {
        Box::new(HuaweiConnection {
            client: http::build_client(self.timeout),
            credentials: self.credentials.clone(),
            send_url: self.send_url.clone(),
        })
    }
}
