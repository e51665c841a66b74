//! Push Kit messages.

use push_core::{Notification, Tag};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// A Push Kit message to one or more device tokens.
///
/// `message` holds the Push Kit message body (`data`, `notification`,
/// `android`, ...) and is sent as-is; `token` is filled in from `tokens`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HuaweiNotification {
    pub tokens: Vec<String>,
    pub message: Map<String, Value>,
    pub validate_only: bool,
    pub tag: Option<Tag>,
    /// Request id returned by Push Kit after a successful send.
    #[serde(skip_deserializing)]
    pub request_id: Option<String>,
}

impl HuaweiNotification {
    pub fn to_devices<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tokens: tokens.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Data message payload. Push Kit expects a string.
    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.message.insert("data".into(), json!(data.into()));
        self
    }

    pub fn with_notification(mut self, title: impl Into<String>, body: impl Into<String>) -> Self {
        self.message.insert(
            "notification".into(),
            json!({ "title": title.into(), "body": body.into() }),
        );
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    /// The first device token, used to name a stale subscription.
    pub fn first_token(&self) -> Option<&str> {
        self.tokens.first().map(String::as_str)
    }

    /// Request body for `messages:send`.
    pub fn to_request_body(&self) -> Value {
        let mut message = self.message.clone();
        message.insert("token".into(), json!(self.tokens));

        json!({
            "validate_only": self.validate_only,
            "message": message,
        })
    }
}

impl Notification for HuaweiNotification {
    fn is_valid(&self) -> bool {
        !self.tokens.is_empty() && self.tokens.iter().all(|t| !t.trim().is_empty())
    }

    fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    fn set_provider_id(&mut self, id: String) {
        self.request_id = Some(id);
    }
}
