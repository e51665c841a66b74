//! FCM HTTP v1 messages.

use std::collections::BTreeMap;

use push_core::{Notification, Tag};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// Basic notification template shared across platforms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FirebaseContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// A single FCM message.
///
/// Exactly one of `token`, `topic` and `condition` must be set. Platform
/// blocks (`android`, `apns`, `webpush`) are passed through untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FirebaseNotification {
    /// Registration token of the target device.
    pub token: Option<String>,
    pub topic: Option<String>,
    /// Topic condition, e.g. `'a' in topics && 'b' in topics`.
    pub condition: Option<String>,
    pub notification: Option<FirebaseContent>,
    pub data: BTreeMap<String, String>,
    pub android: Option<Value>,
    pub apns: Option<Value>,
    pub webpush: Option<Value>,
    /// Ask FCM to validate the message without delivering it.
    pub validate_only: bool,
    /// Caller correlation data, never sent.
    pub tag: Option<Tag>,
    /// Message name assigned by FCM after a successful send.
    #[serde(skip_deserializing)]
    pub message_id: Option<String>,
}

impl FirebaseNotification {
    /// Message addressed to one device.
    pub fn to_device(token: impl Into<String>) -> Self {
        Self {
            token: Some(token.into()),
            ..Default::default()
        }
    }

    /// Message addressed to a topic.
    pub fn to_topic(topic: impl Into<String>) -> Self {
        Self {
            topic: Some(topic.into()),
            ..Default::default()
        }
    }

    pub fn with_notification(mut self, title: impl Into<String>, body: impl Into<String>) -> Self {
        self.notification = Some(FirebaseContent {
            title: Some(title.into()),
            body: Some(body.into()),
            image: None,
        });
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, tag: Tag) -> Self {
        self.tag = Some(tag);
        self
    }

    fn targets(&self) -> impl Iterator<Item = &str> {
        [&self.token, &self.topic, &self.condition]
            .into_iter()
            .filter_map(|t| t.as_deref())
            .filter(|t| !t.trim().is_empty())
    }

    /// The destination this message is addressed to.
    pub fn target(&self) -> Option<&str> {
        self.targets().next()
    }

    /// Request body for `messages:send`.
    pub fn to_request_body(&self) -> Value {
        let mut message = Map::new();

        if let Some(token) = &self.token {
            message.insert("token".into(), json!(token));
        }
        if let Some(topic) = &self.topic {
            message.insert("topic".into(), json!(topic));
        }
        if let Some(condition) = &self.condition {
            message.insert("condition".into(), json!(condition));
        }
        if let Some(notification) = &self.notification {
            message.insert("notification".into(), json!(notification));
        }
        if !self.data.is_empty() {
            message.insert("data".into(), json!(self.data));
        }
        for (key, block) in [
            ("android", &self.android),
            ("apns", &self.apns),
            ("webpush", &self.webpush),
        ] {
            if let Some(block) = block {
                message.insert(key.into(), block.clone());
            }
        }

        let mut body = json!({ "message": message });
        if self.validate_only {
            body["validate_only"] = json!(true);
        }
        body
    }
}

impl Notification for FirebaseNotification {
    fn is_valid(&self) -> bool {
        self.targets().count() == 1
    }

    fn tag(&self) -> Option<&Tag> {
        self.tag.as_ref()
    }

    fn set_provider_id(&mut self, id: String) {
        self.message_id = Some(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exactly_one_target_required() {
        assert!(FirebaseNotification::to_device("device-token").is_valid());
        assert!(FirebaseNotification::to_topic("news").is_valid());
        assert!(!FirebaseNotification::default().is_valid());
        assert!(!FirebaseNotification::to_device("   ").is_valid());

        let mut both = FirebaseNotification::to_device("device-token");
        both.topic = Some("news".into());
        assert!(!both.is_valid());
    }

    #[test]
    fn test_request_body_shape() {
        let mut n = FirebaseNotification::to_device("abc")
            .with_notification("Hello", "World")
            .with_data("order", "42")
            .with_tag(json!({"row": 7}));
        n.android = Some(json!({"priority": "high"}));

        let body = n.to_request_body();
        assert_eq!(
            body,
            json!({
                "message": {
                    "token": "abc",
                    "notification": {"title": "Hello", "body": "World"},
                    "data": {"order": "42"},
                    "android": {"priority": "high"}
                }
            })
        );
    }

    #[test]
    fn test_validate_only_flag() {
        let mut n = FirebaseNotification::to_topic("news");
        n.validate_only = true;
        assert_eq!(n.to_request_body()["validate_only"], json!(true));
    }

    #[test]
    fn test_deserialize_from_input() {
        let n: FirebaseNotification = serde_json::from_value(json!({
            "token": "abc",
            "notification": {"title": "Hi"},
            "tag": "row-1"
        }))
        .unwrap();

        assert_eq!(n.target(), Some("abc"));
        assert_eq!(n.tag(), Some(&json!("row-1")));
        assert!(n.message_id.is_none());
    }
}
