//! The unit of work carried by the engine.

/// Caller-supplied correlation data.
pub type Tag = serde_json::Value;

/// A single outbound push message.
///
/// The engine treats notifications as opaque: it only asks whether one is
/// structurally valid before handing it to a connection. A connection may
/// attach the provider-issued message id after a successful send.
pub trait Notification: Send + 'static {
    /// Whether the notification can be sent at all (destination present, ...).
    fn is_valid(&self) -> bool;

    /// Correlation data for matching outcomes back to callers.
    fn tag(&self) -> Option<&Tag> {
        None
    }

    /// Record the identifier the provider assigned to this message.
    fn set_provider_id(&mut self, _id: String) {}
}
