//! Error types for the dispatch engine.
//!
//! Two families live here:
//! - [`PushError`] is the per-notification reporting taxonomy. It is carried by
//!   [`Outcome::Failed`](crate::Outcome::Failed) and never drives control flow
//!   inside the engine.
//! - [`BrokerError`] and [`EnqueueError`] are raised synchronously to callers
//!   who misuse the broker API.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::credentials::CredentialError;

/// Boxed error used for unclassified failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Shortest backoff a [`PushError::RetryAfter`] can request.
const MIN_RETRY_AFTER: Duration = Duration::from_secs(1);

/// Why a single notification was not delivered.
#[derive(Debug, Error)]
pub enum PushError {
    /// The notification is structurally invalid and was never sent.
    #[error("Notification failed validation: {reason}")]
    Validation { reason: String },

    /// The provider asked us to try again later.
    #[error("Provider requested backoff until {retry_after}: {message}")]
    RetryAfter {
        retry_after: DateTime<Utc>,
        message: String,
    },

    /// The destination identifier is no longer valid.
    #[error("Device subscription expired: {old_id}")]
    SubscriptionExpired {
        old_id: String,
        /// Replacement identifier, when the provider supplied one.
        new_id: Option<String>,
        expired_at: DateTime<Utc>,
    },

    /// The provider credential could not be obtained or was rejected.
    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    /// The send was aborted by an immediate stop or a scale down, or the
    /// notification was still queued when an immediate stop finished.
    #[error("Send was cancelled")]
    Cancelled,

    /// Anything else the connection reported.
    #[error("{0}")]
    Unclassified(#[source] BoxError),
}

impl PushError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    /// Backoff failure resuming `delay` from now.
    ///
    /// The resume instant is always strictly in the future: delays shorter
    /// than one second are rounded up.
    pub fn retry_after(message: impl Into<String>, delay: Duration) -> Self {
        let delay = delay.max(MIN_RETRY_AFTER);
        let delay = chrono::Duration::from_std(delay).unwrap_or(chrono::Duration::MAX);
        let retry_after = Utc::now()
            .checked_add_signed(delay)
            .unwrap_or(DateTime::<Utc>::MAX_UTC);

        Self::RetryAfter {
            retry_after,
            message: message.into(),
        }
    }

    pub fn subscription_expired(old_id: impl Into<String>, new_id: Option<String>) -> Self {
        Self::SubscriptionExpired {
            old_id: old_id.into(),
            new_id,
            expired_at: Utc::now(),
        }
    }

    pub fn unclassified(err: impl Into<BoxError>) -> Self {
        Self::Unclassified(err.into())
    }

    /// Unclassified failure from a plain message.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Unclassified(msg.into().into())
    }

    /// The reporting kind of this failure.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation { .. } => FailureKind::Validation,
            Self::RetryAfter { .. } => FailureKind::RetryAfter,
            Self::SubscriptionExpired { .. } => FailureKind::SubscriptionExpired,
            Self::Credential(_) => FailureKind::Credential,
            Self::Cancelled => FailureKind::Cancelled,
            Self::Unclassified(_) => FailureKind::Unclassified,
        }
    }

    /// When the provider allows the notification to be sent again.
    pub fn retry_after_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::RetryAfter { retry_after, .. } => Some(*retry_after),
            _ => None,
        }
    }

    /// Whether re-enqueueing the same notification later can succeed.
    ///
    /// The engine never retries on its own; this is a hint for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::RetryAfter { .. } | Self::Cancelled => true,
            Self::Credential(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Reporting kind of a [`PushError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    RetryAfter,
    SubscriptionExpired,
    Credential,
    Cancelled,
    Unclassified,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::Validation => write!(f, "validation"),
            FailureKind::RetryAfter => write!(f, "retry_after"),
            FailureKind::SubscriptionExpired => write!(f, "subscription_expired"),
            FailureKind::Credential => write!(f, "credential"),
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// Misuse of the broker control surface.
///
/// These never describe a notification; the broker state is unchanged when
/// one is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BrokerError {
    #[error("Broker has already been signaled to stop")]
    AlreadyStopped,

    #[error("Scale must be greater than zero, got {0}")]
    InvalidScale(usize),

    #[error("Broker has been stopped and its queue is closed")]
    Closed,

    #[error("No tokio runtime available to run workers")]
    NoRuntime,

    #[error("Broker supervisor exited unexpectedly")]
    SupervisorGone,
}

/// A rejected enqueue. The notification is handed back to the caller.
#[derive(Error)]
pub enum EnqueueError<N> {
    #[error("Queue is closed, notification rejected")]
    Closed(N),

    #[error("Queue is full ({capacity} items), notification rejected")]
    Full { notification: N, capacity: usize },
}

impl<N> EnqueueError<N> {
    /// Take back the rejected notification.
    pub fn into_inner(self) -> N {
        match self {
            Self::Closed(n) => n,
            Self::Full { notification, .. } => notification,
        }
    }
}

impl<N> fmt::Debug for EnqueueError<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed(_) => f.write_str("Closed(..)"),
            Self::Full { capacity, .. } => f
                .debug_struct("Full")
                .field("capacity", capacity)
                .finish_non_exhaustive(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_after_is_strictly_in_future() {
        let before = Utc::now();
        let err = PushError::retry_after("slow down", Duration::ZERO);

        let at = err.retry_after_at().unwrap();
        assert!(at > before);
        assert!(err.is_retryable());
        assert_eq!(err.kind(), FailureKind::RetryAfter);
    }

    #[test]
    fn test_retry_after_keeps_longer_delays() {
        let before = Utc::now();
        let err = PushError::retry_after("backoff", Duration::from_secs(120));

        let at = err.retry_after_at().unwrap();
        assert!(at >= before + chrono::Duration::seconds(120));
    }

    #[test]
    fn test_subscription_expired_carries_ids() {
        let err = PushError::subscription_expired("old-token", Some("new-token".to_string()));
        match err {
            PushError::SubscriptionExpired { old_id, new_id, .. } => {
                assert_eq!(old_id, "old-token");
                assert_eq!(new_id.as_deref(), Some("new-token"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_unclassified_preserves_source() {
        let io = std::io::Error::other("connection reset");
        let err = PushError::unclassified(io);

        assert_eq!(err.kind(), FailureKind::Unclassified);
        assert_eq!(err.to_string(), "connection reset");
        assert!(std::error::Error::source(&err).is_some());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_enqueue_error_returns_notification() {
        let err = EnqueueError::Full {
            notification: 7u32,
            capacity: 1,
        };
        assert_eq!(err.to_string(), "Queue is full (1 items), notification rejected");
        assert_eq!(err.into_inner(), 7);
    }

    #[test]
    fn test_failure_kind_display() {
        assert_eq!(FailureKind::SubscriptionExpired.to_string(), "subscription_expired");
        assert_eq!(FailureKind::Cancelled.to_string(), "cancelled");
    }
}
