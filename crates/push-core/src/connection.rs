//! Provider-facing collaborator traits.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::PushError;
use crate::notification::Notification;

/// Sends notifications to one provider.
///
/// Each worker owns its own connection; nothing else touches it. A worker may
/// still run several sends of one batch concurrently, hence `&self`.
/// Implementations should abort promptly once `cancel` fires, and bound their
/// own I/O since the engine applies no per-send timeout.
#[async_trait]
pub trait Connection<N: Notification>: Send + Sync {
    /// Deliver one notification, classifying any failure as a [`PushError`].
    async fn send(&self, notification: &mut N, cancel: &CancellationToken)
    -> Result<(), PushError>;
}

/// Creates a fresh [`Connection`] for every new worker.
pub trait ConnectionFactory<N: Notification>: Send + Sync + 'static {
    fn create(&self) -> Box<dyn Connection<N>>;
}

impl<N, F> ConnectionFactory<N> for F
where
    N: Notification,
    F: Fn() -> Box<dyn Connection<N>> + Send + Sync + 'static,
{
    fn create(&self) -> Box<dyn Connection<N>> {
        self()
    }
}
