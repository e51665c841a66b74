//! The public control surface of the dispatch engine.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

use crate::config::BrokerConfig;
use crate::connection::ConnectionFactory;
use crate::error::{BrokerError, EnqueueError};
use crate::notification::Notification;
use crate::outcome::{self, OutcomeReceiver, OutcomeSender};
use crate::queue::NotificationQueue;
use crate::supervisor::{ShutdownReport, Supervisor, SupervisorHandle};
use crate::worker::WorkerContext;

enum Lifecycle {
    /// Created, never started.
    Idle,
    Running(SupervisorHandle),
    /// Stop has begun or finished; the queue is closed for good.
    Stopped,
}

impl Lifecycle {
    fn name(&self) -> &'static str {
        match self {
            Lifecycle::Idle => "idle",
            Lifecycle::Running(_) => "running",
            Lifecycle::Stopped => "stopped",
        }
    }
}

/// Owns the notification queue and a resizable pool of workers.
///
/// Every notification accepted by [`enqueue`](Self::enqueue) produces exactly
/// one [`Outcome`](crate::Outcome) on the receiver returned by
/// [`new`](Self::new), provided the broker is eventually stopped.
///
/// The broker keeps a sender of the outcome channel, so the receiver only
/// reports the end of the stream once the broker is dropped.
pub struct Broker<N: Notification> {
    queue: Arc<NotificationQueue<N>>,
    factory: Arc<dyn ConnectionFactory<N>>,
    outcomes: OutcomeSender<N>,
    max_batch_size: usize,
    /// Desired worker count.
    scale: Arc<AtomicUsize>,
    /// Workers currently owned by the supervisor.
    live: Arc<AtomicUsize>,
    lifecycle: Mutex<Lifecycle>,
}

impl<N: Notification> Broker<N> {
    /// Create a broker with the default configuration.
    pub fn new(factory: impl ConnectionFactory<N>) -> (Self, OutcomeReceiver<N>) {
        Self::with_config(factory, BrokerConfig::default())
    }

    /// Create a broker with a custom configuration.
    pub fn with_config(
        factory: impl ConnectionFactory<N>,
        config: BrokerConfig,
    ) -> (Self, OutcomeReceiver<N>) {
        if let Err(e) = config.validate() {
            warn!(error = %e, "Invalid broker config, clamping to usable values");
        }

        let (outcomes, receiver) = outcome::channel();
        let broker = Self {
            queue: Arc::new(NotificationQueue::new(
                config.max_queue_size.filter(|&capacity| capacity > 0),
            )),
            factory: Arc::new(factory),
            outcomes,
            max_batch_size: config.max_batch_size.max(1),
            scale: Arc::new(AtomicUsize::new(config.scale.max(1))),
            live: Arc::new(AtomicUsize::new(0)),
            lifecycle: Mutex::new(Lifecycle::Idle),
        };
        (broker, receiver)
    }

    /// Add a notification to the tail of the queue.
    ///
    /// Notifications may be enqueued before `start`. Rejected once `stop`
    /// has been called, or when the queue is at capacity.
    pub fn enqueue(&self, notification: N) -> Result<(), EnqueueError<N>> {
        self.queue.push(notification)
    }

    /// Bring the worker pool up to the configured scale.
    ///
    /// A no-op while running. A stopped broker cannot be restarted.
    pub async fn start(&self) -> Result<(), BrokerError> {
        let ready = {
            let mut lifecycle = self.lifecycle.lock();
            match &*lifecycle {
                Lifecycle::Running(_) => return Ok(()),
                Lifecycle::Stopped => return Err(BrokerError::Closed),
                Lifecycle::Idle => {}
            }

            Handle::try_current().map_err(|_| BrokerError::NoRuntime)?;

            let ctx = WorkerContext {
                queue: self.queue.clone(),
                outcomes: self.outcomes.clone(),
                max_batch_size: self.max_batch_size,
            };
            let supervisor =
                Supervisor::new(self.factory.clone(), ctx, self.scale.clone(), self.live.clone());
            let (handle, ready) = supervisor.spawn();
            *lifecycle = Lifecycle::Running(handle);
            ready
        };

        let live = ready.await.map_err(|_| BrokerError::SupervisorGone)?;
        info!(workers = live, queued = self.queue.len(), "Broker started");
        Ok(())
    }

    /// Stop the broker, blocking until every worker has exited.
    ///
    /// The queue stops accepting notifications immediately. A graceful stop
    /// lets workers drain it; an immediate stop cancels them, waits for
    /// sends already dispatched, and reports the rest as cancelled.
    pub async fn stop(&self, immediate: bool) -> Result<ShutdownReport, BrokerError> {
        let handle = {
            let mut lifecycle = self.lifecycle.lock();
            match std::mem::replace(&mut *lifecycle, Lifecycle::Stopped) {
                Lifecycle::Running(handle) => {
                    self.queue.close();
                    handle
                }
                previous => {
                    debug!(state = previous.name(), "Ignoring stop request");
                    *lifecycle = previous;
                    return Err(BrokerError::AlreadyStopped);
                }
            }
        };

        info!(immediate, queued = self.queue.len(), "Stopping broker");
        let report = handle.shutdown(immediate).await?;
        info!(
            workers = report.workers_stopped,
            abandoned = report.abandoned,
            "Broker stopped"
        );
        Ok(report)
    }

    /// Set the desired number of workers.
    ///
    /// While running, returns once the pool has converged; workers removed
    /// (oldest first) have finished their in-flight batch by then. Otherwise
    /// the size is recorded for the next `start`.
    pub async fn change_scale(&self, size: usize) -> Result<(), BrokerError> {
        if size == 0 {
            return Err(BrokerError::InvalidScale(size));
        }
        self.scale.store(size, Ordering::SeqCst);

        let client = match &*self.lifecycle.lock() {
            Lifecycle::Running(handle) => handle.client(),
            other => {
                debug!(scale = size, state = other.name(), "Recorded scale for next start");
                return Ok(());
            }
        };

        match client.rescale().await {
            Ok(live) => {
                debug!(scale = size, live, "Scale changed");
                Ok(())
            }
            // Lost a race with stop; there are no workers to resize.
            Err(_) if !self.is_running() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Desired number of workers.
    pub fn scale(&self) -> usize {
        self.scale.load(Ordering::SeqCst)
    }

    /// Number of workers currently running.
    pub fn live_workers(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Notifications waiting for a worker.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// Whether the queue has stopped accepting notifications.
    pub fn is_draining(&self) -> bool {
        self.queue.is_draining()
    }

    /// Whether `start` has run and `stop` has not.
    pub fn is_running(&self) -> bool {
        matches!(*self.lifecycle.lock(), Lifecycle::Running(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::error::PushError;
    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    struct Ping;

    impl Notification for Ping {
        fn is_valid(&self) -> bool {
            true
        }
    }

    struct Accept;

    #[async_trait]
    impl Connection<Ping> for Accept {
        async fn send(&self, _: &mut Ping, _: &CancellationToken) -> Result<(), PushError> {
            Ok(())
        }
    }

    fn broker() -> (Broker<Ping>, OutcomeReceiver<Ping>) {
        Broker::new(|| Box::new(Accept) as Box<dyn Connection<Ping>>)
    }

    #[test]
    fn test_start_without_runtime() {
        let (broker, _rx) = broker();
        let result = futures::executor::block_on(broker.start());
        assert_eq!(result, Err(BrokerError::NoRuntime));
        assert!(!broker.is_running());
    }

    #[tokio::test]
    async fn test_stop_before_start_is_rejected() {
        let (broker, _rx) = broker();
        assert_eq!(broker.stop(false).await, Err(BrokerError::AlreadyStopped));
        assert!(!broker.is_draining());
        broker.enqueue(Ping).unwrap();
    }

    #[tokio::test]
    async fn test_start_is_idempotent_and_restart_rejected() {
        let (broker, _rx) = broker();
        broker.start().await.unwrap();
        broker.start().await.unwrap();
        assert_eq!(broker.live_workers(), 1);

        broker.stop(false).await.unwrap();
        assert_eq!(broker.live_workers(), 0);
        assert_eq!(broker.start().await, Err(BrokerError::Closed));
    }

    #[tokio::test]
    async fn test_scale_recorded_while_idle() {
        let (broker, _rx) = broker();
        broker.change_scale(3).await.unwrap();
        assert_eq!(broker.scale(), 3);
        assert_eq!(broker.live_workers(), 0);

        broker.start().await.unwrap();
        assert_eq!(broker.live_workers(), 3);
        broker.stop(true).await.unwrap();
    }

    #[tokio::test]
    async fn test_zero_scale_rejected() {
        let (broker, _rx) = broker();
        assert_eq!(broker.change_scale(0).await, Err(BrokerError::InvalidScale(0)));
        assert_eq!(broker.scale(), 1);
    }

    #[tokio::test]
    async fn test_config_is_clamped() {
        let config = BrokerConfig::default()
            .with_scale(0)
            .with_max_batch_size(0)
            .with_max_queue_size(Some(0));
        let (broker, _rx) =
            Broker::with_config(|| Box::new(Accept) as Box<dyn Connection<Ping>>, config);

        assert_eq!(broker.scale(), 1);
        broker.enqueue(Ping).unwrap();
        broker.enqueue(Ping).unwrap();
    }
}
