//! Queue-draining workers.
//!
//! A worker owns one [`Connection`] and loops: wait for queued items, take a
//! batch, start every send of the batch, report each outcome as its send
//! finishes, and only then take the next batch. Failures of any kind are
//! reported per notification and never end the loop.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use futures::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, trace};

use crate::connection::Connection;
use crate::error::PushError;
use crate::notification::Notification;
use crate::outcome::OutcomeSender;
use crate::queue::NotificationQueue;

/// What every worker of one broker shares.
pub(crate) struct WorkerContext<N> {
    pub(crate) queue: Arc<NotificationQueue<N>>,
    pub(crate) outcomes: OutcomeSender<N>,
    pub(crate) max_batch_size: usize,
}

impl<N> Clone for WorkerContext<N> {
    fn clone(&self) -> Self {
        Self {
            queue: self.queue.clone(),
            outcomes: self.outcomes.clone(),
            max_batch_size: self.max_batch_size,
        }
    }
}

/// A running worker: its cancellation signal and background task.
pub(crate) struct WorkerHandle {
    id: usize,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn spawn<N: Notification>(
        id: usize,
        connection: Box<dyn Connection<N>>,
        ctx: WorkerContext<N>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(id, connection, ctx, cancel.clone()));
        Self { id, cancel, task }
    }

    pub(crate) fn id(&self) -> usize {
        self.id
    }

    /// Stop taking new batches and signal in-flight sends to abort.
    pub(crate) fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the worker to exit. Every send it dispatched has reported
    /// an outcome once this returns.
    pub(crate) async fn join(self) {
        if let Err(e) = self.task.await {
            error!(worker_id = self.id, "Worker task failed: {}", e);
        }
    }
}

async fn run<N: Notification>(
    id: usize,
    connection: Box<dyn Connection<N>>,
    ctx: WorkerContext<N>,
    cancel: CancellationToken,
) {
    debug!(worker_id = id, "Worker started");

    let mut batches = 0u64;
    while let Some(batch) = ctx.queue.next_batch(ctx.max_batch_size, &cancel).await {
        batches += 1;
        dispatch_batch(id, connection.as_ref(), batch, &ctx.outcomes, &cancel).await;
    }

    debug!(
        worker_id = id,
        batches,
        cancelled = cancel.is_cancelled(),
        "Worker exited"
    );
}

async fn dispatch_batch<N: Notification>(
    id: usize,
    connection: &dyn Connection<N>,
    batch: Vec<N>,
    outcomes: &OutcomeSender<N>,
    cancel: &CancellationToken,
) {
    trace!(worker_id = id, size = batch.len(), "Dispatching batch");

    let mut in_flight = FuturesUnordered::new();
    for notification in batch {
        if let Err(e) = check_valid(&notification) {
            outcomes.failed(notification, e);
            continue;
        }
        in_flight.push(send_one(connection, notification, cancel));
    }

    while let Some((notification, result)) = in_flight.next().await {
        match result {
            Ok(()) => outcomes.succeeded(notification),
            Err(e) => {
                debug!(worker_id = id, kind = %e.kind(), error = %e, "Send failed");
                outcomes.failed(notification, e);
            }
        }
    }
}

/// `is_valid` is caller code; a panic in it fails only that notification.
fn check_valid<N: Notification>(notification: &N) -> Result<(), PushError> {
    match std::panic::catch_unwind(AssertUnwindSafe(|| notification.is_valid())) {
        Ok(true) => Ok(()),
        Ok(false) => Err(PushError::validation("notification is not valid to send")),
        Err(panic) => Err(PushError::validation(format!(
            "validity check panicked: {}",
            panic_message(panic.as_ref())
        ))),
    }
}

async fn send_one<N: Notification>(
    connection: &dyn Connection<N>,
    mut notification: N,
    cancel: &CancellationToken,
) -> (N, Result<(), PushError>) {
    let result = AssertUnwindSafe(connection.send(&mut notification, cancel))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| {
            Err(PushError::other(format!(
                "connection panicked: {}",
                panic_message(panic.as_ref())
            )))
        });
    (notification, result)
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}
