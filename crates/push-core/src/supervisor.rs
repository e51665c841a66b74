//! Worker supervisor.
//!
//! A single task owns the broker's worker set. The broker never touches the
//! workers directly: it sends control messages and waits for the reply, so
//! every resize and the final shutdown are serialized by the mailbox.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde::Serialize;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::connection::ConnectionFactory;
use crate::error::{BrokerError, PushError};
use crate::notification::Notification;
use crate::worker::{WorkerContext, WorkerHandle};

/// Mailbox capacity of the supervisor.
const MAILBOX_CAPACITY: usize = 16;

/// Messages for the supervisor.
#[derive(Debug)]
pub(crate) enum SupervisorMessage {
    /// Converge the worker set to the desired scale; replies with the live count.
    Rescale { reply: oneshot::Sender<usize> },
    /// Stop every worker and exit.
    Shutdown {
        immediate: bool,
        reply: oneshot::Sender<ShutdownReport>,
    },
}

/// Summary of a completed broker shutdown.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ShutdownReport {
    /// Whether workers were cancelled instead of draining the queue.
    pub immediate: bool,
    /// Workers that were running when the stop began.
    pub workers_stopped: usize,
    /// Queued notifications that were never dispatched and were reported as
    /// cancelled. Always zero for a graceful stop.
    pub abandoned: usize,
}

/// State owned by the supervisor task.
pub(crate) struct Supervisor<N: Notification> {
    factory: Arc<dyn ConnectionFactory<N>>,
    ctx: WorkerContext<N>,
    /// Oldest first; scale-down retires from the front.
    workers: VecDeque<WorkerHandle>,
    next_worker_id: usize,
    desired: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl<N: Notification> Supervisor<N> {
    pub(crate) fn new(
        factory: Arc<dyn ConnectionFactory<N>>,
        ctx: WorkerContext<N>,
        desired: Arc<AtomicUsize>,
        live: Arc<AtomicUsize>,
    ) -> Self {
        Self {
            factory,
            ctx,
            workers: VecDeque::new(),
            next_worker_id: 0,
            desired,
            live,
        }
    }

    /// Spawn the supervisor task. The returned receiver fires once the
    /// initial workers are running.
    pub(crate) fn spawn(self) -> (SupervisorHandle, oneshot::Receiver<usize>) {
        let (tx, rx) = mpsc::channel(MAILBOX_CAPACITY);
        let (ready_tx, ready_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(rx, ready_tx));
        (SupervisorHandle { tx, task }, ready_rx)
    }

    async fn run(
        mut self,
        mut rx: mpsc::Receiver<SupervisorMessage>,
        ready: oneshot::Sender<usize>,
    ) {
        let live = self.rescale().await;
        let _ = ready.send(live);

        while let Some(msg) = rx.recv().await {
            match msg {
                SupervisorMessage::Rescale { reply } => {
                    let live = self.rescale().await;
                    let _ = reply.send(live);
                }
                SupervisorMessage::Shutdown { immediate, reply } => {
                    let report = self.shutdown(immediate).await;
                    let _ = reply.send(report);
                    return;
                }
            }
        }

        // The broker was dropped without being stopped.
        warn!("Broker dropped while running, stopping workers");
        self.shutdown(true).await;
    }

    async fn rescale(&mut self) -> usize {
        let target = self.desired.load(Ordering::SeqCst);
        let current = self.workers.len();

        let mut retired = Vec::new();
        while self.workers.len() > target {
            if let Some(worker) = self.workers.pop_front() {
                worker.cancel();
                retired.push(worker);
            }
        }

        while self.workers.len() < target {
            let id = self.next_worker_id;
            self.next_worker_id += 1;
            let connection = self.factory.create();
            self.workers
                .push_back(WorkerHandle::spawn(id, connection, self.ctx.clone()));
        }

        let live = self.workers.len();
        self.live.store(live, Ordering::SeqCst);
        if live != current {
            info!(from = current, to = live, "Rescaled worker pool");
        }

        // Retired workers finish their dispatched batch before we return.
        for worker in retired {
            let id = worker.id();
            worker.join().await;
            debug!(worker_id = id, "Retired worker joined");
        }

        live
    }

    async fn shutdown(&mut self, immediate: bool) -> ShutdownReport {
        self.ctx.queue.close();

        if immediate {
            for worker in &self.workers {
                worker.cancel();
            }
        }

        let workers_stopped = self.workers.len();
        for worker in self.workers.drain(..) {
            worker.join().await;
        }
        self.live.store(0, Ordering::SeqCst);

        let leftovers = self.ctx.queue.drain_remaining();
        let abandoned = leftovers.len();
        if abandoned > 0 {
            if !immediate {
                error!(abandoned, "Items left in queue after graceful shutdown");
            }
            for notification in leftovers {
                self.ctx.outcomes.failed(notification, PushError::Cancelled);
            }
        }

        ShutdownReport {
            immediate,
            workers_stopped,
            abandoned,
        }
    }
}

/// The broker's side of a running supervisor.
pub(crate) struct SupervisorHandle {
    tx: mpsc::Sender<SupervisorMessage>,
    task: JoinHandle<()>,
}

/// Cloneable sender used outside the broker's lifecycle lock.
#[derive(Clone)]
pub(crate) struct SupervisorClient {
    tx: mpsc::Sender<SupervisorMessage>,
}

impl SupervisorHandle {
    pub(crate) fn client(&self) -> SupervisorClient {
        SupervisorClient {
            tx: self.tx.clone(),
        }
    }

    /// Stop all workers and wait for the supervisor task to exit.
    pub(crate) async fn shutdown(self, immediate: bool) -> Result<ShutdownReport, BrokerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SupervisorMessage::Shutdown { immediate, reply })
            .await
            .map_err(|_| BrokerError::SupervisorGone)?;
        let report = rx.await.map_err(|_| BrokerError::SupervisorGone)?;

        if let Err(e) = self.task.await {
            error!("Supervisor task failed: {}", e);
        }
        Ok(report)
    }
}

impl SupervisorClient {
    /// Ask the supervisor to converge to the desired scale.
    pub(crate) async fn rescale(&self) -> Result<usize, BrokerError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(SupervisorMessage::Rescale { reply })
            .await
            .map_err(|_| BrokerError::SupervisorGone)?;
        rx.await.map_err(|_| BrokerError::SupervisorGone)
    }
}
