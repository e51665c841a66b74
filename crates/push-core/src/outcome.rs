//! Per-notification outcomes and their delivery to the caller.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::debug;

use crate::error::{FailureKind, PushError};
use crate::notification::{Notification, Tag};

/// Final result for one notification. Exactly one is produced per
/// notification accepted by the broker.
#[derive(Debug)]
pub enum Outcome<N> {
    Succeeded(N),
    Failed(N, PushError),
}

impl<N> Outcome<N> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }

    pub fn notification(&self) -> &N {
        match self {
            Self::Succeeded(n) | Self::Failed(n, _) => n,
        }
    }

    pub fn error(&self) -> Option<&PushError> {
        match self {
            Self::Succeeded(_) => None,
            Self::Failed(_, e) => Some(e),
        }
    }

    pub fn into_notification(self) -> N {
        match self {
            Self::Succeeded(n) | Self::Failed(n, _) => n,
        }
    }
}

/// Sending half held by the broker and its workers.
pub(crate) struct OutcomeSender<N> {
    tx: mpsc::UnboundedSender<Outcome<N>>,
}

impl<N> Clone for OutcomeSender<N> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

impl<N> OutcomeSender<N> {
    pub(crate) fn succeeded(&self, notification: N) {
        self.report(Outcome::Succeeded(notification));
    }

    pub(crate) fn failed(&self, notification: N, error: PushError) {
        self.report(Outcome::Failed(notification, error));
    }

    fn report(&self, outcome: Outcome<N>) {
        if self.tx.send(outcome).is_err() {
            debug!("Outcome receiver dropped, discarding outcome");
        }
    }
}

/// Receiving half returned by [`Broker::new`](crate::Broker::new).
pub struct OutcomeReceiver<N> {
    rx: mpsc::UnboundedReceiver<Outcome<N>>,
}

pub(crate) fn channel<N>() -> (OutcomeSender<N>, OutcomeReceiver<N>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (OutcomeSender { tx }, OutcomeReceiver { rx })
}

impl<N> OutcomeReceiver<N> {
    /// Wait for the next outcome. `None` once the broker is dropped and
    /// every outcome has been received.
    pub async fn recv(&mut self) -> Option<Outcome<N>> {
        self.rx.recv().await
    }

    /// Take an outcome if one is ready.
    pub fn try_recv(&mut self) -> Option<Outcome<N>> {
        self.rx.try_recv().ok()
    }

    /// Take every outcome that is ready right now.
    pub fn drain_ready(&mut self) -> Vec<Outcome<N>> {
        let mut outcomes = Vec::new();
        while let Ok(outcome) = self.rx.try_recv() {
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Wait for `n` outcomes, or fewer if the broker goes away first.
    pub async fn collect(&mut self, n: usize) -> Vec<Outcome<N>> {
        let mut outcomes = Vec::with_capacity(n.min(1024));
        while outcomes.len() < n {
            match self.rx.recv().await {
                Some(outcome) => outcomes.push(outcome),
                None => break,
            }
        }
        outcomes
    }
}

/// One failed notification in a [`DeliveryReport`].
#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub kind: FailureKind,
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tag: Option<Tag>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<DateTime<Utc>>,
}

/// Aggregate view over a set of outcomes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DeliveryReport {
    pub succeeded: usize,
    pub failed: usize,
    pub failures_by_kind: BTreeMap<FailureKind, usize>,
    /// Latest backoff instant requested by a provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<DateTime<Utc>>,
    pub failures: Vec<FailureRecord>,
}

impl DeliveryReport {
    pub fn from_outcomes<'a, N, I>(outcomes: I) -> Self
    where
        N: Notification,
        I: IntoIterator<Item = &'a Outcome<N>>,
    {
        let mut report = Self::default();
        for outcome in outcomes {
            report.record(outcome);
        }
        report
    }

    pub fn record<N: Notification>(&mut self, outcome: &Outcome<N>) {
        let (notification, error) = match outcome {
            Outcome::Succeeded(_) => {
                self.succeeded += 1;
                return;
            }
            Outcome::Failed(n, e) => (n, e),
        };

        self.failed += 1;
        *self.failures_by_kind.entry(error.kind()).or_default() += 1;

        let retry_after = error.retry_after_at();
        if let Some(at) = retry_after {
            self.retry_after = Some(self.retry_after.map_or(at, |cur| cur.max(at)));
        }

        self.failures.push(FailureRecord {
            kind: error.kind(),
            error: error.to_string(),
            tag: notification.tag().cloned(),
            retry_after,
        });
    }

    pub fn total(&self) -> usize {
        self.succeeded + self.failed
    }

    pub fn all_succeeded(&self) -> bool {
        self.failed == 0
    }
}
