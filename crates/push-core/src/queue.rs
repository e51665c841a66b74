//! In-memory notification queue shared by every worker of a broker.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;

use crate::error::EnqueueError;

struct QueueState<N> {
    items: VecDeque<N>,
    /// Set once; afterwards the item set only shrinks.
    draining: bool,
}

/// FIFO with an open and a draining state.
///
/// Open: `push` appends and consumers wait when empty. Draining: `push`
/// rejects, consumers keep taking items and see `None` once it is empty.
pub(crate) struct NotificationQueue<N> {
    state: Mutex<QueueState<N>>,
    available: Notify,
    capacity: Option<usize>,
}

impl<N> NotificationQueue<N> {
    pub(crate) fn new(capacity: Option<usize>) -> Self {
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::new(),
                draining: false,
            }),
            available: Notify::new(),
            capacity,
        }
    }

    pub(crate) fn push(&self, notification: N) -> Result<(), EnqueueError<N>> {
        {
            let mut state = self.state.lock();
            if state.draining {
                return Err(EnqueueError::Closed(notification));
            }
            if let Some(capacity) = self.capacity
                && state.items.len() >= capacity
            {
                return Err(EnqueueError::Full {
                    notification,
                    capacity,
                });
            }
            state.items.push_back(notification);
        }
        self.available.notify_one();
        Ok(())
    }

    /// Switch to draining. Returns `false` if it already was.
    pub(crate) fn close(&self) -> bool {
        let was_open = {
            let mut state = self.state.lock();
            !std::mem::replace(&mut state.draining, true)
        };
        // Wake every idle consumer so it can observe the new state.
        self.available.notify_waiters();
        was_open
    }

    /// Wait for up to `max` items.
    ///
    /// Returns `None` when the queue is draining and empty, or when `cancel`
    /// fires. A cancelled consumer never takes items.
    pub(crate) async fn next_batch(&self, max: usize, cancel: &CancellationToken) -> Option<Vec<N>> {
        let max = max.max(1);
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register before checking so a push or close in between is not missed.
            notified.as_mut().enable();

            if cancel.is_cancelled() {
                self.pass_on();
                return None;
            }

            {
                let mut state = self.state.lock();
                if !state.items.is_empty() {
                    let take = max.min(state.items.len());
                    let batch: Vec<N> = state.items.drain(..take).collect();
                    let more = !state.items.is_empty();
                    drop(state);
                    if more {
                        self.available.notify_one();
                    }
                    return Some(batch);
                }
                if state.draining {
                    return None;
                }
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = cancel.cancelled() => {
                    self.pass_on();
                    return None;
                }
            }
        }
    }

    /// Hand a possibly consumed wakeup to the next consumer.
    fn pass_on(&self) {
        if !self.state.lock().items.is_empty() {
            self.available.notify_one();
        }
    }

    /// Remove everything still queued.
    pub(crate) fn drain_remaining(&self) -> Vec<N> {
        self.state.lock().items.drain(..).collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub(crate) fn is_draining(&self) -> bool {
        self.state.lock().draining
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_batches_respect_max_and_order() {
        let queue = NotificationQueue::new(None);
        for i in 0..5 {
            queue.push(i).unwrap();
        }
        let cancel = CancellationToken::new();

        assert_eq!(queue.next_batch(3, &cancel).await, Some(vec![0, 1, 2]));
        assert_eq!(queue.next_batch(3, &cancel).await, Some(vec![3, 4]));
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_and_drains() {
        let queue = NotificationQueue::new(None);
        queue.push(1).unwrap();
        assert!(queue.close());
        assert!(!queue.close());
        assert!(queue.is_draining());

        let err = queue.push(2).unwrap_err();
        assert!(matches!(err, EnqueueError::Closed(2)));

        let cancel = CancellationToken::new();
        assert_eq!(queue.next_batch(10, &cancel).await, Some(vec![1]));
        assert_eq!(queue.next_batch(10, &cancel).await, None);
    }

    #[test]
    fn test_capacity_rejects_when_full() {
        let queue = NotificationQueue::new(Some(2));
        queue.push("a").unwrap();
        queue.push("b").unwrap();

        match queue.push("c") {
            Err(EnqueueError::Full {
                notification,
                capacity,
            }) => {
                assert_eq!(notification, "c");
                assert_eq!(capacity, 2);
            }
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(queue.len(), 2);
    }

    #[tokio::test]
    async fn test_waiting_consumer_woken_by_push() {
        let queue = Arc::new(NotificationQueue::new(None));
        let cancel = CancellationToken::new();

        let consumer = {
            let queue = queue.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { queue.next_batch(10, &cancel).await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.push(42).unwrap();

        assert_eq!(consumer.await.unwrap(), Some(vec![42]));
    }

    #[tokio::test]
    async fn test_close_wakes_every_idle_consumer() {
        let queue = Arc::new(NotificationQueue::<u32>::new(None));
        let cancel = CancellationToken::new();

        let consumers: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                let cancel = cancel.clone();
                tokio::spawn(async move { queue.next_batch(10, &cancel).await })
            })
            .collect();

        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.close();

        for consumer in consumers {
            assert_eq!(consumer.await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_cancelled_consumer_takes_nothing() {
        let queue = NotificationQueue::new(None);
        queue.push(1).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        assert_eq!(queue.next_batch(10, &cancel).await, None);
        assert_eq!(queue.drain_remaining(), vec![1]);
    }
}
