use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::{Mutex, Notify, Semaphore};
use tracing::warn;
use uuid::Uuid;

/// Queue capacity: `publish` blocks once this many items are pending.
pub const DEFAULT_CAPACITY: usize = 999;

/// Redelivery deadline for items pulled via `pull_ack` but never acked.
pub const DEFAULT_ACK_DEADLINE: Duration = Duration::from_secs(30 * 60);

/// Which set `Queue::remove` found (and excised) the item in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removed {
    NotFound,
    Pending,
    Inflight,
}

struct State<T> {
    pending: VecDeque<(Uuid, T)>,
    pending_ids: HashSet<Uuid>,
    inflight: std::collections::HashMap<Uuid, (T, Instant)>,
}

/// In-memory FIFO work queue: a bounded pending list, a pull that
/// blocks until work is available, and optional ack-tracked redelivery
/// for consumers that can crash mid-job.
pub struct Queue<T> {
    state: Mutex<State<T>>,
    notify: Notify,
    semaphore: Semaphore,
    ack_deadline: Duration,
}

impl<T: Clone + Send + 'static> Queue<T> {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY, DEFAULT_ACK_DEADLINE)
    }

    pub fn with_capacity(capacity: usize, ack_deadline: Duration) -> Self {
        Self {
            state: Mutex::new(State {
                pending: VecDeque::new(),
                pending_ids: HashSet::new(),
                inflight: std::collections::HashMap::new(),
            }),
            notify: Notify::new(),
            semaphore: Semaphore::new(capacity),
            ack_deadline,
        }
    }

    /// Insert work at the tail of the queue, waiting for space if the
    /// queue is full.
    pub async fn publish(&self, id: Uuid, item: T) {
        let permit = self
            .semaphore
            .acquire()
            .await
            .expect("queue semaphore is never closed");
        permit.forget();

        let mut state = self.state.lock().await;
        state.pending_ids.insert(id);
        state.pending.push_back((id, item));
        drop(state);
        self.notify.notify_one();
    }

    /// Retrieve and remove the head of the queue, waiting until work
    /// becomes available. Does not track the item for redelivery.
    pub async fn pull(&self) -> (Uuid, T) {
        loop {
            {
                let mut state = self.state.lock().await;
                if let Some((id, item)) = state.pending.pop_front() {
                    state.pending_ids.remove(&id);
                    self.semaphore.add_permits(1);
                    return (id, item);
                }
            }
            self.notify.notified().await;
        }
    }

    /// Like `pull`, but tracks the item so it is redelivered if not
    /// acknowledged within the ack deadline.
    pub async fn pull_ack(&self) -> (Uuid, T) {
        let (id, item) = self.pull().await;
        let mut state = self.state.lock().await;
        state.inflight.insert(id, (item.clone(), Instant::now()));
        (id, item)
    }

    /// Acknowledge that a `pull_ack`ed item was processed.
    pub async fn ack(&self, id: Uuid) {
        let mut state = self.state.lock().await;
        state.inflight.remove(&id);
    }

    /// Remove an item from both the pending and inflight sets, if
    /// present in either. Used by cancellation: a pending item is
    /// excised before ever being pulled; an inflight item is dropped
    /// without waiting for its ack deadline. The caller needs to know
    /// which happened: a pending item never reached a runner, so
    /// nothing else will ever set its terminal status.
    pub async fn remove(&self, id: Uuid) -> Removed {
        let mut state = self.state.lock().await;
        let was_pending = state.pending_ids.remove(&id);
        if was_pending {
            state.pending.retain(|(item_id, _)| *item_id != id);
            self.semaphore.add_permits(1);
        }
        let was_inflight = state.inflight.remove(&id).is_some();
        if was_pending {
            Removed::Pending
        } else if was_inflight {
            Removed::Inflight
        } else {
            Removed::NotFound
        }
    }

    /// Snapshot of pending (not yet pulled) work ids, in queue order.
    pub async fn items(&self) -> Vec<Uuid> {
        let state = self.state.lock().await;
        state.pending.iter().map(|(id, _)| *id).collect()
    }

    /// Scan inflight items past the ack deadline and push them back
    /// onto the pending queue for redelivery. Call periodically from a
    /// background task.
    pub async fn sweep_expired(&self) {
        let expired: Vec<(Uuid, T)> = {
            let mut state = self.state.lock().await;
            let now = Instant::now();
            let expired_ids: Vec<Uuid> = state
                .inflight
                .iter()
                .filter(|(_, (_, started))| now.duration_since(*started) >= self.ack_deadline)
                .map(|(id, _)| *id)
                .collect();
            expired_ids
                .into_iter()
                .filter_map(|id| state.inflight.remove(&id).map(|(item, _)| (id, item)))
                .collect()
        };

        for (id, item) in expired {
            warn!(work_id = %id, "redelivering unacknowledged work past deadline");
            self.publish(id, item).await;
        }
    }
}

impl<T: Clone + Send + 'static> Default for Queue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn publish_then_pull_is_fifo() {
        let queue: Queue<&str> = Queue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        queue.publish(a, "first").await;
        queue.publish(b, "second").await;

        let (id1, item1) = queue.pull().await;
        let (id2, item2) = queue.pull().await;
        assert_eq!((id1, item1), (a, "first"));
        assert_eq!((id2, item2), (b, "second"));
    }

    #[tokio::test]
    async fn pull_blocks_until_work_is_published() {
        let queue = Arc::new(Queue::<&str>::new());
        let queue2 = queue.clone();
        let id = Uuid::new_v4();

        let puller = tokio::spawn(async move { queue2.pull().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.publish(id, "late").await;

        let (got_id, item) = puller.await.unwrap();
        assert_eq!(got_id, id);
        assert_eq!(item, "late");
    }

    #[tokio::test]
    async fn remove_drops_pending_item_without_disturbing_others() {
        let queue: Queue<&str> = Queue::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let c = Uuid::new_v4();
        queue.publish(a, "a").await;
        queue.publish(b, "b").await;
        queue.publish(c, "c").await;

        assert_eq!(queue.remove(b).await, Removed::Pending);
        assert_eq!(queue.remove(b).await, Removed::NotFound);

        let items = queue.items().await;
        assert_eq!(items, vec![a, c]);
    }

    #[tokio::test]
    async fn ack_clears_inflight_before_sweep() {
        let queue: Queue<&str> = Queue::with_capacity(10, Duration::from_millis(10));
        let id = Uuid::new_v4();
        queue.publish(id, "job").await;
        let (pulled_id, _) = queue.pull_ack().await;
        queue.ack(pulled_id).await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.sweep_expired().await;

        assert!(queue.items().await.is_empty());
    }

    #[tokio::test]
    async fn unacked_item_is_redelivered_after_deadline() {
        let queue: Queue<&str> = Queue::with_capacity(10, Duration::from_millis(10));
        let id = Uuid::new_v4();
        queue.publish(id, "job").await;
        let _ = queue.pull_ack().await;

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue.sweep_expired().await;

        let items = queue.items().await;
        assert_eq!(items, vec![id]);
    }
}
