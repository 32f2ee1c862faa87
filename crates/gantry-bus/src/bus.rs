use tokio::sync::broadcast;
use tracing::warn;

use crate::event::Event;

/// Per-subscriber buffer depth. A slow subscriber that falls this far
/// behind drops the oldest events; its next recv() returns
/// `RecvError::Lagged` and it should treat that as "resync from the
/// store", not a fatal error.
pub const DEFAULT_CAPACITY: usize = 64;

/// Process-wide broadcast bus. Cloning a `Bus` shares the same
/// underlying channel; each `subscribe()` call opens an independent
/// lagging-tolerant receiver.
#[derive(Clone)]
pub struct Bus {
    sender: broadcast::Sender<Event>,
}

impl Bus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event. Returns the number of active subscribers that
    /// received it; publishing with zero subscribers is not an error.
    pub fn publish(&self, event: Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscribe(&self) -> Subscription {
        Subscription {
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for Bus {
    fn default() -> Self {
        Self::new()
    }
}

/// A single subscriber's view of the bus.
pub struct Subscription {
    receiver: broadcast::Receiver<Event>,
}

impl Subscription {
    /// Await the next event. A gap in delivery surfaces as a single
    /// `Event::Lag` rather than the raw `RecvError`, so the channel's
    /// item type stays `Event` end to end.
    pub async fn recv(&mut self) -> Option<Event> {
        match self.receiver.recv().await {
            Ok(event) => Some(event),
            Err(broadcast::error::RecvError::Lagged(n)) => {
                warn!(skipped = n, "bus subscriber lagged, resyncing");
                Some(Event::Lag { skipped: n })
            }
            Err(broadcast::error::RecvError::Closed) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use gantry_types::Status;
    use uuid::Uuid;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = Bus::new();
        let mut sub = bus.subscribe();

        let job_id = Uuid::new_v4();
        bus.publish(Event::LogAppend {
            job_id,
            line: "hello".into(),
        });

        match sub.recv().await {
            Some(Event::LogAppend { job_id: id, line }) => {
                assert_eq!(id, job_id);
                assert_eq!(line, "hello");
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_does_not_error() {
        let bus = Bus::new();
        let delivered = bus.publish(Event::LogClose {
            job_id: Uuid::new_v4(),
            status: Status::Success,
        });
        assert_eq!(delivered, 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_gets_a_single_lag_event() {
        let bus = Bus::with_capacity(2);
        let mut sub = bus.subscribe();

        for i in 0..5 {
            bus.publish(Event::LogAppend {
                job_id: Uuid::new_v4(),
                line: format!("line-{i}"),
            });
        }

        match sub.recv().await {
            Some(Event::Lag { skipped }) => assert!(skipped > 0),
            other => panic!("expected a Lag event, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn two_subscribers_each_get_their_own_copy() {
        let bus = Bus::new();
        let mut sub_a = bus.subscribe();
        let mut sub_b = bus.subscribe();

        bus.publish(Event::RepoUpdate {
            repo_id: Uuid::new_v4(),
        });

        assert!(sub_a.recv().await.is_some());
        assert!(sub_b.recv().await.is_some());
    }
}
