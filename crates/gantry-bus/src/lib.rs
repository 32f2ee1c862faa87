//! Typed in-process pub/sub bus carrying repo, build, job, and log
//! state-change events from the orchestrator to HTTP/WebSocket
//! subscribers.
//!
//! Built on `tokio::sync::broadcast` rather than a database-polling
//! listener: unlike the engine's task-result queue, bus events have no
//! durability requirement, so a lossy bounded channel with lag-resync
//! is the right shape.

mod bus;
mod event;

pub use bus::{Bus, Subscription, DEFAULT_CAPACITY};
pub use event::Event;
