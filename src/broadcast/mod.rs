//! Broadcast event delivery: every node sees every event, with no queue.
//!
//! A [`BroadcastChannel`] keeps a short history of recent events and supports
//! blocking "list since index" queries, the shape of a cluster-wide user event
//! API. [`BroadcastEventDispatcher`] fires events into the channel and runs a
//! watcher thread per registered handler. Delivery is best effort: a failed
//! handler is logged and the event is not retried.

mod dispatcher;
mod in_memory;

use std::time::Duration;

pub use dispatcher::BroadcastEventDispatcher;
pub use in_memory::InMemoryBroadcast;

use crate::error::TransportError;

/// An event as stored by a broadcast channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BroadcastEvent {
    pub id: String,
    /// Payload type tag.
    pub name: String,
    /// JSON payload.
    pub payload: String,
}

/// A cluster-wide event channel.
pub trait BroadcastChannel: Send + Sync + 'static {
    /// Fire an event to every node. Returns the event id.
    fn fire(&self, name: &str, payload: String) -> Result<String, TransportError>;

    /// Recent events named `name`, oldest first, with the channel's current
    /// index.
    ///
    /// With a non-zero `wait_index` the call blocks until the index moves
    /// past it or `wait` elapses. `Err(TransportError::Closed)` stops
    /// watchers.
    fn list(
        &self,
        name: &str,
        wait_index: u64,
        wait: Duration,
    ) -> Result<(Vec<BroadcastEvent>, u64), TransportError>;

    /// Wake every blocked `list` and refuse further use.
    fn close(&self);
}
