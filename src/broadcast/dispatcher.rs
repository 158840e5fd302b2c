//! BroadcastEventDispatcher: fire events to every node through a
//! [`BroadcastChannel`].

use std::collections::HashSet;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, error, info};

use super::BroadcastChannel;
use crate::bus::EventBus;
use crate::context::InvocationContext;
use crate::error::{DispatchError, TransportError};
use crate::handler::{contain, EventHandler};
use crate::payload::Payload;

/// Sends events to other nodes without a queue.
///
/// Each registered handler gets its own watcher thread. Events already in
/// the channel's history when a handler registers are skipped. Handler
/// failures are logged and never retried.
pub struct BroadcastEventDispatcher<C> {
    channel: Arc<C>,
    wait_time: Duration,
    watchers: Vec<Watcher>,
}

struct Watcher {
    event_type: &'static str,
    handle: Option<JoinHandle<()>>,
}

impl<C: BroadcastChannel> BroadcastEventDispatcher<C> {
    pub fn new(channel: Arc<C>) -> Self {
        Self {
            channel,
            wait_time: Duration::from_secs(5),
            watchers: Vec::new(),
        }
    }

    /// How long one blocking list call waits for new events.
    pub fn with_wait_time(mut self, wait_time: Duration) -> Self {
        self.wait_time = wait_time;
        self
    }

    pub fn register_event_handler<E>(&mut self, handler: EventHandler<E>) -> Result<(), DispatchError>
    where
        E: Payload + DeserializeOwned,
    {
        let (history, _) = self.channel.list(E::TYPE_NAME, 0, Duration::ZERO)?;
        let seen = history.into_iter().map(|event| event.id).collect();

        let channel = Arc::clone(&self.channel);
        let wait = self.wait_time;
        let handle = thread::Builder::new()
            .name(format!("broadcast-{}", E::TYPE_NAME))
            .spawn(move || watch(&*channel, &handler, seen, wait))
            .map_err(|err| TransportError::Subscribe {
                queue: E::TYPE_NAME.to_string(),
                reason: err.to_string(),
            })?;

        info!(event_type = E::TYPE_NAME, "watching broadcast events");
        self.watchers.push(Watcher {
            event_type: E::TYPE_NAME,
            handle: Some(handle),
        });
        Ok(())
    }

    /// Fire an event. Local handlers see it too, through their watchers.
    pub fn dispatch<E>(&self, _ctx: &InvocationContext, event: E) -> Result<(), DispatchError>
    where
        E: Payload + Serialize,
    {
        let payload = serde_json::to_string(&event)?;
        let id = self.channel.fire(E::TYPE_NAME, payload)?;
        debug!(event_type = E::TYPE_NAME, event_id = %id, "broadcast event fired");
        Ok(())
    }

    /// Number of watchers for an event type tag.
    pub fn handler_count(&self, type_name: &str) -> usize {
        self.watchers
            .iter()
            .filter(|watcher| watcher.event_type == type_name)
            .count()
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    /// Close the channel and wait for this dispatcher's watchers to exit.
    pub fn close(&mut self) {
        self.channel.close();
        for watcher in &mut self.watchers {
            if let Some(handle) = watcher.handle.take() {
                if handle.join().is_err() {
                    error!(event_type = watcher.event_type, "broadcast watcher panicked");
                }
            }
        }
    }
}

impl<C: BroadcastChannel> EventBus for BroadcastEventDispatcher<C> {
    fn register_event_handler<E>(&mut self, handler: EventHandler<E>) -> Result<(), DispatchError>
    where
        E: Payload + Serialize + DeserializeOwned,
    {
        BroadcastEventDispatcher::register_event_handler(self, handler)
    }

    fn dispatch<E>(&self, ctx: &InvocationContext, event: E) -> Result<(), DispatchError>
    where
        E: Payload + Serialize + DeserializeOwned,
    {
        BroadcastEventDispatcher::dispatch(self, ctx, event)
    }
}

fn watch<C, E>(channel: &C, handler: &EventHandler<E>, mut seen: HashSet<String>, wait: Duration)
where
    C: BroadcastChannel,
    E: Payload + DeserializeOwned,
{
    let ctx = InvocationContext::system().with_handler(handler.name());
    let mut last_index = 0;

    loop {
        let (events, index) = match channel.list(E::TYPE_NAME, last_index, wait) {
            Ok(listed) => listed,
            Err(TransportError::Closed) => break,
            Err(err) => {
                error!(event_type = E::TYPE_NAME, error = %err, "listing broadcast events failed");
                break;
            }
        };

        let mut current = HashSet::with_capacity(events.len());
        for event in events {
            current.insert(event.id.clone());
            if seen.contains(&event.id) {
                continue;
            }

            let payload: E = match serde_json::from_str(&event.payload) {
                Ok(payload) => payload,
                Err(err) => {
                    error!(event_type = E::TYPE_NAME, event_id = %event.id, error = %err, "undecodable broadcast event");
                    continue;
                }
            };
            if let Err(err) = contain(E::TYPE_NAME, || handler.call(&ctx, &payload)) {
                error!(
                    handler = handler.name(),
                    event_type = E::TYPE_NAME,
                    error = %err,
                    "broadcast handler failed"
                );
            }
        }
        seen = current;

        // Indexes only move forward; a reset means start over.
        last_index = if index >= last_index {
            index
        } else if index == 0 {
            1
        } else {
            0
        };
    }

    info!(event_type = E::TYPE_NAME, "broadcast watcher stopped");
}
