//! EventDispatcher: runs every handler registered for an event, in order.
//!
//! A failing handler never stops the remaining ones. All failures of one
//! dispatch are collected into a single [`AggregateError`].

use std::any::Any;
use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;

use crate::bus::EventBus;
use crate::context::InvocationContext;
use crate::error::{AggregateError, DispatchError, HandlerFailure};
use crate::handler::{contain, EventHandler};
use crate::payload::Payload;

struct EventSlot {
    /// Boxed `Vec<EventHandler<E>>`.
    handlers: Box<dyn Any + Send + Sync>,
    names: Vec<String>,
}

/// Event handler registry.
#[derive(Default)]
pub struct EventDispatcher {
    slots: HashMap<&'static str, EventSlot>,
}

impl EventDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for event type `E`. Handlers run in registration order.
    pub fn register_event_handler<E: Payload>(
        &mut self,
        handler: EventHandler<E>,
    ) -> Result<(), DispatchError> {
        let slot = self.slots.entry(E::TYPE_NAME).or_insert_with(|| EventSlot {
            handlers: Box::new(Vec::<EventHandler<E>>::new()),
            names: Vec::new(),
        });

        let handlers = slot
            .handlers
            .downcast_mut::<Vec<EventHandler<E>>>()
            .ok_or_else(|| shared_tag(E::TYPE_NAME))?;
        slot.names.push(handler.name().to_string());
        handlers.push(handler);
        Ok(())
    }

    /// Dispatch an event to all of its handlers on the caller's thread.
    pub fn dispatch<E: Payload>(&self, ctx: &InvocationContext, event: E) -> Result<(), DispatchError> {
        let slot = self.slots.get(E::TYPE_NAME).ok_or_else(|| {
            DispatchError::lookup(format!("no handler registered for type '{}'", E::TYPE_NAME))
        })?;
        let handlers = slot
            .handlers
            .downcast_ref::<Vec<EventHandler<E>>>()
            .ok_or_else(|| shared_tag(E::TYPE_NAME))?;

        let mut failures = Vec::new();
        for (index, handler) in handlers.iter().enumerate() {
            let ctx = ctx.with_handler(handler.name());
            if let Err(err) = contain(E::TYPE_NAME, || handler.call(&ctx, &event)) {
                error!(
                    handler = %handler.name(),
                    event_type = E::TYPE_NAME,
                    index,
                    error = %err,
                    "event handler failed"
                );
                failures.push(HandlerFailure { index, error: err });
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(AggregateError::new(E::TYPE_NAME, failures).into())
        }
    }

    /// Whether at least one handler is registered for the given type tag.
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.slots.contains_key(type_name)
    }

    pub fn handler_count(&self, type_name: &str) -> usize {
        self.handler_names(type_name).len()
    }

    /// Names of the handlers registered for the given type tag, in order.
    pub fn handler_names(&self, type_name: &str) -> &[String] {
        self.slots
            .get(type_name)
            .map(|slot| slot.names.as_slice())
            .unwrap_or(&[])
    }

    /// List event type tags that have handlers.
    pub fn event_types(&self) -> Vec<&'static str> {
        self.slots.keys().copied().collect()
    }
}

fn shared_tag(type_name: &str) -> DispatchError {
    DispatchError::registration(format!(
        "event type {} is registered for a different payload type",
        type_name
    ))
}

impl EventBus for EventDispatcher {
    fn register_event_handler<E>(&mut self, handler: EventHandler<E>) -> Result<(), DispatchError>
    where
        E: Payload + Serialize + DeserializeOwned,
    {
        EventDispatcher::register_event_handler(self, handler)
    }

    fn dispatch<E>(&self, ctx: &InvocationContext, event: E) -> Result<(), DispatchError>
    where
        E: Payload + Serialize + DeserializeOwned,
    {
        EventDispatcher::dispatch(self, ctx, event)
    }
}
