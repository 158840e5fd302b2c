//! QueuedEventDispatcher: one message per event, fanned out on receipt.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use super::QueueBinding;
use crate::bus::EventBus;
use crate::context::InvocationContext;
use crate::error::DispatchError;
use crate::event::EventDispatcher;
use crate::handler::EventHandler;
use crate::naming::QueueNamingStrategy;
use crate::payload::Payload;
use crate::transport::{Message, QueueTransport};

/// Publishes events to queues and runs their handlers on the consumer side
/// with an internal [`EventDispatcher`].
///
/// A message is deleted only if every local handler succeeded.
pub struct QueuedEventDispatcher<T> {
    binding: QueueBinding<EventDispatcher, T>,
}

impl<T: QueueTransport> QueuedEventDispatcher<T> {
    pub fn new(application_name: impl Into<String>, transport: Arc<T>) -> Self {
        Self {
            binding: QueueBinding::new(EventDispatcher::new(), application_name.into(), transport),
        }
    }

    /// Replace the naming strategy. Call before registering handlers.
    pub fn with_naming_strategy(mut self, naming: impl QueueNamingStrategy + 'static) -> Self {
        self.binding.set_naming(Box::new(naming));
        self
    }

    pub fn register_event_handler<E>(&mut self, handler: EventHandler<E>) -> Result<(), DispatchError>
    where
        E: Payload + Serialize + DeserializeOwned,
    {
        self.binding.register::<E>(
            |events| events.register_event_handler(handler),
            Box::new(
                |events: &EventDispatcher,
                 ctx: &InvocationContext,
                 message: &Message|
                 -> Result<(), DispatchError> {
                    let event: E = message.decode()?;
                    events.dispatch(ctx, event)
                },
            ),
        )
    }

    /// Publish an event to the queue named for its type.
    ///
    /// Events without local handlers are still published; other services
    /// may consume them. A different type registered under the same tag is
    /// rejected.
    pub fn dispatch<E>(&self, ctx: &InvocationContext, event: E) -> Result<(), DispatchError>
    where
        E: Payload + Serialize,
    {
        self.binding.routes::<E>()?;
        self.binding.publish(ctx, &event, None)
    }

    /// Number of local handlers for an event type tag.
    pub fn handler_count(&self, type_name: &str) -> usize {
        self.binding.read(|events| events.handler_count(type_name))
    }

    pub fn queue_name_for(&self, type_name: &str) -> String {
        self.binding.queue_name_for(type_name)
    }

    pub fn subscribed_queues(&self) -> Vec<String> {
        self.binding.subscribed_queues()
    }

    pub fn transport(&self) -> &T {
        &self.binding.transport
    }
}

impl<T: QueueTransport> EventBus for QueuedEventDispatcher<T> {
    fn register_event_handler<E>(&mut self, handler: EventHandler<E>) -> Result<(), DispatchError>
    where
        E: Payload + Serialize + DeserializeOwned,
    {
        QueuedEventDispatcher::register_event_handler(self, handler)
    }

    fn dispatch<E>(&self, ctx: &InvocationContext, event: E) -> Result<(), DispatchError>
    where
        E: Payload + Serialize + DeserializeOwned,
    {
        QueuedEventDispatcher::dispatch(self, ctx, event)
    }
}
