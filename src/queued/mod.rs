//! Queued façades: publish commands and events to a queue and handle them on
//! a background consumer through an internal executor.
//!
//! Publishing is fire-and-forget. Serialization and transport failures are
//! returned to the publisher; handler failures on the consumer side are only
//! logged, and the message is redelivered after its visibility timeout.

mod command;
mod event;

pub use command::QueuedCommandExecutor;
pub use event::QueuedEventDispatcher;

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info};

use crate::context::InvocationContext;
use crate::error::DispatchError;
use crate::naming::{PerTypeQueueNaming, QueueNamingStrategy};
use crate::payload::Payload;
use crate::transport::{Message, MessageHandler, QueueTransport, CORRELATION_ID_ATTRIBUTE};

/// Deserializes a message into its payload type and hands it to the target.
type Decoder<U> =
    Box<dyn Fn(&U, &InvocationContext, &Message) -> Result<(), DispatchError> + Send + Sync>;

/// Decoder for one type tag, with the Rust type registered under it.
struct Route<U> {
    payload: TypeId,
    decode: Decoder<U>,
}

/// Receive-side routing table: payload type tag to decoder.
struct Router<U> {
    target: U,
    routes: HashMap<&'static str, Route<U>>,
}

impl<U> Router<U> {
    fn route(&self, ctx: &InvocationContext, message: &Message) -> Result<(), DispatchError> {
        let Some(type_name) = message.type_info() else {
            debug!(message_id = %message.id, "message without type info, ignoring");
            return Ok(());
        };
        let Some(route) = self.routes.get(type_name) else {
            debug!(message_id = %message.id, type_name, "no handler for message type, ignoring");
            return Ok(());
        };

        let ctx = ctx.clone().as_system_invocation();
        (route.decode)(&self.target, &ctx, message)
    }
}

/// Shared plumbing of the queued façades: the internal executor behind a
/// router, the naming strategy and the set of subscribed queues.
struct QueueBinding<U, T> {
    router: Arc<RwLock<Router<U>>>,
    naming: Box<dyn QueueNamingStrategy>,
    transport: Arc<T>,
    subscribed: HashSet<String>,
}

impl<U, T> QueueBinding<U, T>
where
    U: Send + Sync + 'static,
    T: QueueTransport,
{
    fn new(target: U, application_name: String, transport: Arc<T>) -> Self {
        Self {
            router: Arc::new(RwLock::new(Router {
                target,
                routes: HashMap::new(),
            })),
            naming: Box::new(PerTypeQueueNaming::new(application_name)),
            transport,
            subscribed: HashSet::new(),
        }
    }

    fn set_naming(&mut self, naming: Box<dyn QueueNamingStrategy>) {
        self.naming = naming;
    }

    /// Register with the internal target, then make sure the destination
    /// queue for `P` has exactly one consumer.
    fn register<P: Payload>(
        &mut self,
        register: impl FnOnce(&mut U) -> Result<(), DispatchError>,
        decoder: Decoder<U>,
    ) -> Result<(), DispatchError> {
        {
            let mut router = self.router.write();
            register(&mut router.target)?;
            router.routes.entry(P::TYPE_NAME).or_insert(Route {
                payload: TypeId::of::<P>(),
                decode: decoder,
            });
        }

        let queue = self.naming.queue_name_for(P::TYPE_NAME);
        if self.subscribed.contains(&queue) {
            return Ok(());
        }

        self.transport.subscribe(&queue, self.message_handler())?;
        info!(queue = %queue, type_name = P::TYPE_NAME, "subscribed to queue");
        self.subscribed.insert(queue);
        Ok(())
    }

    /// Whether `P` has a local route. A different type registered under
    /// `P`'s tag is a registration fault, as on the in-memory path.
    fn routes<P: Payload>(&self) -> Result<bool, DispatchError> {
        match self.router.read().routes.get(P::TYPE_NAME) {
            None => Ok(false),
            Some(route) if route.payload == TypeId::of::<P>() => Ok(true),
            Some(_) => Err(DispatchError::registration(format!(
                "type {} is registered for a different payload type",
                P::TYPE_NAME
            ))),
        }
    }

    fn message_handler(&self) -> MessageHandler {
        let router = Arc::clone(&self.router);
        Arc::new(move |ctx: &InvocationContext, message: &Message| {
            router.read().route(ctx, message)
        })
    }

    /// Serialize and send a payload to its destination queue.
    fn publish<P: Payload + Serialize>(
        &self,
        ctx: &InvocationContext,
        payload: &P,
        attribute: Option<(&'static str, String)>,
    ) -> Result<(), DispatchError> {
        let mut message = Message::encode(payload)?;
        if let Some(correlation_id) = ctx.correlation_id() {
            message = message.with_attribute(CORRELATION_ID_ATTRIBUTE, correlation_id);
        }
        if let Some((key, value)) = attribute {
            message = message.with_attribute(key, value);
        }

        let queue = self.naming.queue_name_for(P::TYPE_NAME);
        debug!(
            queue = %queue,
            type_name = P::TYPE_NAME,
            message_id = %message.id,
            "publishing message"
        );
        self.transport.send(&queue, message)?;
        Ok(())
    }

    fn read<X>(&self, f: impl FnOnce(&U) -> X) -> X {
        f(&self.router.read().target)
    }

    fn queue_name_for(&self, type_name: &str) -> String {
        self.naming.queue_name_for(type_name)
    }

    fn subscribed_queues(&self) -> Vec<String> {
        let mut queues: Vec<String> = self.subscribed.iter().cloned().collect();
        queues.sort();
        queues
    }
}
