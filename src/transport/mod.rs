//! Queue transport used by the queued executors.
//!
//! A transport moves [`Message`]s between named queues and runs one consumer
//! per subscribed queue. [`InMemoryQueue`] is the in-process implementation.

mod consumer;
mod in_memory;
mod message;

use std::sync::Arc;
use std::time::Duration;

pub use consumer::{ConsumerStats, Delivery, Receiver};
pub use in_memory::{InMemoryQueue, QueueOptions};
pub use message::{Message, CORRELATION_ID_ATTRIBUTE, ORGANISATION_ID_ATTRIBUTE, TYPE_INFO_ATTRIBUTE};

use crate::context::InvocationContext;
use crate::error::{DispatchError, TransportError};

/// Callback run by a queue consumer for each received message.
///
/// `Ok` deletes the message; an error leaves it on the queue so it is
/// redelivered once its visibility timeout expires.
pub type MessageHandler =
    Arc<dyn Fn(&InvocationContext, &Message) -> Result<(), DispatchError> + Send + Sync>;

/// A queueing backend.
pub trait QueueTransport: Send + Sync + 'static {
    /// Publish a message to a named queue.
    fn send(&self, queue: &str, message: Message) -> Result<(), TransportError>;

    /// Start consuming a queue in the background.
    fn subscribe(&self, queue: &str, handler: MessageHandler) -> Result<(), TransportError>;

    /// Receive and delete a single message, waiting up to `wait`.
    fn receive_one(&self, queue: &str, wait: Duration) -> Result<Option<Message>, TransportError>;

    /// Drop every message currently on the queue.
    fn purge(&self, queue: &str) -> Result<(), TransportError>;

    /// Stop all consumers and wait for in-flight handlers to finish.
    fn close(&self);
}
