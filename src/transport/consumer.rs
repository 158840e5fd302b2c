//! Background consumer thread for a single queue.
//!
//! Messages are handled one at a time, in receive order. A handled message is
//! deleted; a failed one is left alone and comes back after its visibility
//! timeout. A panicking handler counts as a failure and does not stop the
//! thread.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{error, info};

use super::{Message, MessageHandler};
use crate::context::InvocationContext;
use crate::error::{DispatchError, HandlerError, TransportError};
use crate::handler::panic_message;

/// A message handed out by a receive, with the receipt needed to delete it.
#[derive(Debug, Clone)]
pub struct Delivery {
    pub message: Message,
    pub receipt: String,
    /// How many times this message has been received, this delivery included.
    pub receive_count: u32,
}

/// Receive side of a transport, as seen by a consumer loop.
pub trait Receiver: Send + 'static {
    /// Long-poll for the next visible message. `Err(TransportError::Closed)`
    /// ends the consumer.
    fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>, TransportError>;

    /// Acknowledge a delivery.
    fn delete(&self, queue: &str, receipt: &str) -> Result<(), TransportError>;
}

/// Statistics from a consumer thread.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConsumerStats {
    /// Number of receive calls made.
    pub polls: usize,
    /// Number of messages handled and deleted.
    pub handled: usize,
    /// Number of messages whose handler failed.
    pub failed: usize,
}

pub(crate) struct ConsumerThread {
    queue: String,
    stats: Arc<Mutex<ConsumerStats>>,
    handle: Option<JoinHandle<()>>,
}

impl ConsumerThread {
    /// Spawn a consumer for `queue`. The thread runs until the receiver
    /// reports the transport closed.
    pub(crate) fn spawn<R: Receiver>(
        receiver: R,
        queue: &str,
        wait: Duration,
        handler: MessageHandler,
    ) -> Result<Self, TransportError> {
        let stats = Arc::new(Mutex::new(ConsumerStats::default()));
        let thread_stats = Arc::clone(&stats);
        let thread_queue = queue.to_string();

        let handle = thread::Builder::new()
            .name(format!("consumer-{}", queue))
            .spawn(move || consume(receiver, &thread_queue, wait, handler, &thread_stats))
            .map_err(|err| TransportError::Subscribe {
                queue: queue.to_string(),
                reason: err.to_string(),
            })?;

        info!(queue, "consumer started");
        Ok(Self {
            queue: queue.to_string(),
            stats,
            handle: Some(handle),
        })
    }

    pub(crate) fn queue(&self) -> &str {
        &self.queue
    }

    pub(crate) fn stats(&self) -> ConsumerStats {
        self.stats.lock().clone()
    }

    /// Wait for the thread to exit. The transport must already be closed.
    pub(crate) fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!(queue = %self.queue, "consumer thread panicked");
            }
        }
    }
}

fn consume<R: Receiver>(
    receiver: R,
    queue: &str,
    wait: Duration,
    handler: MessageHandler,
    stats: &Mutex<ConsumerStats>,
) {
    loop {
        stats.lock().polls += 1;

        let delivery = match receiver.receive(queue, wait) {
            Ok(Some(delivery)) => delivery,
            Ok(None) => continue,
            Err(TransportError::Closed) => break,
            Err(err) => {
                error!(queue, error = %err, "receive failed");
                continue;
            }
        };

        match handle(&handler, &delivery.message) {
            Ok(()) => {
                stats.lock().handled += 1;
                if let Err(err) = receiver.delete(queue, &delivery.receipt) {
                    error!(queue, message_id = %delivery.message.id, error = %err, "delete failed");
                }
            }
            Err(err) => {
                stats.lock().failed += 1;
                error!(
                    queue,
                    message_id = %delivery.message.id,
                    receive_count = delivery.receive_count,
                    error = %err,
                    "message handling failed, leaving it for redelivery"
                );
            }
        }
    }

    info!(queue, "consumer stopped");
}

fn handle(handler: &MessageHandler, message: &Message) -> Result<(), DispatchError> {
    let ctx = InvocationContext::from_message(message);
    panic::catch_unwind(AssertUnwindSafe(|| handler(&ctx, message))).unwrap_or_else(|panic| {
        Err(DispatchError::from(HandlerError::Panicked {
            payload_type: message.type_info().unwrap_or("unknown").to_string(),
            message: panic_message(panic.as_ref()),
        }))
    })
}
