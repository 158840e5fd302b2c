//! In-memory queue transport for tests and single-process deployments.
//!
//! Named queues with long-poll receives and a visibility timeout: a received
//! message is hidden until it is deleted by receipt or the timeout expires,
//! after which it is delivered again.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::info;
use uuid::Uuid;

use super::consumer::{ConsumerStats, ConsumerThread, Delivery, Receiver};
use super::{Message, MessageHandler, QueueTransport};
use crate::error::TransportError;

/// Receive behaviour of an [`InMemoryQueue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// How long a received message stays hidden before redelivery.
    pub visibility_timeout: Duration,
    /// How long a consumer waits for a message per poll.
    pub wait_time: Duration,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(1800),
            wait_time: Duration::from_secs(5),
        }
    }
}

struct Stored {
    message: Message,
    receipt: Option<String>,
    /// `None` once received with a visibility timeout too large to represent:
    /// hidden until deleted.
    visible_at: Option<Instant>,
    receive_count: u32,
}

#[derive(Default)]
struct State {
    queues: HashMap<String, VecDeque<Stored>>,
    closed: bool,
}

struct Shared {
    options: QueueOptions,
    state: Mutex<State>,
    available: Condvar,
    consumers: Mutex<Vec<ConsumerThread>>,
}

/// Thread-safe in-process queue transport. Clones share the same queues.
///
/// ```
/// use std::time::Duration;
/// use cqrs_mediator::{InMemoryQueue, Message, QueueTransport};
///
/// let queue = InMemoryQueue::new();
/// queue.send("billing-invoices", Message::new("{}")).unwrap();
///
/// let received = queue
///     .receive_one("billing-invoices", Duration::from_millis(10))
///     .unwrap();
/// assert!(received.is_some());
/// assert_eq!(queue.len("billing-invoices"), 0);
/// ```
#[derive(Clone)]
pub struct InMemoryQueue {
    shared: Arc<Shared>,
}

impl Default for InMemoryQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryQueue {
    pub fn new() -> Self {
        Self::with_options(QueueOptions::default())
    }

    pub fn with_options(options: QueueOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                options,
                state: Mutex::new(State::default()),
                available: Condvar::new(),
                consumers: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn options(&self) -> QueueOptions {
        self.shared.options
    }

    /// Receive the next visible message, waiting up to `wait` for one.
    ///
    /// The message stays on the queue, hidden for the visibility timeout,
    /// until [`delete`](Self::delete) is called with the returned receipt.
    pub fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>, TransportError> {
        // `None` means the wait never ends on its own.
        let deadline = Instant::now().checked_add(wait);
        let mut state = self.shared.state.lock();

        loop {
            if state.closed {
                return Err(TransportError::Closed);
            }

            let now = Instant::now();
            let mut next_visible: Option<Instant> = None;
            if let Some(messages) = state.queues.get_mut(queue) {
                for stored in messages.iter_mut() {
                    match stored.visible_at {
                        Some(at) if at <= now => {
                            let receipt = Uuid::new_v4().to_string();
                            stored.receipt = Some(receipt.clone());
                            stored.visible_at = now.checked_add(self.shared.options.visibility_timeout);
                            stored.receive_count += 1;
                            return Ok(Some(Delivery {
                                message: stored.message.clone(),
                                receipt,
                                receive_count: stored.receive_count,
                            }));
                        }
                        Some(at) => {
                            next_visible = Some(next_visible.map_or(at, |earliest| earliest.min(at)));
                        }
                        None => {}
                    }
                }
            }

            if deadline.is_some_and(|at| now >= at) {
                return Ok(None);
            }

            match next_visible.into_iter().chain(deadline).min() {
                Some(wake_at) => {
                    self.shared.available.wait_until(&mut state, wake_at);
                }
                None => self.shared.available.wait(&mut state),
            }
        }
    }

    /// Delete a received message by its receipt.
    ///
    /// A receipt is only valid until the message is delivered again.
    pub fn delete(&self, queue: &str, receipt: &str) -> Result<(), TransportError> {
        let mut state = self.shared.state.lock();
        if let Some(messages) = state.queues.get_mut(queue) {
            messages.retain(|stored| stored.receipt.as_deref() != Some(receipt));
        }
        Ok(())
    }

    /// Number of messages on the queue, including those currently hidden.
    pub fn len(&self, queue: &str) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .get(queue)
            .map_or(0, VecDeque::len)
    }

    pub fn is_empty(&self, queue: &str) -> bool {
        self.len(queue) == 0
    }

    /// Names of queues that have received at least one message.
    pub fn queue_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.shared.state.lock().queues.keys().cloned().collect();
        names.sort();
        names
    }

    /// Queues with a running (or stopped) consumer, in subscription order.
    pub fn subscribed_queues(&self) -> Vec<String> {
        self.shared
            .consumers
            .lock()
            .iter()
            .map(|consumer| consumer.queue().to_string())
            .collect()
    }

    /// Statistics of the consumer for `queue`, summed if there are several.
    pub fn stats(&self, queue: &str) -> Option<ConsumerStats> {
        let consumers = self.shared.consumers.lock();
        let mut matching = consumers.iter().filter(|c| c.queue() == queue).peekable();
        matching.peek()?;
        Some(matching.fold(ConsumerStats::default(), |mut total, consumer| {
            let stats = consumer.stats();
            total.polls += stats.polls;
            total.handled += stats.handled;
            total.failed += stats.failed;
            total
        }))
    }

    pub fn is_closed(&self) -> bool {
        self.shared.state.lock().closed
    }
}

impl Receiver for InMemoryQueue {
    fn receive(&self, queue: &str, wait: Duration) -> Result<Option<Delivery>, TransportError> {
        InMemoryQueue::receive(self, queue, wait)
    }

    fn delete(&self, queue: &str, receipt: &str) -> Result<(), TransportError> {
        InMemoryQueue::delete(self, queue, receipt)
    }
}

impl QueueTransport for InMemoryQueue {
    fn send(&self, queue: &str, message: Message) -> Result<(), TransportError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(TransportError::Closed);
        }
        state
            .queues
            .entry(queue.to_string())
            .or_default()
            .push_back(Stored {
                message,
                receipt: None,
                visible_at: Some(Instant::now()),
                receive_count: 0,
            });
        self.shared.available.notify_all();
        Ok(())
    }

    fn subscribe(&self, queue: &str, handler: MessageHandler) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let consumer =
            ConsumerThread::spawn(self.clone(), queue, self.shared.options.wait_time, handler)?;
        self.shared.consumers.lock().push(consumer);
        Ok(())
    }

    fn receive_one(&self, queue: &str, wait: Duration) -> Result<Option<Message>, TransportError> {
        match self.receive(queue, wait)? {
            Some(delivery) => {
                self.delete(queue, &delivery.receipt)?;
                Ok(Some(delivery.message))
            }
            None => Ok(None),
        }
    }

    fn purge(&self, queue: &str) -> Result<(), TransportError> {
        if let Some(messages) = self.shared.state.lock().queues.get_mut(queue) {
            messages.clear();
        }
        Ok(())
    }

    fn close(&self) {
        {
            let mut state = self.shared.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            self.shared.available.notify_all();
        }

        let mut consumers = self.shared.consumers.lock();
        for consumer in consumers.iter_mut() {
            consumer.join();
        }
        info!(consumers = consumers.len(), "queue transport closed");
    }
}
