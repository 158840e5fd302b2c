//! Error taxonomy for registration, lookup, authorization, handler execution
//! and queue transport.

use std::error::Error;
use std::fmt;

use thiserror::Error;

/// Error returned by every executor, dispatcher and queued façade.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Duplicate registration, or one type tag shared by two payload types.
    #[error("{0}")]
    Registration(String),
    /// No handler or query registered for the requested type (or type pair).
    #[error("{0}")]
    Lookup(String),
    /// The caller is not allowed to see a result or run a command.
    #[error("{0}")]
    Permission(String),
    /// The handler failed or panicked. The handler's error is kept as-is.
    #[error(transparent)]
    Handler(#[from] HandlerError),
    /// One or more event handlers failed.
    #[error(transparent)]
    Aggregate(#[from] AggregateError),
    /// A payload could not be (de)serialized for the queue.
    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    /// The queue transport rejected an operation.
    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DispatchError {
    pub(crate) fn registration(message: impl Into<String>) -> Self {
        DispatchError::Registration(message.into())
    }

    pub(crate) fn lookup(message: impl Into<String>) -> Self {
        DispatchError::Lookup(message.into())
    }

    pub(crate) fn permission(message: impl Into<String>) -> Self {
        DispatchError::Permission(message.into())
    }
}

/// Error type returned by command, query and event handlers.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Business logic rejected the payload (validation, invariant violation).
    #[error("rejected: {0}")]
    Rejected(String),
    /// Aggregate or resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Missing or invalid authorization inside the handler.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    /// The handler panicked; the panic was contained at the dispatch boundary.
    #[error("handler for '{payload_type}' encountered a panic: {message}")]
    Panicked {
        payload_type: String,
        message: String,
    },
    /// Any other error, e.g. from the persistence layer.
    #[error("{0}")]
    Other(Box<dyn Error + Send + Sync>),
}

impl HandlerError {
    /// Wrap an arbitrary error.
    pub fn other(err: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        HandlerError::Other(err.into())
    }

    /// True if this error came from a contained panic.
    pub fn is_panic(&self) -> bool {
        matches!(self, HandlerError::Panicked { .. })
    }
}

/// A single failed event handler inside an [`AggregateError`].
#[derive(Debug)]
pub struct HandlerFailure {
    /// Zero-based registration index of the handler.
    pub index: usize,
    pub error: HandlerError,
}

/// Combined failures of every event handler that failed during one dispatch.
#[derive(Debug)]
pub struct AggregateError {
    event_type: String,
    failures: Vec<HandlerFailure>,
}

impl AggregateError {
    pub(crate) fn new(event_type: impl Into<String>, failures: Vec<HandlerFailure>) -> Self {
        Self {
            event_type: event_type.into(),
            failures,
        }
    }

    /// The event type tag the failures belong to.
    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    /// Individual failures, in handler registration order.
    pub fn failures(&self) -> &[HandlerFailure] {
        &self.failures
    }
}

impl fmt::Display for AggregateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, failure) in self.failures.iter().enumerate() {
            if position > 0 {
                f.write_str(",")?;
            }
            write!(
                f,
                "error in handler #{} for '{}': {}",
                failure.index, self.event_type, failure.error
            )?;
        }
        Ok(())
    }
}

impl Error for AggregateError {}

/// Error type for queue transport operations.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The transport has been closed.
    #[error("transport closed")]
    Closed,
    /// A consumer could not be started for the queue.
    #[error("failed to subscribe to queue {queue}: {reason}")]
    Subscribe { queue: String, reason: String },
    /// The queue rejected the message.
    #[error("message rejected by queue {queue}: {reason}")]
    Rejected { queue: String, reason: String },
}
