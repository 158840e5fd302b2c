//! Typed handler wrappers and the panic boundary around every invocation.
//!
//! A handler declares which dependencies it needs by the constructor used to
//! build it, instead of by its parameter list:
//!
//! | constructor                        | callable shape              |
//! |------------------------------------|-----------------------------|
//! | `Handler::new`                     | `Fn(P)`                     |
//! | `Handler::with_store`              | `Fn(&R, P)`                 |
//! | `Handler::with_context`            | `Fn(&InvocationContext, P)` |
//! | `Handler::with_context_and_store`  | `Fn(&InvocationContext, &R, P)` |
//!
//! `R` is the persistence handle shared by the executor.

use std::any::{type_name, Any};
use std::panic::{self, AssertUnwindSafe};

use crate::context::InvocationContext;
use crate::error::HandlerError;

/// The optional dependencies a handler receives besides its payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Dependencies {
    /// Receives the persistence handle.
    pub store: bool,
    /// Receives the invocation context.
    pub context: bool,
}

type PayloadFn<P, T> = Box<dyn Fn(P) -> Result<T, HandlerError> + Send + Sync>;
type StoreFn<R, P, T> = Box<dyn Fn(&R, P) -> Result<T, HandlerError> + Send + Sync>;
type ContextFn<P, T> = Box<dyn Fn(&InvocationContext, P) -> Result<T, HandlerError> + Send + Sync>;
type ContextStoreFn<R, P, T> =
    Box<dyn Fn(&InvocationContext, &R, P) -> Result<T, HandlerError> + Send + Sync>;

enum Invoke<R, P, T> {
    Payload(PayloadFn<P, T>),
    Store(StoreFn<R, P, T>),
    Context(ContextFn<P, T>),
    ContextAndStore(ContextStoreFn<R, P, T>),
}

/// A handler bound to payload type `P`, producing `T`.
pub struct Handler<R, P, T> {
    name: String,
    invoke: Invoke<R, P, T>,
}

/// Command handler: no result besides success or failure.
pub type CommandHandler<R, C> = Handler<R, C, ()>;

/// Query function: `Ok(None)` means "no result".
pub type QueryHandler<R, Q, T> = Handler<R, Q, Option<T>>;

impl<R, P, T> Handler<R, P, T> {
    /// Handler that only takes the payload.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(P) -> Result<T, HandlerError> + Send + Sync + 'static,
    {
        Self {
            name: type_name::<F>().to_string(),
            invoke: Invoke::Payload(Box::new(handler)),
        }
    }

    /// Handler that takes the persistence handle and the payload.
    pub fn with_store<F>(handler: F) -> Self
    where
        F: Fn(&R, P) -> Result<T, HandlerError> + Send + Sync + 'static,
    {
        Self {
            name: type_name::<F>().to_string(),
            invoke: Invoke::Store(Box::new(handler)),
        }
    }

    /// Handler that takes the invocation context and the payload.
    pub fn with_context<F>(handler: F) -> Self
    where
        F: Fn(&InvocationContext, P) -> Result<T, HandlerError> + Send + Sync + 'static,
    {
        Self {
            name: type_name::<F>().to_string(),
            invoke: Invoke::Context(Box::new(handler)),
        }
    }

    /// Handler that takes the context, the persistence handle and the payload.
    pub fn with_context_and_store<F>(handler: F) -> Self
    where
        F: Fn(&InvocationContext, &R, P) -> Result<T, HandlerError> + Send + Sync + 'static,
    {
        Self {
            name: type_name::<F>().to_string(),
            invoke: Invoke::ContextAndStore(Box::new(handler)),
        }
    }

    /// Override the handler name used for tracing.
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Fully-qualified handler name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> Dependencies {
        match self.invoke {
            Invoke::Payload(_) => Dependencies::default(),
            Invoke::Store(_) => Dependencies {
                store: true,
                context: false,
            },
            Invoke::Context(_) => Dependencies {
                store: false,
                context: true,
            },
            Invoke::ContextAndStore(_) => Dependencies {
                store: true,
                context: true,
            },
        }
    }

    /// Call the handler, passing only the dependencies it declared.
    pub(crate) fn call(&self, ctx: &InvocationContext, store: &R, payload: P) -> Result<T, HandlerError> {
        match &self.invoke {
            Invoke::Payload(f) => f(payload),
            Invoke::Store(f) => f(store, payload),
            Invoke::Context(f) => f(ctx, payload),
            Invoke::ContextAndStore(f) => f(ctx, store, payload),
        }
    }
}

/// Event handler: takes the event by reference, optionally with context.
/// Many handlers may see the same event.
pub struct EventHandler<E> {
    name: String,
    invoke: EventInvoke<E>,
}

enum EventInvoke<E> {
    Payload(Box<dyn Fn(&E) -> Result<(), HandlerError> + Send + Sync>),
    Context(Box<dyn Fn(&InvocationContext, &E) -> Result<(), HandlerError> + Send + Sync>),
}

impl<E> EventHandler<E> {
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&E) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self {
            name: type_name::<F>().to_string(),
            invoke: EventInvoke::Payload(Box::new(handler)),
        }
    }

    pub fn with_context<F>(handler: F) -> Self
    where
        F: Fn(&InvocationContext, &E) -> Result<(), HandlerError> + Send + Sync + 'static,
    {
        Self {
            name: type_name::<F>().to_string(),
            invoke: EventInvoke::Context(Box::new(handler)),
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dependencies(&self) -> Dependencies {
        Dependencies {
            store: false,
            context: matches!(self.invoke, EventInvoke::Context(_)),
        }
    }

    pub(crate) fn call(&self, ctx: &InvocationContext, event: &E) -> Result<(), HandlerError> {
        match &self.invoke {
            EventInvoke::Payload(f) => f(event),
            EventInvoke::Context(f) => f(ctx, event),
        }
    }
}

/// Run a handler invocation, converting a panic into `HandlerError::Panicked`.
///
/// This is the only place panics are caught. It is a fault boundary, not
/// control flow: handlers signal expected failures through their `Result`.
pub(crate) fn contain<T>(
    payload_type: &str,
    invocation: impl FnOnce() -> Result<T, HandlerError>,
) -> Result<T, HandlerError> {
    match panic::catch_unwind(AssertUnwindSafe(invocation)) {
        Ok(result) => result,
        Err(panic) => Err(HandlerError::Panicked {
            payload_type: payload_type.to_string(),
            message: panic_message(panic.as_ref()),
        }),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
