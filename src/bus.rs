//! Delivery-agnostic command and event buses.
//!
//! The in-memory executors and their queued counterparts implement the same
//! traits, so application code can be written once against a bus and wired
//! to either delivery mode by the composition root.
//!
//! ```
//! use std::sync::Arc;
//! use cqrs_mediator::{
//!     AllowEveryone, CommandBus, CommandExecutor, CommandHandler, DispatchError,
//!     InvocationContext, Payload,
//! };
//! use serde::{Deserialize, Serialize};
//!
//! #[derive(Serialize, Deserialize, Payload)]
//! struct Archive {
//!     id: u32,
//! }
//!
//! fn wire<B: CommandBus<Store = ()>>(bus: &mut B) -> Result<(), DispatchError> {
//!     bus.register_command_handler(CommandHandler::new(|_: Archive| Ok(())), AllowEveryone)?;
//!     bus.execute(&InvocationContext::new(), None, Archive { id: 1 })
//! }
//!
//! wire(&mut CommandExecutor::new(Arc::new(()))).unwrap();
//! ```

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use crate::context::InvocationContext;
use crate::error::DispatchError;
use crate::handler::{CommandHandler, EventHandler};
use crate::payload::Payload;
use crate::security::Authorize;

/// Registers and executes commands.
///
/// Payloads must be serializable so that any implementation can move them
/// across a queue.
pub trait CommandBus {
    /// Persistence handle passed to handlers.
    type Store;

    fn register_command_handler<C>(
        &mut self,
        handler: CommandHandler<Self::Store, C>,
        authorizer: impl Authorize + 'static,
    ) -> Result<(), DispatchError>
    where
        C: Payload + Serialize + DeserializeOwned;

    /// Run or publish a command. Queued implementations return once the
    /// command is on its queue.
    fn execute<C>(
        &self,
        ctx: &InvocationContext,
        organisation_id: Option<Uuid>,
        command: C,
    ) -> Result<(), DispatchError>
    where
        C: Payload + Serialize + DeserializeOwned;
}

/// Registers event handlers and dispatches events.
pub trait EventBus {
    fn register_event_handler<E>(&mut self, handler: EventHandler<E>) -> Result<(), DispatchError>
    where
        E: Payload + Serialize + DeserializeOwned;

    fn dispatch<E>(&self, ctx: &InvocationContext, event: E) -> Result<(), DispatchError>
    where
        E: Payload + Serialize + DeserializeOwned;
}
