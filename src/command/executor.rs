//! CommandExecutor: command handler registry and synchronous dispatch.
//!
//! `CommandExecutor<R>` holds the persistence handle and exactly one handler
//! per command type. Each handler is guarded by an authorization check and
//! runs on the caller's thread.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use cqrs_mediator::{AllowEveryone, CommandExecutor, CommandHandler, InvocationContext, Payload};
//!
//! #[derive(Payload)]
//! struct CreateOrder {
//!     id: u32,
//! }
//!
//! let mut executor = CommandExecutor::new(Arc::new(()));
//! executor
//!     .register_command_handler(
//!         CommandHandler::new(|cmd: CreateOrder| {
//!             assert_eq!(cmd.id, 7);
//!             Ok(())
//!         }),
//!         AllowEveryone,
//!     )
//!     .unwrap();
//!
//! executor
//!     .execute(&InvocationContext::new(), None, CreateOrder { id: 7 })
//!     .unwrap();
//! ```

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::error;
use uuid::Uuid;

use crate::bus::CommandBus;
use crate::context::InvocationContext;
use crate::error::DispatchError;
use crate::handler::{contain, CommandHandler, Dependencies};
use crate::payload::Payload;
use crate::security::Authorize;

/// A registered command handler with its authorization check.
struct CommandEntry {
    /// Boxed `CommandHandler<R, C>`; the downcast at dispatch doubles as the
    /// payload type check.
    handler: Box<dyn Any + Send + Sync>,
    handler_name: String,
    dependencies: Dependencies,
    authorizer: Box<dyn Authorize>,
}

/// Routes commands to their single registered handler.
///
/// Registration needs `&mut self` and happens at composition time; execution
/// only needs `&self`.
pub struct CommandExecutor<R> {
    store: Arc<R>,
    handlers: HashMap<&'static str, CommandEntry>,
}

impl<R: Send + Sync + 'static> CommandExecutor<R> {
    /// Create an executor sharing the given persistence handle.
    pub fn new(store: Arc<R>) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for command type `C`.
    ///
    /// Fails if `C` already has a handler: only one handler is allowed per
    /// command.
    pub fn register_command_handler<C: Payload>(
        &mut self,
        handler: CommandHandler<R, C>,
        authorizer: impl Authorize + 'static,
    ) -> Result<(), DispatchError> {
        if self.handlers.contains_key(C::TYPE_NAME) {
            return Err(DispatchError::registration(format!(
                "handler already registered for {} only one handler allowed per command",
                C::TYPE_NAME
            )));
        }

        self.handlers.insert(
            C::TYPE_NAME,
            CommandEntry {
                handler_name: handler.name().to_string(),
                dependencies: handler.dependencies(),
                handler: Box::new(handler),
                authorizer: Box::new(authorizer),
            },
        );
        Ok(())
    }

    /// Execute a command on the caller's thread.
    ///
    /// Runs the authorization check first; its error is returned unchanged.
    /// The handler sees a derived context carrying its own name. A panic in
    /// the authorizer or the handler comes back as `HandlerError::Panicked`.
    pub fn execute<C: Payload>(
        &self,
        ctx: &InvocationContext,
        organisation_id: Option<Uuid>,
        command: C,
    ) -> Result<(), DispatchError> {
        let entry = self.handlers.get(C::TYPE_NAME).ok_or_else(|| {
            DispatchError::lookup(format!(
                "no command handler registered of type: {}",
                C::TYPE_NAME
            ))
        })?;

        contain(C::TYPE_NAME, || Ok(entry.authorizer.authorize(ctx, organisation_id)))??;

        let handler = entry
            .handler
            .downcast_ref::<CommandHandler<R, C>>()
            .ok_or_else(|| {
                DispatchError::registration(format!(
                    "command type {} is registered for a different payload type",
                    C::TYPE_NAME
                ))
            })?;

        let ctx = ctx.with_handler(&entry.handler_name);
        contain(C::TYPE_NAME, || handler.call(&ctx, &self.store, command)).map_err(|err| {
            error!(
                handler = %entry.handler_name,
                command_type = C::TYPE_NAME,
                error = %err,
                "command handler failed"
            );
            DispatchError::from(err)
        })
    }

    /// Check whether a handler is registered for the given type tag.
    pub fn is_registered(&self, type_name: &str) -> bool {
        self.handlers.contains_key(type_name)
    }

    /// Dependencies declared by the handler for the given type tag.
    pub fn dependencies(&self, type_name: &str) -> Option<Dependencies> {
        self.handlers.get(type_name).map(|entry| entry.dependencies)
    }

    /// List registered command type tags.
    pub fn command_types(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    /// Get a reference to the persistence handle.
    pub fn store(&self) -> &R {
        &self.store
    }
}

impl<R: Send + Sync + 'static> CommandBus for CommandExecutor<R> {
    type Store = R;

    fn register_command_handler<C>(
        &mut self,
        handler: CommandHandler<R, C>,
        authorizer: impl Authorize + 'static,
    ) -> Result<(), DispatchError>
    where
        C: Payload + Serialize + DeserializeOwned,
    {
        CommandExecutor::register_command_handler(self, handler, authorizer)
    }

    fn execute<C>(
        &self,
        ctx: &InvocationContext,
        organisation_id: Option<Uuid>,
        command: C,
    ) -> Result<(), DispatchError>
    where
        C: Payload + Serialize + DeserializeOwned,
    {
        CommandExecutor::execute(self, ctx, organisation_id, command)
    }
}
