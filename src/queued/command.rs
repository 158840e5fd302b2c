//! QueuedCommandExecutor: commands travel through a queue before running.

use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use uuid::Uuid;

use super::QueueBinding;
use crate::bus::CommandBus;
use crate::command::CommandExecutor;
use crate::context::InvocationContext;
use crate::error::DispatchError;
use crate::handler::CommandHandler;
use crate::naming::QueueNamingStrategy;
use crate::payload::Payload;
use crate::security::Authorize;
use crate::transport::{Message, QueueTransport, ORGANISATION_ID_ATTRIBUTE};

/// Publishes commands to queues and executes them on the consumer side with
/// an internal [`CommandExecutor`].
///
/// Queue names come from a [`QueueNamingStrategy`], per-type by default.
/// Consumer-side invocations are system invocations, so authorizers that
/// honour the flag (like [`OrganisationMember`](crate::OrganisationMember))
/// let them through.
pub struct QueuedCommandExecutor<R, T> {
    binding: QueueBinding<CommandExecutor<R>, T>,
}

impl<R, T> QueuedCommandExecutor<R, T>
where
    R: Send + Sync + 'static,
    T: QueueTransport,
{
    pub fn new(store: Arc<R>, application_name: impl Into<String>, transport: Arc<T>) -> Self {
        Self {
            binding: QueueBinding::new(
                CommandExecutor::new(store),
                application_name.into(),
                transport,
            ),
        }
    }

    /// Replace the naming strategy. Call before registering handlers.
    pub fn with_naming_strategy(mut self, naming: impl QueueNamingStrategy + 'static) -> Self {
        self.binding.set_naming(Box::new(naming));
        self
    }

    /// Register the handler for `C` and subscribe to its queue if no
    /// consumer exists for that queue yet.
    pub fn register_command_handler<C>(
        &mut self,
        handler: CommandHandler<R, C>,
        authorizer: impl Authorize + 'static,
    ) -> Result<(), DispatchError>
    where
        C: Payload + Serialize + DeserializeOwned,
    {
        self.binding.register::<C>(
            |executor| executor.register_command_handler(handler, authorizer),
            Box::new(
                |executor: &CommandExecutor<R>,
                 ctx: &InvocationContext,
                 message: &Message|
                 -> Result<(), DispatchError> {
                    let command: C = message.decode()?;
                    let organisation_id = message
                        .attribute(ORGANISATION_ID_ATTRIBUTE)
                        .and_then(|raw| Uuid::parse_str(raw).ok());
                    executor.execute(ctx, organisation_id, command)
                },
            ),
        )
    }

    /// Publish a command. The handler runs later, on the consumer thread.
    ///
    /// No authorization runs here; only the presence of a local handler for
    /// this exact payload type is checked.
    pub fn execute<C>(
        &self,
        ctx: &InvocationContext,
        organisation_id: Option<Uuid>,
        command: C,
    ) -> Result<(), DispatchError>
    where
        C: Payload + Serialize,
    {
        if !self.binding.routes::<C>()? {
            return Err(DispatchError::lookup(format!(
                "no command handler registered of type: {}",
                C::TYPE_NAME
            )));
        }

        let organisation = organisation_id.map(|id| (ORGANISATION_ID_ATTRIBUTE, id.to_string()));
        self.binding.publish(ctx, &command, organisation)
    }

    /// Destination queue for a command type tag.
    pub fn queue_name_for(&self, type_name: &str) -> String {
        self.binding.queue_name_for(type_name)
    }

    /// Queues this executor consumes, sorted.
    pub fn subscribed_queues(&self) -> Vec<String> {
        self.binding.subscribed_queues()
    }

    pub fn transport(&self) -> &T {
        &self.binding.transport
    }
}

impl<R, T> CommandBus for QueuedCommandExecutor<R, T>
where
    R: Send + Sync + 'static,
    T: QueueTransport,
{
    type Store = R;

    fn register_command_handler<C>(
        &mut self,
        handler: CommandHandler<R, C>,
        authorizer: impl Authorize + 'static,
    ) -> Result<(), DispatchError>
    where
        C: Payload + Serialize + DeserializeOwned,
    {
        QueuedCommandExecutor::register_command_handler(self, handler, authorizer)
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
        QueuedCommandExecutor::execute(self, ctx, organisation_id, command)
    }
}
