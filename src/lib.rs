// Lets the derive macros name `::cqrs_mediator` from inside this crate.
extern crate self as cqrs_mediator;

mod broadcast;
mod bus;
mod command;
mod context;
mod error;
mod event;
mod handler;
pub mod logging;
mod naming;
mod payload;
mod query;
mod queued;
mod security;
pub mod settings;
pub mod transport;

pub use broadcast::{BroadcastChannel, BroadcastEvent, BroadcastEventDispatcher, InMemoryBroadcast};
pub use bus::{CommandBus, EventBus};
pub use command::CommandExecutor;
pub use context::InvocationContext;
pub use error::{AggregateError, DispatchError, HandlerError, HandlerFailure, TransportError};
pub use event::EventDispatcher;
pub use handler::{CommandHandler, Dependencies, EventHandler, Handler, QueryHandler};
pub use naming::{PerTypeQueueNaming, QueueNamingStrategy, SharedQueueNaming};
pub use payload::{restrict_single, OrganisationScoped, Payload, ScopedResult};
pub use query::{QueryExecutor, ResultFilter};
pub use queued::{QueuedCommandExecutor, QueuedEventDispatcher};
pub use security::{AllowEveryone, Authorize, OrganisationMember};
pub use settings::Settings;
pub use transport::{InMemoryQueue, Message, QueueOptions, QueueTransport};

// Derive macros share their trait's name.
pub use cqrs_mediator_macros::{OrganisationScoped, Payload};

pub use uuid::Uuid;
