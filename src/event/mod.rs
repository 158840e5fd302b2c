//! Events: fan-out to every handler registered for an event type.

mod dispatcher;

pub use dispatcher::EventDispatcher;
