//! Invocation context propagated through a dispatch call.

use uuid::Uuid;

use crate::transport::{Message, CORRELATION_ID_ATTRIBUTE};

/// Ambient values carried through one dispatch call.
///
/// Values are immutable by convention: executors derive annotated copies
/// (see [`InvocationContext::with_handler`]) and never touch the caller's
/// context.
///
/// ```
/// use cqrs_mediator::{InvocationContext, Uuid};
///
/// let org = Uuid::new_v4();
/// let ctx = InvocationContext::new()
///     .with_caller("user-42")
///     .with_organisations([org]);
///
/// assert_eq!(ctx.caller_id(), Some("user-42"));
/// assert_eq!(ctx.allowed_organisations(), Some(&[org][..]));
/// assert!(!ctx.is_system_invocation());
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InvocationContext {
    correlation_id: Option<String>,
    caller_id: Option<String>,
    caller_organisations: Option<Vec<Uuid>>,
    system_invocation: bool,
    handler_name: Option<String>,
}

impl InvocationContext {
    /// Create a context with a fresh correlation id.
    pub fn new() -> Self {
        Self {
            correlation_id: Some(Uuid::new_v4().to_string()),
            ..Self::default()
        }
    }

    /// Context for work started by the system rather than a caller.
    /// Authorization checks and organisation filters are bypassed.
    pub fn system() -> Self {
        Self::new().as_system_invocation()
    }

    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn with_caller(mut self, caller_id: impl Into<String>) -> Self {
        self.caller_id = Some(caller_id.into());
        self
    }

    /// Set the organisations the caller may act on and see.
    pub fn with_organisations(mut self, organisations: impl IntoIterator<Item = Uuid>) -> Self {
        self.caller_organisations = Some(organisations.into_iter().collect());
        self
    }

    /// Mark this context as a system invocation.
    pub fn as_system_invocation(mut self) -> Self {
        self.system_invocation = true;
        self
    }

    /// Derive a copy annotated with the handler about to run.
    pub fn with_handler(&self, handler_name: impl Into<String>) -> Self {
        Self {
            handler_name: Some(handler_name.into()),
            ..self.clone()
        }
    }

    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    pub fn caller_id(&self) -> Option<&str> {
        self.caller_id.as_deref()
    }

    /// Organisations granted to the caller, if any were supplied.
    pub fn allowed_organisations(&self) -> Option<&[Uuid]> {
        self.caller_organisations.as_deref()
    }

    /// Check whether the caller may act on `organisation_id`.
    pub fn can_access(&self, organisation_id: Uuid) -> bool {
        self.system_invocation
            || self
                .allowed_organisations()
                .is_some_and(|orgs| orgs.contains(&organisation_id))
    }

    pub fn is_system_invocation(&self) -> bool {
        self.system_invocation
    }

    /// Name of the handler currently running, set by the executors.
    pub fn handler_name(&self) -> Option<&str> {
        self.handler_name.as_deref()
    }

    /// Build the receive-side context for a queued message.
    pub(crate) fn from_message(message: &Message) -> Self {
        match message.attribute(CORRELATION_ID_ATTRIBUTE) {
            Some(correlation_id) => Self::default().with_correlation_id(correlation_id),
            None => Self::new(),
        }
    }
}
