//! Queue naming strategies: map a payload type tag to a destination queue.

/// Pure mapping from a payload type tag to a queue name.
pub trait QueueNamingStrategy: Send + Sync {
    fn queue_name_for(&self, type_name: &str) -> String;
}

/// One queue per payload type.
///
/// The type tag is lowercased and the first occurrences of `api.`, `events.`
/// and `event` are removed, in that order:
///
/// ```
/// use cqrs_mediator::{PerTypeQueueNaming, QueueNamingStrategy};
///
/// let naming = PerTypeQueueNaming::new("billing");
/// assert_eq!(naming.queue_name_for("api.CreateInvoice"), "billing-createinvoice");
/// assert_eq!(naming.queue_name_for("events.InvoicePaidEvent"), "billing-invoicepaid");
/// ```
#[derive(Debug, Clone)]
pub struct PerTypeQueueNaming {
    pub application_name: String,
}

impl PerTypeQueueNaming {
    pub fn new(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
        }
    }
}

impl QueueNamingStrategy for PerTypeQueueNaming {
    fn queue_name_for(&self, type_name: &str) -> String {
        let name = type_name
            .to_lowercase()
            .replacen("api.", "", 1)
            .replacen("events.", "", 1)
            .replacen("event", "", 1);
        format!("{}-{}", self.application_name, name)
    }
}

/// A single fixed queue for every payload type.
#[derive(Debug, Clone)]
pub struct SharedQueueNaming {
    pub application_name: String,
    pub queue_name: String,
}

impl SharedQueueNaming {
    pub fn new(application_name: impl Into<String>, queue_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            queue_name: queue_name.into(),
        }
    }
}

impl QueueNamingStrategy for SharedQueueNaming {
    fn queue_name_for(&self, _type_name: &str) -> String {
        format!("{}-{}", self.application_name, self.queue_name)
    }
}
