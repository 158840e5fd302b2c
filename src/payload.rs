//! Payload type tags and organisation scoping.

use uuid::Uuid;

use crate::error::DispatchError;

/// A command, query criteria or event that can be dispatched.
///
/// `TYPE_NAME` is the dispatch key: registries are keyed by it, queued
/// messages carry it in their `TypeInfo` attribute, and queue naming
/// strategies derive queue names from it. Usually implemented with
/// `#[derive(Payload)]`.
pub trait Payload: Send + 'static {
    /// Stable type tag for this payload.
    const TYPE_NAME: &'static str;

    /// Extra attributes to attach when this payload is published to a queue.
    fn message_attributes(&self) -> Vec<(String, String)> {
        Vec::new()
    }
}

/// A value owned by a single organisation.
pub trait OrganisationScoped {
    fn organisation_id(&self) -> Uuid;
}

/// A query result that can be narrowed to a set of allowed organisations.
///
/// Single items are all-or-nothing: outside the allowed set they are a
/// permission error. Sequences keep only the allowed items, in order; an
/// empty sequence is still a success.
pub trait ScopedResult: Sized {
    fn restrict_to(self, allowed: &[Uuid]) -> Result<Self, DispatchError>;
}

impl<T: OrganisationScoped> ScopedResult for Vec<T> {
    fn restrict_to(self, allowed: &[Uuid]) -> Result<Self, DispatchError> {
        Ok(self
            .into_iter()
            .filter(|item| allowed.contains(&item.organisation_id()))
            .collect())
    }
}

/// Single-item restriction, used by `#[derive(OrganisationScoped)]`.
pub fn restrict_single<T: OrganisationScoped>(
    item: T,
    allowed: &[Uuid],
) -> Result<T, DispatchError> {
    let organisation_id = item.organisation_id();
    if allowed.contains(&organisation_id) {
        Ok(item)
    } else {
        Err(DispatchError::permission(format!(
            "user does not have access to result for organisation id: {}",
            organisation_id
        )))
    }
}
