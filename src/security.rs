//! Command authorization checks.

use uuid::Uuid;

use crate::context::InvocationContext;
use crate::error::DispatchError;

/// Authorization check run before a command handler.
///
/// Any `Fn(&InvocationContext, Option<Uuid>) -> Result<(), DispatchError>`
/// closure is an authorizer. A returned error is handed back to the caller
/// unchanged and the handler does not run.
pub trait Authorize: Send + Sync {
    fn authorize(
        &self,
        ctx: &InvocationContext,
        organisation_id: Option<Uuid>,
    ) -> Result<(), DispatchError>;
}

impl<F> Authorize for F
where
    F: Fn(&InvocationContext, Option<Uuid>) -> Result<(), DispatchError> + Send + Sync,
{
    fn authorize(
        &self,
        ctx: &InvocationContext,
        organisation_id: Option<Uuid>,
    ) -> Result<(), DispatchError> {
        self(ctx, organisation_id)
    }
}

/// Lets every caller through.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowEveryone;

impl Authorize for AllowEveryone {
    fn authorize(&self, _: &InvocationContext, _: Option<Uuid>) -> Result<(), DispatchError> {
        Ok(())
    }
}

/// Requires the caller to hold the target organisation.
///
/// System invocations (queue consumers) always pass.
#[derive(Debug, Clone, Copy, Default)]
pub struct OrganisationMember;

impl Authorize for OrganisationMember {
    fn authorize(
        &self,
        ctx: &InvocationContext,
        organisation_id: Option<Uuid>,
    ) -> Result<(), DispatchError> {
        if ctx.is_system_invocation() {
            return Ok(());
        }
        let organisation_id = organisation_id
            .ok_or_else(|| DispatchError::permission("no organisation id supplied"))?;
        if ctx.can_access(organisation_id) {
            Ok(())
        } else {
            Err(DispatchError::permission(format!(
                "user does not have access to organisation id: {}",
                organisation_id
            )))
        }
    }
}
