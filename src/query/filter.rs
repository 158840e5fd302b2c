//! Result filters applied to successful query results.

use crate::context::InvocationContext;
use crate::error::DispatchError;
use crate::payload::ScopedResult;

type FilterFn<T> = Box<dyn Fn(&InvocationContext, T) -> Result<T, DispatchError> + Send + Sync>;

/// Post-processing policy for a query result, chosen at registration.
///
/// Filters only run when the query returned `Some(result)`.
pub struct ResultFilter<T> {
    apply: FilterFn<T>,
}

impl<T: 'static> ResultFilter<T> {
    /// Pass the result through unmodified.
    pub fn none() -> Self {
        Self {
            apply: Box::new(|_, result| Ok(result)),
        }
    }

    /// Custom policy.
    pub fn custom<F>(filter: F) -> Self
    where
        F: Fn(&InvocationContext, T) -> Result<T, DispatchError> + Send + Sync + 'static,
    {
        Self {
            apply: Box::new(filter),
        }
    }

    pub(crate) fn apply(&self, ctx: &InvocationContext, result: T) -> Result<T, DispatchError> {
        (self.apply)(ctx, result)
    }
}

impl<T: ScopedResult + 'static> ResultFilter<T> {
    /// Restrict the result to the caller's organisations.
    ///
    /// System invocations see everything. Otherwise the context must carry
    /// the caller's organisations.
    pub fn organisation() -> Self {
        Self::custom(|ctx, result: T| {
            if ctx.is_system_invocation() {
                return Ok(result);
            }
            let allowed = ctx
                .allowed_organisations()
                .ok_or_else(|| DispatchError::lookup("no acls found in context"))?;
            result.restrict_to(allowed)
        })
    }
}
