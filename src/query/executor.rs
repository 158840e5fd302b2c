//! QueryExecutor: query registry keyed by (criteria type, result type).
//!
//! The same criteria type may be registered several times with different
//! result shapes, e.g. `Account` and `Vec<Account>` for a search.
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use cqrs_mediator::{InvocationContext, Payload, QueryExecutor, QueryHandler, ResultFilter};
//!
//! #[derive(Payload)]
//! struct ById(u32);
//!
//! let mut queries = QueryExecutor::new(Arc::new(vec!["zero", "one"]));
//! queries
//!     .register_query(
//!         QueryHandler::with_store(|names: &Vec<&'static str>, c: ById| {
//!             Ok(names.get(c.0 as usize).map(|n| n.to_string()))
//!         }),
//!         ResultFilter::none(),
//!     )
//!     .unwrap();
//!
//! let found: Option<String> = queries.execute(&InvocationContext::new(), ById(1)).unwrap();
//! assert_eq!(found.as_deref(), Some("one"));
//! ```

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use tracing::error;

use super::filter::ResultFilter;
use crate::context::InvocationContext;
use crate::error::DispatchError;
use crate::handler::{contain, QueryHandler};
use crate::payload::Payload;

struct Registered<R, Q, T> {
    query: QueryHandler<R, Q, T>,
    filter: ResultFilter<T>,
}

struct QueryEntry {
    /// Boxed `Registered<R, Q, T>`.
    registration: Box<dyn Any + Send + Sync>,
    query_name: String,
}

/// Routes query criteria to the query producing the requested result type.
pub struct QueryExecutor<R> {
    store: Arc<R>,
    queries: HashMap<&'static str, HashMap<TypeId, QueryEntry>>,
}

impl<R: Send + Sync + 'static> QueryExecutor<R> {
    pub fn new(store: Arc<R>) -> Self {
        Self {
            store,
            queries: HashMap::new(),
        }
    }

    /// Register a query for criteria `Q` returning `T`, with its result filter.
    pub fn register_query<Q, T>(
        &mut self,
        query: QueryHandler<R, Q, T>,
        filter: ResultFilter<T>,
    ) -> Result<(), DispatchError>
    where
        Q: Payload,
        T: Send + 'static,
    {
        let by_result = self.queries.entry(Q::TYPE_NAME).or_default();

        if by_result.contains_key(&TypeId::of::<T>()) {
            return Err(DispatchError::registration(format!(
                "query already registered with criteria type: {} and result type: {}",
                Q::TYPE_NAME,
                type_name::<T>()
            )));
        }

        by_result.insert(
            TypeId::of::<T>(),
            QueryEntry {
                query_name: query.name().to_string(),
                registration: Box::new(Registered { query, filter }),
            },
        );
        Ok(())
    }

    /// Run the query for `criteria` producing `T`.
    ///
    /// `Ok(None)` when the query found nothing; filters do not run then.
    pub fn execute<Q, T>(&self, ctx: &InvocationContext, criteria: Q) -> Result<Option<T>, DispatchError>
    where
        Q: Payload,
        T: Send + 'static,
    {
        let by_result = self.queries.get(Q::TYPE_NAME).ok_or_else(|| {
            DispatchError::lookup(format!(
                "no query found taking parameter of type {}, did you forget to register the query?",
                Q::TYPE_NAME
            ))
        })?;

        let entry = by_result.get(&TypeId::of::<T>()).ok_or_else(|| {
            DispatchError::lookup(format!(
                "found queries accepting criteria {} but none returning result {}",
                Q::TYPE_NAME,
                type_name::<T>()
            ))
        })?;

        let registered = entry
            .registration
            .downcast_ref::<Registered<R, Q, T>>()
            .ok_or_else(|| {
                DispatchError::registration(format!(
                    "query criteria type {} is registered for a different payload type",
                    Q::TYPE_NAME
                ))
            })?;

        let ctx = ctx.with_handler(&entry.query_name);
        let result = contain(Q::TYPE_NAME, || {
            registered.query.call(&ctx, &self.store, criteria)
        })
        .map_err(|err| {
            error!(
                handler = %entry.query_name,
                criteria_type = Q::TYPE_NAME,
                error = %err,
                "query failed"
            );
            DispatchError::from(err)
        })?;

        match result {
            Some(value) => contain(Q::TYPE_NAME, || Ok(registered.filter.apply(&ctx, value)))?.map(Some),
            None => Ok(None),
        }
    }

    /// Run the query and write the outcome into `output`.
    ///
    /// `output` is reset to `None` whenever the query fails, is denied by
    /// its filter, or finds nothing.
    pub fn execute_into<Q, T>(
        &self,
        ctx: &InvocationContext,
        criteria: Q,
        output: &mut Option<T>,
    ) -> Result<(), DispatchError>
    where
        Q: Payload,
        T: Send + 'static,
    {
        match self.execute(ctx, criteria) {
            Ok(result) => {
                *output = result;
                Ok(())
            }
            Err(err) => {
                *output = None;
                Err(err)
            }
        }
    }

    /// Check whether any query accepts the given criteria type tag.
    pub fn accepts(&self, criteria_type: &str) -> bool {
        self.queries.contains_key(criteria_type)
    }

    pub fn store(&self) -> &R {
        &self.store
    }
}
