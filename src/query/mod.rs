//! Queries: read-side functions keyed by criteria type and result type.

mod executor;
mod filter;

pub use executor::QueryExecutor;
pub use filter::ResultFilter;
