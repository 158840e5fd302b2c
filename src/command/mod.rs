//! Commands: exactly one authorized handler per command type.

mod executor;

pub use executor::CommandExecutor;
