//! Tracing subscriber setup for binaries and tests.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Install a console subscriber filtered by `RUST_LOG` (default `info`).
///
/// Safe to call more than once; later calls leave the existing subscriber.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::registry().with(
        fmt::layer()
            .with_target(true)
            .with_thread_names(true)
            .with_filter(filter),
    );

    if subscriber.try_init().is_err() {
        tracing::debug!("global tracing subscriber already initialized");
    }
}
