//! Explicit logging initialization for harness consumers.
//!
//! Nothing in this crate configures logging implicitly; test runners that
//! want harness output call this from their own entry points.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize a `tracing` subscriber with the given filter directives,
/// falling back to `RUST_LOG` and then to `info`.
///
/// Safe to call more than once; later calls are no-ops.
pub fn init(directives: Option<&str>) {
    let filter = match directives {
        Some(directives) => tracing_subscriber::EnvFilter::new(directives),
        None => tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "info".into()),
    };
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
}
