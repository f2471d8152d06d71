//! Development tracing for the solver.
//!
//! Diagnostics go to stderr via `RUST_LOG`. Problem records under
//! `<data-dir>/records/` are product output and do not depend on it.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, falling back to `default_filter` when unset.
///
/// ```bash
/// RUST_LOG=solver=debug solver solve "Integrate x^2 from 0 to 3"
/// ```
pub fn init_with(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}

/// Initialize with the default `warn` filter.
pub fn init() {
    init_with("warn");
}
