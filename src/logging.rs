//! Stderr diagnostics for worker runs
//!
//! Reads `RUST_LOG`, defaulting to `info` so the run's milestones (branch
//! resolved, files written, change request published) are visible in CI
//! logs without extra configuration. The change-request URL itself goes to
//! stdout, not through tracing.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Initialize the tracing subscriber. Call once, before any client is built.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
