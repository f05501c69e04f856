//! Tracing setup shared by the Pillbox binaries.
//!
//! The CLI prints its results on stdout, so diagnostics go through
//! tracing on stderr and stay quiet unless `RUST_LOG` asks for more.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Install the global subscriber with a `warn` default.
///
/// Warnings (corrupted collection files, skipped records) still reach
/// the user; routine operational chatter needs `RUST_LOG`.
pub fn init() {
    init_with_level("warn")
}

/// Install the global subscriber with the given default level.
///
/// `RUST_LOG` takes precedence when set. Output is the compact
/// single-line format on stderr.
pub fn init_with_level(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact().with_writer(std::io::stderr))
        .init();
}

/// Capture-friendly subscriber for tests; safe to call repeatedly
#[cfg(test)]
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(EnvFilter::new("debug"))
        .try_init();
}
