//! Log output for dev-runner
//!
//! The crate logs through the `log` facade. `tracing-subscriber` is the
//! backend; its `tracing-log` bridge forwards `log` records to the fmt layer.

use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset or invalid
pub const DEFAULT_LOG_FILTER: &str = "info";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Install the global subscriber. Safe to call more than once; later calls
/// are ignored.
pub fn init_logging() {
    let result = tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_target(false)
        .try_init();

    if let Err(e) = result {
        log::debug!("Logging already initialized: {}", e);
    }
}

// ============================================================================
// TESTS
// ============================================================================
