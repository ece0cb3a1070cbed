//! Logging setup for e2e runs
//!
//! Waits log every poll and watch event at `debug`, satisfied stages at
//! `info`, and retried errors and timeouts at `warn`. `RUST_LOG` picks what
//! is shown.
//!
//! # Example
//!
//! ```no_run
//! use vm_e2e::telemetry::init_logging;
//!
//! init_logging();
//! ```

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset
pub const DEFAULT_FILTER: &str = "info";

/// Install a stderr subscriber filtered by `RUST_LOG` (default: `info`)
///
/// Repeated calls are no-ops, so every test may call it.
pub fn init_logging() {
    init_logging_with(DEFAULT_FILTER);
}

/// Like [`init_logging`], with `default` used when `RUST_LOG` is unset
///
/// Output goes through the test writer so `cargo test` captures it per test.
pub fn init_logging_with(default: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_test_writer().with_target(false))
        .try_init();
}
