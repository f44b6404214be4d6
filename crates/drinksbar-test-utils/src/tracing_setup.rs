//! Tracing initialisation for tests.
//!
//! [`init_test_tracing`] routes events through the test-harness writer so
//! they show up only for failing tests (or with `--nocapture`).

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset: channel and service internals at
/// debug, everything else at info.
pub const DEFAULT_TEST_FILTER: &str = "info,drinksbar_core=debug";

/// Install the test subscriber once per process. Later calls are no-ops.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER)),
        )
        .with_test_writer()
        .try_init();
    tracing::trace!("test tracing ready");
}
