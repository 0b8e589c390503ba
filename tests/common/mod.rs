//! Shared helpers for the integration suites.

use std::sync::Once;

static INIT: Once = Once::new();

/// Opt-in tracing output while debugging a test run:
/// `RUST_LOG=maestro=debug cargo test -- --nocapture`.
pub fn init_logging() {
    INIT.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}
