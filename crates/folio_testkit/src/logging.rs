//! Log output for tests.
//!
//! The libraries only emit `tracing` events; tests opt into seeing them.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_TEST_FILTER: &str = "warn";

/// Installs a global subscriber writing through the test harness, so output
/// is captured per test. The filter comes from `RUST_LOG`, falling back to
/// [`DEFAULT_TEST_FILTER`].
///
/// Safe to call from every test; only the first call has an effect, and a
/// subscriber installed by someone else is left in place.
pub fn init_test_logging() {
    INIT.call_once(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_TEST_FILTER));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_init_is_harmless() {
        init_test_logging();
        init_test_logging();
        tracing::info!("logging initialised");
    }
}
