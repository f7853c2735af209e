//! Shared test support for the block index crates.
#![warn(missing_docs)]

use std::sync::Once;

use tracing_subscriber::EnvFilter;

pub mod cipher;
pub mod tracing;

pub use cipher::{InMemoryKeyStore, Sha256Cipher, TestCipherError, TestCipherProvider};

static LOG_SETUP: Once = Once::new();

/// Installs a global fmt subscriber filtered by `RUST_LOG`, if that variable is set.
///
/// Safe to call from every test: only the first call has an effect.
pub fn maybe_start_logging() {
    if std::env::var("RUST_LOG").is_ok() {
        start_logging()
    }
}

/// Installs a global fmt subscriber filtered by `RUST_LOG` (default `debug`).
pub fn start_logging() {
    LOG_SETUP.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"));
        // another harness may already own the global subscriber
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// Asserts that `$actual` contains `$expected`, printing both otherwise.
#[macro_export]
macro_rules! assert_contains {
    ($actual: expr, $expected: expr) => {
        let actual_value: String = $actual.into();
        let expected_value: String = $expected.into();
        assert!(
            actual_value.contains(&expected_value),
            "Can not find expected in actual.\n\nExpected:\n{}\n\nActual:\n{}",
            expected_value,
            actual_value
        );
    };
}

/// Asserts that `$actual` does not contain `$unexpected`, printing both otherwise.
#[macro_export]
macro_rules! assert_not_contains {
    ($actual: expr, $unexpected: expr) => {
        let actual_value: String = $actual.into();
        let unexpected_value: String = $unexpected.into();
        assert!(
            !actual_value.contains(&unexpected_value),
            "Found unexpected in actual.\n\nUnexpected:\n{}\n\nActual:\n{}",
            unexpected_value,
            actual_value
        );
    };
}
