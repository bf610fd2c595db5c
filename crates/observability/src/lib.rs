//! Process-wide tracing setup shared by binaries and tests.

pub mod tracing;

pub use crate::tracing::TracingConfig;

/// Install the JSON subscriber with `RUST_LOG` filtering (default `info`).
///
/// Safe to call multiple times; later calls are no-ops.
pub fn init() {
    crate::tracing::init(&TracingConfig::default());
}
