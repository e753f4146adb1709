//! Tracing/logging setup shared by binaries and tests.

pub mod tracing;

pub use tracing::{init, init_for_tests};
