//! tracebridge version information.
//!
//! Taken from Cargo metadata (`CARGO_PKG_VERSION`) at compile time so the CLI and log lines agree on
//! the same value.

/// The tracebridge version string (for example, `0.1.0`).
pub const TRACEBRIDGE_VERSION: &str = env!("CARGO_PKG_VERSION");
