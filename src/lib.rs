#![forbid(unsafe_code)]
//! tracebridge: run harness-generated test cases against instrumented code while collecting a trace.
//!
//! The crate provides two pieces of plumbing and the glue around them:
//!
//! - [`namespace`]: a dual-namespace resolver that prefers instrumented code units, falls back to
//!   origin units, and keeps unit identity stable across runs.
//! - [`observer`] + [`collector`]: a lifecycle state machine that installs the engine's collector
//!   only while a statement executes, parks an inert collector between statements, and disables
//!   collection at the end of a run.
//!
//! [`coordinator::Coordinator::run_one_test`] ties them together for one test case.
//!
//! ## Panic Policy
//!
//! This codebase follows explicit error handling:
//!
//! - **Production code**: Use `Result` or `Option` with `?` / `ok_or` / `map_err`. The `cli` module enforces
//!   `#![deny(clippy::unwrap_used)]`. Poisoned locks are recovered with `into_inner`; every guarded value is a
//!   plain state slot that stays consistent across a panic.
//!
//! - **Test code**: `.unwrap()` and `.expect()` are acceptable in tests.
//!
//! - **Harness panics**: A panic inside a statement or an executor is caught and reported (as
//!   [`harness::ExecutionFailure::Panic`] or an `Ok(None)` run), never propagated to the caller.

pub mod cli;
pub mod collector;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod harness;
pub mod namespace;
pub mod observer;
pub mod version;

pub use config::BridgeConfig;
pub use coordinator::Coordinator;
pub use error::{BridgeError, BridgeResult};
pub use tracebridge_core::{CodeUnit, LoadedUnit, NamespaceKind, QualifiedName, UnresolvedNameError};
