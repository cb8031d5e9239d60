//! Provide the shared vocabulary used by every layer of the tracebridge workspace.
//!
//! This crate is intentionally small and dependency-light. It contains the value types that both:
//! - the namespace resolver uses to look up and cache code units, and
//! - the harness/engine adapters use to describe what was loaded and from where.
//!
//! ## Notes
//!
//! - This is a “vocabulary” crate: **no IO**, no global state, and no knowledge of collectors or executors.
//! - Identity of a loaded unit is the identity of its `Arc<CodeUnit>`; equality of names is structural.

pub mod errors;
pub mod names;
pub mod unit;

pub use errors::{LoadError, NameError, UnresolvedNameError};
pub use names::QualifiedName;
pub use unit::{CodeUnit, LoadedUnit, NamespaceKind};
