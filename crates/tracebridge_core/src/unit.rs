//! Loaded code units and the namespaces they come from.

use std::fmt;
use std::sync::Arc;

use crate::names::QualifiedName;

/// Which namespace supplied a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NamespaceKind {
    /// Units rewritten to emit runtime signals for the trace engine.
    Instrumented,
    /// Units as already loaded by the surrounding process.
    Origin,
}

impl fmt::Display for NamespaceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamespaceKind::Instrumented => write!(f, "instrumented"),
            NamespaceKind::Origin => write!(f, "origin"),
        }
    }
}

/// A named unit of code together with its raw definition bytes.
#[derive(Debug, PartialEq, Eq)]
pub struct CodeUnit {
    pub name: QualifiedName,
    pub origin: NamespaceKind,
    pub definition: Vec<u8>,
}

impl CodeUnit {
    pub fn new(name: QualifiedName, origin: NamespaceKind, definition: impl Into<Vec<u8>>) -> Self {
        Self {
            name,
            origin,
            definition: definition.into(),
        }
    }

    /// Whether this unit emits trace signals when executed.
    pub fn is_instrumented(&self) -> bool {
        self.origin == NamespaceKind::Instrumented
    }
}

/// Shared handle to a loaded unit. Two handles denote the same unit iff `Arc::ptr_eq` holds.
pub type LoadedUnit = Arc<CodeUnit>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_instrumented_flag_follows_origin() {
        let name = QualifiedName::parse("a.B").unwrap();
        assert!(CodeUnit::new(name.clone(), NamespaceKind::Instrumented, b"x".to_vec()).is_instrumented());
        assert!(!CodeUnit::new(name, NamespaceKind::Origin, b"x".to_vec()).is_instrumented());
    }

    #[test]
    fn test_namespace_kind_display() {
        assert_eq!(NamespaceKind::Instrumented.to_string(), "instrumented");
        assert_eq!(NamespaceKind::Origin.to_string(), "origin");
    }
}
