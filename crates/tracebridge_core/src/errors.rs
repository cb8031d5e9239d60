//! Errors shared by namespace backends, the resolver, and the harness.

use std::path::PathBuf;

use thiserror::Error;

use crate::names::QualifiedName;
use crate::unit::NamespaceKind;

/// A string could not be turned into a [`QualifiedName`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NameError {
    #[error("qualified name is empty")]
    Empty,

    #[error("qualified name '{name}' contains an empty segment")]
    EmptySegment { name: String },

    /// A segment holds something other than identifier characters, or starts with a digit.
    #[error("qualified name '{name}' contains invalid character {ch:?}")]
    InvalidCharacter { name: String, ch: char },
}

/// Failure of a single namespace to load a unit.
///
/// Only [`LoadError::NotFound`] lets a resolver move on to its fallback namespace.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("'{name}' not found in {namespace} namespace")]
    NotFound {
        name: QualifiedName,
        namespace: NamespaceKind,
    },

    #[error("failed to read '{name}' from {}: {source}", .path.display())]
    Io {
        name: QualifiedName,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("'{name}' is malformed: {reason}")]
    Malformed { name: QualifiedName, reason: String },
}

impl LoadError {
    pub fn not_found(name: &QualifiedName, namespace: NamespaceKind) -> Self {
        LoadError::NotFound {
            name: name.clone(),
            namespace,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, LoadError::NotFound { .. })
    }
}

/// Neither the instrumented nor the origin namespace could supply a name.
///
/// Fatal to the test run that asked for it; surfaced in that run's execution result.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unresolved name '{name}': not present in the instrumented or origin namespace")]
pub struct UnresolvedNameError {
    pub name: QualifiedName,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_is_not_found() {
        let name = QualifiedName::parse("a.B").unwrap();
        let err = LoadError::not_found(&name, NamespaceKind::Instrumented);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "'a.B' not found in instrumented namespace");
    }

    #[test]
    fn test_malformed_is_not_not_found() {
        let err = LoadError::Malformed {
            name: QualifiedName::parse("a.B").unwrap(),
            reason: "empty definition".to_string(),
        };
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_unresolved_display_names_the_unit() {
        let err = UnresolvedNameError {
            name: QualifiedName::parse("x.Missing").unwrap(),
        };
        assert!(err.to_string().contains("'x.Missing'"));
    }
}
