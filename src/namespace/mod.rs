//! Code-unit namespaces and the dual-namespace resolver.
//!
//! A [`Namespace`] loads a single named unit or reports that it does not have it. The
//! [`NamespaceResolver`] composes two of them (instrumented first, origin second) behind an identity
//! cache.
//!
//! ## Backends
//!
//! - [`DirectoryNamespace`]: one directory, `a.b.C` ↦ `<root>/a/b/C.class`
//! - [`ClasspathNamespace`]: an ordered list of directories, first hit wins
//! - [`MemoryNamespace`]: an in-process registry of units that are already loaded

mod resolver;

pub use resolver::{NamespaceResolver, ResolveError, ResolverStats};

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};

use tracebridge_core::{CodeUnit, LoadError, LoadedUnit, NamespaceKind, QualifiedName};

/// File extension of compiled units inside a namespace directory.
pub const UNIT_EXTENSION: &str = "class";

/// Load a named code unit by name.
pub trait Namespace: Send + Sync {
    /// Which side of the resolver this namespace is meant to sit on.
    fn kind(&self) -> NamespaceKind;

    /// Load `name`, or return [`LoadError::NotFound`] if this namespace does not contain it.
    fn load(&self, name: &QualifiedName) -> Result<LoadedUnit, LoadError>;
}

/// Map a qualified name to its file below `root`.
pub fn unit_path(root: &Path, name: &QualifiedName) -> PathBuf {
    let mut path = root.to_path_buf();
    for segment in name.segments() {
        path.push(segment);
    }
    path.set_extension(UNIT_EXTENSION);
    path
}

fn read_unit(root: &Path, name: &QualifiedName, kind: NamespaceKind) -> Result<LoadedUnit, LoadError> {
    let path = unit_path(root, name);
    let definition = match fs::read(&path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Err(LoadError::not_found(name, kind)),
        Err(source) => {
            return Err(LoadError::Io {
                name: name.clone(),
                path,
                source,
            });
        }
    };

    if definition.is_empty() {
        return Err(LoadError::Malformed {
            name: name.clone(),
            reason: format!("{} is empty", path.display()),
        });
    }

    Ok(Arc::new(CodeUnit::new(name.clone(), kind, definition)))
}

// ============================================================================
// Directory-backed namespace
// ============================================================================

/// A namespace rooted at a single directory (typically the instrumented-code output directory).
#[derive(Debug, Clone)]
pub struct DirectoryNamespace {
    root: PathBuf,
    kind: NamespaceKind,
}

impl DirectoryNamespace {
    pub fn instrumented(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            kind: NamespaceKind::Instrumented,
        }
    }

    pub fn origin(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            kind: NamespaceKind::Origin,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl Namespace for DirectoryNamespace {
    fn kind(&self) -> NamespaceKind {
        self.kind
    }

    fn load(&self, name: &QualifiedName) -> Result<LoadedUnit, LoadError> {
        read_unit(&self.root, name, self.kind)
    }
}

// ============================================================================
// Classpath namespace
// ============================================================================

/// A namespace spanning several directories, searched in order.
#[derive(Debug, Clone)]
pub struct ClasspathNamespace {
    entries: Vec<PathBuf>,
    kind: NamespaceKind,
}

impl ClasspathNamespace {
    pub fn new(entries: impl IntoIterator<Item = PathBuf>, kind: NamespaceKind) -> Self {
        Self {
            entries: entries.into_iter().collect(),
            kind,
        }
    }

    pub fn entries(&self) -> &[PathBuf] {
        &self.entries
    }
}

impl Namespace for ClasspathNamespace {
    fn kind(&self) -> NamespaceKind {
        self.kind
    }

    fn load(&self, name: &QualifiedName) -> Result<LoadedUnit, LoadError> {
        for entry in &self.entries {
            match read_unit(entry, name, self.kind) {
                Err(e) if e.is_not_found() => continue,
                other => return other,
            }
        }
        Err(LoadError::not_found(name, self.kind))
    }
}

// ============================================================================
// In-memory namespace
// ============================================================================

/// Units already present in the surrounding process.
///
/// Repeated loads of the same name hand out the same `Arc`.
#[derive(Debug)]
pub struct MemoryNamespace {
    kind: NamespaceKind,
    units: RwLock<HashMap<QualifiedName, LoadedUnit>>,
}

impl MemoryNamespace {
    pub fn new(kind: NamespaceKind) -> Self {
        Self {
            kind,
            units: RwLock::new(HashMap::new()),
        }
    }

    /// Register a unit; replaces any earlier unit with the same name.
    pub fn define(&self, name: QualifiedName, definition: impl Into<Vec<u8>>) -> LoadedUnit {
        let unit = Arc::new(CodeUnit::new(name.clone(), self.kind, definition));
        let mut units = self.units.write().unwrap_or_else(|e| e.into_inner());
        units.insert(name, Arc::clone(&unit));
        unit
    }

    /// Builder-style [`MemoryNamespace::define`].
    pub fn with_unit(self, name: QualifiedName, definition: impl Into<Vec<u8>>) -> Self {
        self.define(name, definition);
        self
    }

    pub fn len(&self) -> usize {
        self.units.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Namespace for MemoryNamespace {
    fn kind(&self) -> NamespaceKind {
        self.kind
    }

    fn load(&self, name: &QualifiedName) -> Result<LoadedUnit, LoadError> {
        self.units
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::not_found(name, self.kind))
    }
}

impl<N: Namespace + ?Sized> Namespace for Arc<N> {
    fn kind(&self) -> NamespaceKind {
        (**self).kind()
    }

    fn load(&self, name: &QualifiedName) -> Result<LoadedUnit, LoadError> {
        (**self).load(name)
    }
}
