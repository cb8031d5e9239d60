//! Dual-namespace resolution with an identity cache.
//!
//! Resolution order is fixed: cache, then the instrumented namespace, then the origin namespace. Both
//! namespaces are held directly by the resolver; neither delegates to the other, so there is no parent
//! chain that could loop back into the resolver.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracebridge_core::{LoadError, LoadedUnit, NameError, NamespaceKind, QualifiedName, UnresolvedNameError};

use super::Namespace;

/// Why a name could not be resolved.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error(transparent)]
    InvalidName(#[from] NameError),

    #[error(transparent)]
    Unresolved(#[from] UnresolvedNameError),

    /// A namespace failed for a reason other than "not found"; fallback is not attempted.
    #[error(transparent)]
    Load(#[from] LoadError),
}

/// Snapshot of resolver counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResolverStats {
    /// Resolutions answered from the cache.
    pub hits: u64,
    /// Resolutions that had to consult the namespaces.
    pub misses: u64,
    /// Units supplied by the instrumented namespace.
    pub instrumented: u64,
    /// Units supplied by the origin namespace.
    pub origin: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    instrumented: AtomicU64,
    origin: AtomicU64,
}

/// Resolves qualified names against an instrumented namespace first and an origin namespace second.
///
/// Once a name resolves, every later resolution of that name returns the same [`LoadedUnit`]
/// (`Arc::ptr_eq`), which keeps unit identity stable across statements and across test runs.
pub struct NamespaceResolver {
    instrumented: Box<dyn Namespace>,
    origin: Box<dyn Namespace>,
    cache: Mutex<HashMap<QualifiedName, LoadedUnit>>,
    counters: Counters,
}

impl NamespaceResolver {
    pub fn new(instrumented: impl Namespace + 'static, origin: impl Namespace + 'static) -> Self {
        Self {
            instrumented: Box::new(instrumented),
            origin: Box::new(origin),
            cache: Mutex::new(HashMap::new()),
            counters: Counters::default(),
        }
    }

    /// Parse `raw` and resolve it.
    pub fn resolve(&self, raw: &str) -> Result<LoadedUnit, ResolveError> {
        let name = QualifiedName::parse(raw)?;
        self.resolve_name(&name)
    }

    /// Resolve an already-validated name.
    ///
    /// The cache lock is held across the namespace lookups so two threads racing on the same miss
    /// still observe a single unit.
    #[tracing::instrument(skip_all, fields(name = %name))]
    pub fn resolve_name(&self, name: &QualifiedName) -> Result<LoadedUnit, ResolveError> {
        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(unit) = cache.get(name) {
            self.counters.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(Arc::clone(unit));
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let unit = match self.instrumented.load(name) {
            Ok(unit) => unit,
            Err(e) if e.is_not_found() => {
                tracing::debug!("not instrumented, falling back to origin");
                match self.origin.load(name) {
                    Ok(unit) => unit,
                    Err(e) if e.is_not_found() => {
                        tracing::debug!("unresolved in both namespaces");
                        return Err(UnresolvedNameError { name: name.clone() }.into());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        };

        match unit.origin {
            NamespaceKind::Instrumented => self.counters.instrumented.fetch_add(1, Ordering::Relaxed),
            NamespaceKind::Origin => self.counters.origin.fetch_add(1, Ordering::Relaxed),
        };

        cache.insert(name.clone(), Arc::clone(&unit));
        Ok(unit)
    }

    /// The cached unit for `name`, without consulting any namespace.
    pub fn cached(&self, name: &QualifiedName) -> Option<LoadedUnit> {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).get(name).cloned()
    }

    pub fn cached_len(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn stats(&self) -> ResolverStats {
        ResolverStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            instrumented: self.counters.instrumented.load(Ordering::Relaxed),
            origin: self.counters.origin.load(Ordering::Relaxed),
        }
    }
}

impl std::fmt::Debug for NamespaceResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceResolver")
            .field("cached", &self.cached_len())
            .field("stats", &self.stats())
            .finish()
    }
}
