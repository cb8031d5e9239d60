//! Process-wide "current collector" slot.
//!
//! Instrumented code has no parameter through which a collector could be passed, so it asks the
//! proxy. The slot is deliberately ambient: any thread may read it, and the coordinator is the only
//! writer while it holds the run lock.

use std::sync::{Arc, LazyLock, Mutex, MutexGuard, RwLock, TryLockError};

use super::{CollectorHandle, TraceEvent};

static GLOBAL: LazyLock<Arc<CollectorProxy>> = LazyLock::new(|| Arc::new(CollectorProxy::new()));

/// Contents of the proxy slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CollectorSlot {
    /// Instrumentation hooks are fully inactive.
    Disabled,
    /// Events go to this collector (which may itself be inert).
    Installed(CollectorHandle),
}

/// Single guarded slot plus the single-run-at-a-time lock.
#[derive(Debug)]
pub struct CollectorProxy {
    slot: RwLock<CollectorSlot>,
    run_lock: Mutex<()>,
}

/// Held for the full lifecycle of one test run.
#[derive(Debug)]
pub struct RunGuard<'a> {
    proxy: &'a CollectorProxy,
    _guard: MutexGuard<'a, ()>,
}

impl RunGuard<'_> {
    /// Whether this guard holds `proxy`'s run lock.
    pub fn guards(&self, proxy: &CollectorProxy) -> bool {
        std::ptr::eq(self.proxy, proxy)
    }
}

impl CollectorProxy {
    /// A proxy that starts out disabled.
    pub fn new() -> Self {
        Self {
            slot: RwLock::new(CollectorSlot::Disabled),
            run_lock: Mutex::new(()),
        }
    }

    /// The proxy read by instrumented code in this process.
    pub fn global() -> Arc<CollectorProxy> {
        Arc::clone(&GLOBAL)
    }

    pub fn set_current(&self, handle: CollectorHandle) {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = CollectorSlot::Installed(handle);
    }

    /// Switch to [`CollectorSlot::Disabled`], which is distinct from installing an inert handle.
    pub fn clear_current(&self) {
        *self.slot.write().unwrap_or_else(|e| e.into_inner()) = CollectorSlot::Disabled;
    }

    pub fn slot(&self) -> CollectorSlot {
        self.slot.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn current(&self) -> Option<CollectorHandle> {
        match self.slot() {
            CollectorSlot::Installed(handle) => Some(handle),
            CollectorSlot::Disabled => None,
        }
    }

    pub fn is_disabled(&self) -> bool {
        matches!(self.slot(), CollectorSlot::Disabled)
    }

    pub fn is_current(&self, handle: &CollectorHandle) -> bool {
        self.current().is_some_and(|current| current.same(handle))
    }

    /// Deliver `event` to the current collector. Returns `false` when the proxy is disabled.
    ///
    /// The slot lock is released before the collector runs.
    pub fn record(&self, event: TraceEvent) -> bool {
        match self.current() {
            Some(handle) => {
                handle.collect(event);
                true
            }
            None => false,
        }
    }

    /// Block until no other run holds the proxy.
    pub fn begin_run(&self) -> RunGuard<'_> {
        RunGuard {
            proxy: self,
            _guard: self.run_lock.lock().unwrap_or_else(|e| e.into_inner()),
        }
    }

    /// Like [`CollectorProxy::begin_run`], but returns `None` instead of waiting.
    pub fn try_begin_run(&self) -> Option<RunGuard<'_>> {
        match self.run_lock.try_lock() {
            Ok(guard) => Some(RunGuard {
                proxy: self,
                _guard: guard,
            }),
            Err(TryLockError::Poisoned(e)) => Some(RunGuard {
                proxy: self,
                _guard: e.into_inner(),
            }),
            Err(TryLockError::WouldBlock) => None,
        }
    }
}

impl Default for CollectorProxy {
    fn default() -> Self {
        Self::new()
    }
}
