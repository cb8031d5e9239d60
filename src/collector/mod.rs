//! Trace collectors and the handles used to swap them.
//!
//! The core never interprets what a collector records. It only decides which collector is current:
//! the session's active collector while a statement runs, the inert [`EmptyCollector`] between
//! statements, and nothing at all once a run has finished (see [`CollectorProxy`]).

mod proxy;

pub use proxy::{CollectorProxy, CollectorSlot, RunGuard};

use std::fmt;
use std::sync::Arc;

use tracebridge_core::QualifiedName;

/// A runtime signal emitted by instrumented code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceEvent {
    /// Unit whose instrumented code emitted the event.
    pub unit: QualifiedName,
    /// Free-form site label (`<init>`, a method name, ...).
    pub site: String,
    /// Statement position inside the running test case.
    pub position: usize,
}

impl TraceEvent {
    pub fn new(unit: QualifiedName, site: impl Into<String>, position: usize) -> Self {
        Self {
            unit,
            site: site.into(),
            position,
        }
    }
}

/// Engine-side sink for trace events.
pub trait TraceCollector: Send + Sync {
    fn collect(&self, event: TraceEvent);

    /// Number of events retained so far.
    fn event_count(&self) -> usize;

    /// Whether this collector discards everything.
    fn is_inert(&self) -> bool {
        false
    }
}

/// Discards every event.
#[derive(Debug, Default)]
pub struct EmptyCollector;

impl TraceCollector for EmptyCollector {
    fn collect(&self, _event: TraceEvent) {}

    fn event_count(&self) -> usize {
        0
    }

    fn is_inert(&self) -> bool {
        true
    }
}

/// Shared reference to a collector. Equality is identity.
#[derive(Clone)]
pub struct CollectorHandle(Arc<dyn TraceCollector>);

impl CollectorHandle {
    pub fn new(collector: impl TraceCollector + 'static) -> Self {
        Self(Arc::new(collector))
    }

    pub fn from_arc(collector: Arc<dyn TraceCollector>) -> Self {
        Self(collector)
    }

    /// A fresh inert handle.
    pub fn inert() -> Self {
        Self::new(EmptyCollector)
    }

    /// Whether both handles point at the same collector.
    pub fn same(&self, other: &CollectorHandle) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.0), Arc::as_ptr(&other.0))
    }

    pub fn collect(&self, event: TraceEvent) {
        self.0.collect(event);
    }

    pub fn event_count(&self) -> usize {
        self.0.event_count()
    }

    pub fn is_inert(&self) -> bool {
        self.0.is_inert()
    }
}

impl PartialEq for CollectorHandle {
    fn eq(&self, other: &Self) -> bool {
        self.same(other)
    }
}

impl Eq for CollectorHandle {}

impl fmt::Debug for CollectorHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectorHandle")
            .field("ptr", &Arc::as_ptr(&self.0).cast::<()>())
            .field("inert", &self.is_inert())
            .field("events", &self.event_count())
            .finish()
    }
}
