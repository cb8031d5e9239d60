//! Trace-engine session capability.
//!
//! An engine session is created once per target program and outlives every test run. The
//! coordinator only ever asks it for a fresh collector; what the collector does with the events is
//! the engine's business.
//!
//! [`RecordingSession`] is the in-process reference engine used by the CLI and the test suite. Its
//! collectors keep every event they receive so a run's trace can be inspected afterwards; the
//! session itself only retains the most recent collectors.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tracebridge_core::QualifiedName;

use crate::collector::{CollectorHandle, TraceCollector, TraceEvent};

/// Engine-owned naming context handed to each new collector. Opaque to the bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NameMapperContext {
    _opaque: (),
}

impl NameMapperContext {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Long-lived engine context bound to one target program.
pub trait EngineSession: Send + Sync {
    /// The target unit this session was launched for.
    fn target(&self) -> &QualifiedName;

    /// Construct a collector bound to this session.
    fn new_collector(&self, names: NameMapperContext) -> CollectorHandle;
}

// ============================================================================
// Recording engine
// ============================================================================

/// Collector that keeps every event, in arrival order.
#[derive(Debug, Default)]
pub struct RecordingCollector {
    names: NameMapperContext,
    events: Mutex<Vec<TraceEvent>>,
}

impl RecordingCollector {
    pub fn new(names: NameMapperContext) -> Self {
        Self {
            names,
            events: Mutex::new(Vec::new()),
        }
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn names(&self) -> &NameMapperContext {
        &self.names
    }
}

impl TraceCollector for RecordingCollector {
    fn collect(&self, event: TraceEvent) {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).push(event);
    }

    fn event_count(&self) -> usize {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

/// Collectors a [`RecordingSession`] keeps unless told otherwise.
pub const DEFAULT_RETAINED_COLLECTORS: usize = 64;

#[derive(Debug, Default)]
struct Collectors {
    retained: VecDeque<Arc<RecordingCollector>>,
    created: usize,
}

/// In-process engine session that hands out [`RecordingCollector`]s.
///
/// Only the newest `retention` collectors are kept; older traces are dropped as new runs start.
#[derive(Debug)]
pub struct RecordingSession {
    classpath: Vec<PathBuf>,
    target: QualifiedName,
    retention: usize,
    collectors: Mutex<Collectors>,
}

impl RecordingSession {
    pub fn launch(classpath: Vec<PathBuf>, target: QualifiedName) -> Self {
        tracing::info!(target_unit = %target, classpath_len = classpath.len(), "engine session launched");
        Self {
            classpath,
            target,
            retention: DEFAULT_RETAINED_COLLECTORS,
            collectors: Mutex::new(Collectors::default()),
        }
    }

    /// Keep at most `limit` collectors (at least one).
    pub fn with_retention(mut self, limit: usize) -> Self {
        self.retention = limit.max(1);
        self
    }

    pub fn classpath(&self) -> &[PathBuf] {
        &self.classpath
    }

    /// Retained collectors, oldest first.
    pub fn collectors(&self) -> Vec<Arc<RecordingCollector>> {
        self.lock().retained.iter().cloned().collect()
    }

    /// Collectors created over the session's lifetime, including dropped ones.
    pub fn collector_count(&self) -> usize {
        self.lock().created
    }

    /// Events of the most recently created collector.
    pub fn latest_trace(&self) -> Vec<TraceEvent> {
        self.lock().retained.back().map(|c| c.events()).unwrap_or_default()
    }

    fn lock(&self) -> MutexGuard<'_, Collectors> {
        self.collectors.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl EngineSession for RecordingSession {
    fn target(&self) -> &QualifiedName {
        &self.target
    }

    fn new_collector(&self, names: NameMapperContext) -> CollectorHandle {
        let collector = Arc::new(RecordingCollector::new(names));
        let mut collectors = self.lock();
        collectors.created += 1;
        collectors.retained.push_back(Arc::clone(&collector));
        while collectors.retained.len() > self.retention {
            collectors.retained.pop_front();
        }
        CollectorHandle::from_arc(collector)
    }
}
