//! The trace observer: drives the collector proxy from harness lifecycle hooks.
//!
//! ```text
//!            before_statement              after_statement
//!   IDLE ───────────────────▶ ACTIVE ───────────────────▶ IDLE
//!     │                          │
//!     │ test_execution_finished  │ test_execution_finished (timeout path)
//!     ▼                          ▼
//!  DETACHED ◀────────────────────┘        clear: IDLE | DETACHED ─▶ IDLE
//! ```
//!
//! Proxy side effects:
//! - `attach`, called by the coordinator once it holds the run lock, installs the inert collector,
//! - entering ACTIVE installs the session's active collector,
//! - leaving ACTIVE for IDLE installs the inert collector,
//! - entering DETACHED disables the proxy.
//!
//! Construction and `clear` never touch the proxy, so an observer can be built while another run
//! owns it. Any other transition is a protocol violation. Violations never panic; the first one is kept and
//! the coordinator reports it once observers have been restored.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use thiserror::Error;

use crate::collector::{CollectorHandle, CollectorProxy, RunGuard};
use crate::engine::{EngineSession, NameMapperContext};
use crate::harness::{ExecutionFailure, ExecutionObserver, ExecutionResult, Scope, Statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverPhase {
    Idle,
    ActiveCollection,
    /// Terminal for the current run; only `clear` leaves it.
    Detached,
}

impl fmt::Display for ObserverPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObserverPhase::Idle => write!(f, "IDLE"),
            ObserverPhase::ActiveCollection => write!(f, "ACTIVE_COLLECTION"),
            ObserverPhase::Detached => write!(f, "DETACHED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObserverEvent {
    BeforeStatement,
    AfterStatement,
    ExecutionFinished,
    Clear,
}

impl fmt::Display for ObserverEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObserverEvent::BeforeStatement => write!(f, "before_statement"),
            ObserverEvent::AfterStatement => write!(f, "after_statement"),
            ObserverEvent::ExecutionFinished => write!(f, "test_execution_finished"),
            ObserverEvent::Clear => write!(f, "clear"),
        }
    }
}

/// A hook arrived in a phase that does not accept it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("illegal observer transition: {event} in phase {from}")]
pub struct TransitionError {
    pub from: ObserverPhase,
    pub event: ObserverEvent,
}

/// The observer could not be attached to a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AttachError {
    #[error("run lock belongs to a different collector proxy")]
    ForeignRun,

    #[error("observer must be IDLE to attach, found {0}")]
    NotIdle(ObserverPhase),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ObserverCounters {
    pub statements_started: usize,
    pub statements_finished: usize,
    pub finish_count: usize,
    /// Statement hooks that arrived after DETACHED and were ignored.
    pub late_hooks: usize,
}

struct State {
    phase: ObserverPhase,
    active: CollectorHandle,
    counters: ObserverCounters,
    violation: Option<TransitionError>,
}

/// Observer bound to one active/inert collector pair.
pub struct TraceObserver {
    session: Arc<dyn EngineSession>,
    proxy: Arc<CollectorProxy>,
    inert: CollectorHandle,
    state: Mutex<State>,
}

impl TraceObserver {
    /// Create an observer in IDLE with a fresh active collector. `proxy` is not written until
    /// [`TraceObserver::attach`].
    pub fn new(session: Arc<dyn EngineSession>, proxy: Arc<CollectorProxy>) -> Self {
        let active = session.new_collector(NameMapperContext::new());
        Self {
            session,
            proxy,
            inert: CollectorHandle::inert(),
            state: Mutex::new(State {
                phase: ObserverPhase::Idle,
                active,
                counters: ObserverCounters::default(),
                violation: None,
            }),
        }
    }

    /// Park the proxy on the inert collector for the run that holds `run`.
    pub fn attach(&self, run: &RunGuard<'_>) -> Result<(), AttachError> {
        if !run.guards(&self.proxy) {
            return Err(AttachError::ForeignRun);
        }
        let state = self.lock();
        if state.phase != ObserverPhase::Idle {
            return Err(AttachError::NotIdle(state.phase));
        }
        self.proxy.set_current(self.inert.clone());
        Ok(())
    }

    pub fn phase(&self) -> ObserverPhase {
        self.lock().phase
    }

    pub fn counters(&self) -> ObserverCounters {
        self.lock().counters
    }

    /// The first protocol violation seen by this observer, if any.
    pub fn violation(&self) -> Option<TransitionError> {
        self.lock().violation
    }

    pub fn active_collector(&self) -> CollectorHandle {
        self.lock().active.clone()
    }

    pub fn inert_collector(&self) -> CollectorHandle {
        self.inert.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn violate(state: &mut State, event: ObserverEvent) {
        let error = TransitionError {
            from: state.phase,
            event,
        };
        tracing::error!(%error, "observer protocol violation");
        state.violation.get_or_insert(error);
    }

    fn late(state: &mut State, event: ObserverEvent) {
        tracing::debug!(%event, "ignoring hook after detach");
        state.counters.late_hooks += 1;
    }
}

impl ExecutionObserver for TraceObserver {
    fn output(&self, position: usize, text: &str) {
        tracing::trace!(position, text, "statement output");
    }

    fn before_statement(&self, statement: &Statement, _scope: &Scope) {
        let mut state = self.lock();
        match state.phase {
            ObserverPhase::Idle => {
                state.phase = ObserverPhase::ActiveCollection;
                state.counters.statements_started += 1;
                self.proxy.set_current(state.active.clone());
                tracing::debug!(%statement, "collection started");
            }
            ObserverPhase::Detached => Self::late(&mut state, ObserverEvent::BeforeStatement),
            ObserverPhase::ActiveCollection => Self::violate(&mut state, ObserverEvent::BeforeStatement),
        }
    }

    fn after_statement(&self, statement: &Statement, _scope: &Scope, failure: Option<&ExecutionFailure>) {
        let mut state = self.lock();
        match state.phase {
            ObserverPhase::ActiveCollection => {
                state.phase = ObserverPhase::Idle;
                state.counters.statements_finished += 1;
                self.proxy.set_current(self.inert.clone());
                tracing::debug!(%statement, failed = failure.is_some(), "collection paused");
            }
            ObserverPhase::Detached => Self::late(&mut state, ObserverEvent::AfterStatement),
            ObserverPhase::Idle => Self::violate(&mut state, ObserverEvent::AfterStatement),
        }
    }

    fn test_execution_finished(&self, result: &ExecutionResult, _scope: &Scope) {
        let mut state = self.lock();
        match state.phase {
            ObserverPhase::Idle | ObserverPhase::ActiveCollection => {
                if state.phase == ObserverPhase::ActiveCollection {
                    tracing::debug!(test = %result.test_name, "finished while a statement was still collecting");
                }
                state.phase = ObserverPhase::Detached;
                state.counters.finish_count += 1;
                self.proxy.clear_current();
            }
            ObserverPhase::Detached => Self::violate(&mut state, ObserverEvent::ExecutionFinished),
        }
    }

    fn clear(&self) {
        let mut state = self.lock();
        match state.phase {
            ObserverPhase::Idle | ObserverPhase::Detached => {
                state.active = self.session.new_collector(NameMapperContext::new());
                state.phase = ObserverPhase::Idle;
                state.counters = ObserverCounters::default();
            }
            ObserverPhase::ActiveCollection => Self::violate(&mut state, ObserverEvent::Clear),
        }
    }
}

impl fmt::Debug for TraceObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.lock();
        f.debug_struct("TraceObserver")
            .field("phase", &state.phase)
            .field("counters", &state.counters)
            .field("violation", &state.violation)
            .finish_non_exhaustive()
    }
}
