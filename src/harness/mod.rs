//! Harness-facing capabilities.
//!
//! The coordinator consumes three things from a test harness:
//! - a [`TestCase`] whose name resolution can be rebound to a [`NamespaceResolver`],
//! - a [`TestExecutor`] that runs a test case while notifying installed observers,
//! - read/replace access to the executor's [`ObserverSet`].
//!
//! [`InProcessExecutor`] and [`ScriptedTestCase`] are the reference harness used by the CLI and the
//! test suite.

mod executor;
mod scripted;

pub use executor::InProcessExecutor;
pub(crate) use executor::panic_message;
pub use scripted::{ScriptError, ScriptedTestCase, Statement};

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracebridge_core::{LoadedUnit, UnresolvedNameError};

use crate::collector::CollectorProxy;
use crate::namespace::NamespaceResolver;

// ============================================================================
// Observer capability
// ============================================================================

/// Lifecycle hooks the executor invokes while running a test case.
///
/// Hooks take `&self`; implementations that keep state use interior mutability.
pub trait ExecutionObserver: Send + Sync {
    /// Text printed by the statement at `position`.
    fn output(&self, position: usize, text: &str);

    fn before_statement(&self, statement: &Statement, scope: &Scope);

    /// Fires after every statement that started, including the one that failed.
    fn after_statement(&self, statement: &Statement, scope: &Scope, failure: Option<&ExecutionFailure>);

    /// Fires exactly once per execution, on every exit path.
    fn test_execution_finished(&self, result: &ExecutionResult, scope: &Scope);

    /// Reset per-session state so the observer can be reused.
    fn clear(&self);
}

/// Ordered set of observers. Two sets are equal iff they hold the same observers in the same order.
#[derive(Clone, Default)]
pub struct ObserverSet(Vec<Arc<dyn ExecutionObserver>>);

impl ObserverSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(observer: Arc<dyn ExecutionObserver>) -> Self {
        Self(vec![observer])
    }

    pub fn push(&mut self, observer: Arc<dyn ExecutionObserver>) {
        self.0.push(observer);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn ExecutionObserver>> {
        self.0.iter()
    }
}

impl PartialEq for ObserverSet {
    fn eq(&self, other: &Self) -> bool {
        self.0.len() == other.0.len()
            && self
                .0
                .iter()
                .zip(&other.0)
                .all(|(a, b)| std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)))
    }
}

impl Eq for ObserverSet {}

impl fmt::Debug for ObserverSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.0.iter().map(|o| Arc::as_ptr(o).cast::<()>()))
            .finish()
    }
}

// ============================================================================
// Test case capability
// ============================================================================

/// A runnable test case.
pub trait TestCase: Send {
    fn name(&self) -> &str;

    fn statements(&self) -> &[Statement];

    /// Rebind how class references inside this test case are resolved.
    fn change_resolver(&mut self, resolver: Arc<NamespaceResolver>);

    fn resolver(&self) -> Option<Arc<NamespaceResolver>>;

    /// Rebind the proxy that instrumented code executed by this test case reports to.
    fn change_proxy(&mut self, proxy: Arc<CollectorProxy>);

    fn proxy(&self) -> Arc<CollectorProxy>;
}

/// Units bound by statements that have executed so far, keyed by statement position.
#[derive(Debug, Clone, Default)]
pub struct Scope {
    bindings: Vec<(usize, LoadedUnit)>,
}

impl Scope {
    pub fn bind(&mut self, position: usize, unit: LoadedUnit) {
        self.bindings.push((position, unit));
    }

    pub fn get(&self, position: usize) -> Option<&LoadedUnit> {
        self.bindings.iter().find(|(p, _)| *p == position).map(|(_, unit)| unit)
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

// ============================================================================
// Results and failures
// ============================================================================

/// Why a test execution did not complete normally. Reported inside [`ExecutionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionFailure {
    #[error("statement {position} failed: {message}")]
    Statement { position: usize, message: String },

    #[error("statement {position}: {error}")]
    Unresolved {
        position: usize,
        #[source]
        error: UnresolvedNameError,
    },

    #[error("statement {position}: resolution failed: {message}")]
    Resolution { position: usize, message: String },

    #[error("test case timed out after {}ms", .after.as_millis())]
    Timeout { after: Duration },

    #[error("panic{}: {message}", .position.map(|p| format!(" in statement {p}")).unwrap_or_default())]
    Panic { position: Option<usize>, message: String },
}

/// Outcome of one test-case execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionResult {
    pub test_name: String,
    /// Statements that started executing.
    pub executed: usize,
    /// `(position, text)` for every output statement.
    pub outputs: Vec<(usize, String)>,
    pub failure: Option<ExecutionFailure>,
    pub elapsed: Duration,
}

impl ExecutionResult {
    pub fn new(test_name: impl Into<String>) -> Self {
        Self {
            test_name: test_name.into(),
            executed: 0,
            outputs: Vec::new(),
            failure: None,
            elapsed: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    pub fn timed_out(&self) -> bool {
        matches!(self.failure, Some(ExecutionFailure::Timeout { .. }))
    }

    pub fn unresolved(&self) -> Option<&UnresolvedNameError> {
        match &self.failure {
            Some(ExecutionFailure::Unresolved { error, .. }) => Some(error),
            _ => None,
        }
    }
}

/// Executor-level failure, as opposed to a failure of the test case itself.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("invalid timeout: {0:?}")]
    InvalidTimeout(Duration),

    #[error("failed to start executor runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("observer set could not be replaced: {0}")]
    ObserverSet(String),
}

// ============================================================================
// Executor capability
// ============================================================================

/// Runs test cases and owns the observer set notified during execution.
pub trait TestExecutor: Send + Sync {
    /// Execute `test`, notifying the installed observers. Test-case failures (including timeouts) are
    /// reported in the returned result; `Err` is reserved for the executor itself failing.
    fn execute(&self, test: &mut dyn TestCase, timeout: Duration) -> Result<ExecutionResult, HarnessError>;

    fn observers(&self) -> ObserverSet;

    fn set_observers(&self, observers: ObserverSet) -> Result<(), HarnessError>;
}
