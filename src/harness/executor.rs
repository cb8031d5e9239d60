//! In-process executor.
//!
//! Statements run on a blocking worker owned by a private tokio runtime; the calling thread waits on
//! the worker with a deadline. When the deadline passes the worker is told to stop at its next
//! statement boundary (a sleeping statement wakes within one slice), and the executor waits for it
//! to exit before reporting the timeout. No hook or trace event of a run outlives `execute`.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tokio::runtime::Runtime;
use tracebridge_core::LoadedUnit;

use super::{ExecutionFailure, ExecutionResult, HarnessError, ObserverSet, Scope, Statement, TestCase, TestExecutor};
use crate::collector::{CollectorProxy, TraceEvent};
use crate::namespace::{NamespaceResolver, ResolveError};

/// Granularity at which a sleeping statement checks for cancellation.
const SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Executes test cases on a worker thread with a per-execution deadline.
pub struct InProcessExecutor {
    runtime: Runtime,
    observers: RwLock<ObserverSet>,
}

impl InProcessExecutor {
    pub fn new() -> Result<Self, HarnessError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("tracebridge-executor")
            .enable_time()
            .build()
            .map_err(HarnessError::Runtime)?;
        Ok(Self {
            runtime,
            observers: RwLock::new(ObserverSet::new()),
        })
    }
}

impl std::fmt::Debug for InProcessExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InProcessExecutor")
            .field("observers", &self.observers())
            .finish_non_exhaustive()
    }
}

impl TestExecutor for InProcessExecutor {
    fn execute(&self, test: &mut dyn TestCase, timeout: Duration) -> Result<ExecutionResult, HarnessError> {
        if timeout.is_zero() {
            return Err(HarnessError::InvalidTimeout(timeout));
        }

        let observers = self.observers();
        let cancelled = Arc::new(AtomicBool::new(false));
        let progress = Arc::new(AtomicUsize::new(0));
        let name = test.name().to_string();
        let worker = Worker {
            name: name.clone(),
            statements: test.statements().to_vec(),
            resolver: test.resolver(),
            proxy: test.proxy(),
            observers: observers.clone(),
            cancelled: Arc::clone(&cancelled),
            progress: Arc::clone(&progress),
        };

        let started = Instant::now();
        let outcome = self.runtime.block_on(async move {
            let mut handle = tokio::task::spawn_blocking(move || worker.run());
            match tokio::time::timeout(timeout, &mut handle).await {
                Ok(joined) => Some(joined),
                Err(_elapsed) => {
                    cancelled.store(true, Ordering::Release);
                    if let Err(error) = handle.await {
                        tracing::warn!(%error, "timed-out worker did not exit cleanly");
                    }
                    None
                }
            }
        });

        let (mut result, scope) = match outcome {
            Some(Ok(finished)) => finished,
            Some(Err(join)) => {
                // An observer hook panicked outside a statement.
                let message = match join.try_into_panic() {
                    Ok(payload) => panic_message(payload.as_ref()),
                    Err(join) => join.to_string(),
                };
                let mut result = ExecutionResult::new(name);
                result.executed = progress.load(Ordering::Acquire);
                result.failure = Some(ExecutionFailure::Panic { position: None, message });
                (result, Scope::default())
            }
            None => {
                tracing::warn!(test = %name, ?timeout, "test case timed out");
                let mut result = ExecutionResult::new(name);
                result.executed = progress.load(Ordering::Acquire);
                result.failure = Some(ExecutionFailure::Timeout { after: timeout });
                (result, Scope::default())
            }
        };
        result.elapsed = started.elapsed();

        for observer in observers.iter() {
            observer.test_execution_finished(&result, &scope);
        }
        Ok(result)
    }

    fn observers(&self) -> ObserverSet {
        self.observers.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn set_observers(&self, observers: ObserverSet) -> Result<(), HarnessError> {
        *self.observers.write().unwrap_or_else(|e| e.into_inner()) = observers;
        Ok(())
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Everything a worker thread needs, detached from the borrowed test case.
struct Worker {
    name: String,
    statements: Vec<Statement>,
    resolver: Option<Arc<NamespaceResolver>>,
    proxy: Arc<CollectorProxy>,
    observers: ObserverSet,
    cancelled: Arc<AtomicBool>,
    progress: Arc<AtomicUsize>,
}

impl Worker {
    fn run(self) -> (ExecutionResult, Scope) {
        let mut result = ExecutionResult::new(self.name.clone());
        let mut scope = Scope::default();

        for (position, statement) in self.statements.iter().enumerate() {
            if self.cancelled.load(Ordering::Acquire) {
                break;
            }

            for observer in self.observers.iter() {
                observer.before_statement(statement, &scope);
            }
            result.executed += 1;
            self.progress.store(result.executed, Ordering::Release);

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                self.step(position, statement, &mut scope, &mut result.outputs)
            }))
            .unwrap_or_else(|payload| {
                Err(ExecutionFailure::Panic {
                    position: Some(position),
                    message: panic_message(payload.as_ref()),
                })
            });

            for observer in self.observers.iter() {
                observer.after_statement(statement, &scope, outcome.as_ref().err());
            }

            if let Err(failure) = outcome {
                tracing::debug!(test = %self.name, position, %failure, "statement failed");
                result.failure = Some(failure);
                break;
            }
        }

        (result, scope)
    }

    fn step(
        &self,
        position: usize,
        statement: &Statement,
        scope: &mut Scope,
        outputs: &mut Vec<(usize, String)>,
    ) -> Result<(), ExecutionFailure> {
        match statement {
            Statement::Construct { class } => {
                let unit = self.resolve(position, class)?;
                self.report(&unit, "<init>", position);
                scope.bind(position, unit);
            }
            Statement::Invoke { class, method } => {
                let unit = self.resolve(position, class)?;
                self.report(&unit, method, position);
            }
            Statement::Output { text } => {
                for observer in self.observers.iter() {
                    observer.output(position, text);
                }
                outputs.push((position, text.clone()));
            }
            Statement::Fail { message } => {
                return Err(ExecutionFailure::Statement {
                    position,
                    message: message.clone(),
                });
            }
            Statement::Sleep { millis } => self.sleep(Duration::from_millis(*millis)),
        }
        Ok(())
    }

    fn resolve(&self, position: usize, class: &str) -> Result<LoadedUnit, ExecutionFailure> {
        let Some(resolver) = &self.resolver else {
            return Err(ExecutionFailure::Resolution {
                position,
                message: "no resolver installed on the test case".to_string(),
            });
        };
        resolver.resolve(class).map_err(|e| match e {
            ResolveError::Unresolved(error) => ExecutionFailure::Unresolved { position, error },
            other => ExecutionFailure::Resolution {
                position,
                message: other.to_string(),
            },
        })
    }

    /// Only instrumented units carry the hooks that talk to the proxy.
    fn report(&self, unit: &LoadedUnit, site: &str, position: usize) {
        if unit.is_instrumented() {
            self.proxy.record(TraceEvent::new(unit.name.clone(), site, position));
        }
    }

    fn sleep(&self, total: Duration) {
        let deadline = Instant::now() + total;
        loop {
            if self.cancelled.load(Ordering::Acquire) {
                return;
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return;
            }
            std::thread::sleep(remaining.min(SLEEP_SLICE));
        }
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use tracebridge_core::{NamespaceKind, QualifiedName};

    use super::*;
    use crate::collector::CollectorHandle;
    use crate::engine::RecordingCollector;
    use crate::harness::{ExecutionObserver, ScriptedTestCase};
    use crate::namespace::MemoryNamespace;

    #[derive(Default)]
    struct EventLog {
        entries: Mutex<Vec<String>>,
    }

    impl EventLog {
        fn entries(&self) -> Vec<String> {
            self.entries.lock().unwrap().clone()
        }

        fn push(&self, entry: String) {
            self.entries.lock().unwrap().push(entry);
        }
    }

    impl ExecutionObserver for EventLog {
        fn output(&self, position: usize, text: &str) {
            self.push(format!("output {position} {text}"));
        }

        fn before_statement(&self, statement: &Statement, _scope: &Scope) {
            self.push(format!("before {statement}"));
        }

        fn after_statement(&self, statement: &Statement, _scope: &Scope, failure: Option<&ExecutionFailure>) {
            match failure {
                Some(_) => self.push(format!("after {statement} failed")),
                None => self.push(format!("after {statement}")),
            }
        }

        fn test_execution_finished(&self, result: &ExecutionResult, _scope: &Scope) {
            self.push(format!("finished executed={}", result.executed));
        }

        fn clear(&self) {}
    }

    struct PanickingObserver;

    impl ExecutionObserver for PanickingObserver {
        fn output(&self, _position: usize, _text: &str) {}
        fn before_statement(&self, _statement: &Statement, _scope: &Scope) {
            panic!("observer exploded");
        }
        fn after_statement(&self, _statement: &Statement, _scope: &Scope, _failure: Option<&ExecutionFailure>) {}
        fn test_execution_finished(&self, _result: &ExecutionResult, _scope: &Scope) {}
        fn clear(&self) {}
    }

    fn name(raw: &str) -> QualifiedName {
        QualifiedName::parse(raw).unwrap()
    }

    fn resolver() -> Arc<NamespaceResolver> {
        let instrumented =
            MemoryNamespace::new(NamespaceKind::Instrumented).with_unit(name("org.example.Stack"), b"stack".to_vec());
        let origin =
            MemoryNamespace::new(NamespaceKind::Origin).with_unit(name("java.util.ArrayList"), b"list".to_vec());
        Arc::new(NamespaceResolver::new(instrumented, origin))
    }

    fn construct(class: &str) -> Statement {
        Statement::Construct {
            class: class.to_string(),
        }
    }

    fn executor_with(observer: Arc<dyn ExecutionObserver>) -> InProcessExecutor {
        let executor = InProcessExecutor::new().unwrap();
        executor.set_observers(ObserverSet::single(observer)).unwrap();
        executor
    }

    // ========================================
    // Hook ordering
    // ========================================

    #[test]
    fn test_hooks_bracket_every_statement() {
        let log = Arc::new(EventLog::default());
        let executor = executor_with(log.clone());
        let mut case = ScriptedTestCase::new(
            "ordering",
            vec![
                construct("org.example.Stack"),
                Statement::Output {
                    text: "hi".to_string(),
                },
            ],
        )
        .with_proxy(Arc::new(CollectorProxy::new()));
        case.change_resolver(resolver());

        let result = executor.execute(&mut case, Duration::from_secs(5)).unwrap();

        assert!(result.is_success());
        assert_eq!(result.outputs, vec![(1, "hi".to_string())]);
        assert_eq!(
            log.entries(),
            vec![
                "before new org.example.Stack()",
                "after new org.example.Stack()",
                "before print(\"hi\")",
                "output 1 hi",
                "after print(\"hi\")",
                "finished executed=2",
            ]
        );
    }

    #[test]
    fn test_failure_stops_execution_and_still_fires_after() {
        let log = Arc::new(EventLog::default());
        let executor = executor_with(log.clone());
        let mut case = ScriptedTestCase::new(
            "failing",
            vec![
                Statement::Fail {
                    message: "boom".to_string(),
                },
                construct("org.example.Stack"),
            ],
        );
        case.change_resolver(resolver());

        let result = executor.execute(&mut case, Duration::from_secs(5)).unwrap();

        assert_eq!(
            result.failure,
            Some(ExecutionFailure::Statement {
                position: 0,
                message: "boom".to_string()
            })
        );
        assert_eq!(result.executed, 1);
        assert_eq!(
            log.entries(),
            vec!["before fail(\"boom\")", "after fail(\"boom\") failed", "finished executed=1"]
        );
    }

    // ========================================
    // Resolution and instrumentation
    // ========================================

    #[test]
    fn test_only_instrumented_units_report_events() {
        let proxy = Arc::new(CollectorProxy::new());
        let recording = Arc::new(RecordingCollector::default());
        proxy.set_current(CollectorHandle::from_arc(recording.clone()));

        let executor = InProcessExecutor::new().unwrap();
        let mut case = ScriptedTestCase::new(
            "events",
            vec![
                construct("org.example.Stack"),
                construct("java.util.ArrayList"),
                Statement::Invoke {
                    class: "org.example.Stack".to_string(),
                    method: "push".to_string(),
                },
            ],
        )
        .with_proxy(Arc::clone(&proxy));
        case.change_resolver(resolver());

        let result = executor.execute(&mut case, Duration::from_secs(5)).unwrap();

        assert!(result.is_success());
        let sites: Vec<_> = recording.events().into_iter().map(|e| (e.site, e.position)).collect();
        assert_eq!(sites, vec![("<init>".to_string(), 0), ("push".to_string(), 2)]);
    }

    #[test]
    fn test_unresolved_class_is_reported() {
        let executor = InProcessExecutor::new().unwrap();
        let mut case = ScriptedTestCase::new("missing", vec![construct("org.example.Missing")]);
        case.change_resolver(resolver());

        let result = executor.execute(&mut case, Duration::from_secs(5)).unwrap();

        let unresolved = result.unresolved().expect("unresolved failure");
        assert_eq!(unresolved.name.as_str(), "org.example.Missing");
    }

    #[test]
    fn test_missing_resolver_is_a_resolution_failure() {
        let executor = InProcessExecutor::new().unwrap();
        let mut case = ScriptedTestCase::new("no_resolver", vec![construct("org.example.Stack")]);

        let result = executor.execute(&mut case, Duration::from_secs(5)).unwrap();

        assert!(matches!(result.failure, Some(ExecutionFailure::Resolution { position: 0, .. })));
    }

    // ========================================
    // Deadlines and panics
    // ========================================

    #[test]
    fn test_timeout_waits_for_worker_before_finishing() {
        let log = Arc::new(EventLog::default());
        let executor = executor_with(log.clone());
        let mut case = ScriptedTestCase::new(
            "slow",
            vec![
                Statement::Sleep { millis: 5_000 },
                Statement::Output {
                    text: "never".to_string(),
                },
            ],
        );

        let result = executor.execute(&mut case, Duration::from_millis(50)).unwrap();

        assert!(result.timed_out());
        assert_eq!(result.executed, 1);
        assert!(result.elapsed < Duration::from_secs(5));
        let expected = vec!["before sleep(5000)", "after sleep(5000)", "finished executed=1"];
        assert_eq!(log.entries(), expected);

        // The worker has exited, so nothing arrives after execute returns.
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(log.entries(), expected);
    }

    #[test]
    fn test_timed_out_worker_records_nothing_after_return() {
        let proxy = Arc::new(CollectorProxy::new());
        let executor = InProcessExecutor::new().unwrap();
        let mut case = ScriptedTestCase::new(
            "slow_then_push",
            vec![
                Statement::Sleep { millis: 5_000 },
                Statement::Invoke {
                    class: "org.example.Stack".to_string(),
                    method: "push".to_string(),
                },
            ],
        )
        .with_proxy(Arc::clone(&proxy));
        case.change_resolver(resolver());

        let result = executor.execute(&mut case, Duration::from_millis(30)).unwrap();
        assert!(result.timed_out());

        // Whatever the next run installs must not receive the old run's events.
        let next_run = Arc::new(RecordingCollector::default());
        proxy.set_current(CollectorHandle::from_arc(next_run.clone()));
        std::thread::sleep(Duration::from_millis(50));
        assert!(next_run.events().is_empty());
    }

    #[test]
    fn test_zero_timeout_is_rejected() {
        let executor = InProcessExecutor::new().unwrap();
        let mut case = ScriptedTestCase::new("empty", Vec::new());
        assert!(matches!(
            executor.execute(&mut case, Duration::ZERO),
            Err(HarnessError::InvalidTimeout(_))
        ));
    }

    #[test]
    fn test_observer_panic_becomes_failure() {
        let log = Arc::new(EventLog::default());
        let executor = InProcessExecutor::new().unwrap();
        let mut observers = ObserverSet::new();
        observers.push(log.clone());
        observers.push(Arc::new(PanickingObserver));
        executor.set_observers(observers).unwrap();

        let mut case = ScriptedTestCase::new("panics", vec![Statement::Output { text: "x".to_string() }]);
        let result = executor.execute(&mut case, Duration::from_secs(5)).unwrap();

        match result.failure {
            Some(ExecutionFailure::Panic { position: None, message }) => assert_eq!(message, "observer exploded"),
            other => panic!("expected worker panic, got {other:?}"),
        }
        assert_eq!(log.entries().last().map(String::as_str), Some("finished executed=0"));
    }
}
