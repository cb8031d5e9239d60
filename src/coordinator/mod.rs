//! Session coordinator: the single entry point a harness calls.
//!
//! ## Run lifecycle
//!
//! 1. Take the proxy's run lock (one run at a time per proxy).
//! 2. Build a fresh [`TraceObserver`] bound to a new collector from the engine session, and attach
//!    it, which parks the proxy on the inert collector.
//! 3. Rebind the test case's name resolution and collector proxy to the coordinator's.
//! 4. Snapshot the executor's observers and install only the fresh observer.
//! 5. Delegate execution with the configured timeout.
//! 6. Restore the snapshot on every exit path.
//!
//! The resolver, and with it the identity cache, lives as long as the coordinator.

mod guard;

pub use guard::ObserverRestoreGuard;

use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use tracebridge_core::{NamespaceKind, QualifiedName};

use crate::collector::{CollectorProxy, RunGuard};
use crate::config::BridgeConfig;
use crate::engine::{EngineSession, RecordingSession};
use crate::error::{BridgeError, BridgeResult};
use crate::harness::{ExecutionResult, InProcessExecutor, ObserverSet, TestCase, TestExecutor};
use crate::namespace::{ClasspathNamespace, DirectoryNamespace, NamespaceResolver};
use crate::observer::{ObserverPhase, TraceObserver};

static INSTANCE: OnceLock<Coordinator> = OnceLock::new();
static INIT_LOCK: Mutex<()> = Mutex::new(());

/// Install the process-wide coordinator. Fails if one is already installed.
pub fn init(coordinator: Coordinator) -> BridgeResult<&'static Coordinator> {
    let _init = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    INSTANCE
        .set(coordinator)
        .map_err(|_| BridgeError::AlreadyInitialized)?;
    instance()
}

/// The process-wide coordinator, built from the config file at `config_path` on first use.
///
/// Once a coordinator is installed `config_path` is never read again. A failed build leaves the
/// singleton uninitialized so a later call can retry.
pub fn instance_or_init(config_path: &Path) -> BridgeResult<&'static Coordinator> {
    if let Some(coordinator) = INSTANCE.get() {
        return Ok(coordinator);
    }
    let _init = INIT_LOCK.lock().unwrap_or_else(|e| e.into_inner());
    if let Some(coordinator) = INSTANCE.get() {
        return Ok(coordinator);
    }

    let coordinator = Coordinator::from_config(BridgeConfig::load(config_path)?)?;
    tracing::debug!(path = %config_path.display(), "process-wide coordinator built");
    INSTANCE
        .set(coordinator)
        .map_err(|_| BridgeError::AlreadyInitialized)?;
    instance()
}

/// The process-wide coordinator installed by [`init`].
pub fn instance() -> BridgeResult<&'static Coordinator> {
    INSTANCE.get().ok_or(BridgeError::NotInitialized)
}

pub struct Coordinator {
    config: BridgeConfig,
    target: QualifiedName,
    resolver: Arc<NamespaceResolver>,
    session: Arc<dyn EngineSession>,
    executor: Arc<dyn TestExecutor>,
    proxy: Arc<CollectorProxy>,
}

impl Coordinator {
    pub fn new(
        config: BridgeConfig,
        resolver: NamespaceResolver,
        session: Arc<dyn EngineSession>,
        executor: Arc<dyn TestExecutor>,
    ) -> BridgeResult<Self> {
        config.validate()?;
        let target = config.target()?;
        tracing::info!(
            target_class = %target,
            package = config.package(),
            instrumented_dir = %config.instrumented_dir.display(),
            "coordinator initialized"
        );
        Ok(Self {
            config,
            target,
            resolver: Arc::new(resolver),
            session,
            executor,
            proxy: CollectorProxy::global(),
        })
    }

    /// Wire up directory-backed namespaces, a recording engine session and an in-process executor.
    pub fn from_config(config: BridgeConfig) -> BridgeResult<Self> {
        let session = Arc::new(RecordingSession::launch(config.classpath.clone(), config.target()?));
        let executor = Arc::new(InProcessExecutor::new().map_err(BridgeError::Executor)?);
        let resolver = Self::resolver_for(&config);
        Self::new(config, resolver, session, executor)
    }

    /// Instrumented directory first, then the target classpath.
    pub fn resolver_for(config: &BridgeConfig) -> NamespaceResolver {
        NamespaceResolver::new(
            DirectoryNamespace::instrumented(&config.instrumented_dir),
            ClasspathNamespace::new(config.classpath.clone(), NamespaceKind::Origin),
        )
    }

    /// Drive `proxy` instead of the process-wide one.
    pub fn with_proxy(mut self, proxy: Arc<CollectorProxy>) -> Self {
        self.proxy = proxy;
        self
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn target(&self) -> &QualifiedName {
        &self.target
    }

    pub fn resolver(&self) -> &Arc<NamespaceResolver> {
        &self.resolver
    }

    pub fn session(&self) -> &Arc<dyn EngineSession> {
        &self.session
    }

    pub fn executor(&self) -> &Arc<dyn TestExecutor> {
        &self.executor
    }

    pub fn proxy(&self) -> &Arc<CollectorProxy> {
        &self.proxy
    }

    /// Run one test case with a fresh trace observer.
    ///
    /// Returns `Ok(None)` when the executor itself failed; test-case failures (unresolved names,
    /// timeouts, failing statements) come back inside the result.
    #[tracing::instrument(skip_all, fields(test = %test.name(), target_class = %self.target))]
    pub fn run_one_test(&self, test: &mut dyn TestCase) -> BridgeResult<Option<ExecutionResult>> {
        let run = self.proxy.begin_run();
        let observer = Arc::new(TraceObserver::new(Arc::clone(&self.session), Arc::clone(&self.proxy)));
        self.run_locked(&run, test, observer)
    }

    /// Run one test case with a caller-built observer.
    ///
    /// The observer must be bound to this coordinator's proxy and be IDLE (a reused observer must
    /// have been cleared); otherwise the run is refused with [`BridgeError::ObserverAttach`].
    #[tracing::instrument(skip_all, fields(test = %test.name(), target_class = %self.target))]
    pub fn run_with_observer(
        &self,
        test: &mut dyn TestCase,
        observer: Arc<TraceObserver>,
    ) -> BridgeResult<Option<ExecutionResult>> {
        let run = self.proxy.begin_run();
        self.run_locked(&run, test, observer)
    }

    fn run_locked(
        &self,
        run: &RunGuard<'_>,
        test: &mut dyn TestCase,
        observer: Arc<TraceObserver>,
    ) -> BridgeResult<Option<ExecutionResult>> {
        observer.attach(run).map_err(BridgeError::ObserverAttach)?;
        test.change_resolver(Arc::clone(&self.resolver));
        test.change_proxy(Arc::clone(&self.proxy));

        let guard = ObserverRestoreGuard::install(self.executor.as_ref(), ObserverSet::single(observer.clone()))?;
        let timeout = self.config.timeout();
        tracing::info!(?timeout, "test run started");

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.executor.execute(test, timeout)));
        guard.restore()?;

        let result = match outcome {
            Ok(Ok(result)) => {
                match &result.failure {
                    Some(failure) => tracing::warn!(%failure, executed = result.executed, "test run failed"),
                    None => tracing::info!(executed = result.executed, elapsed = ?result.elapsed, "test run passed"),
                }
                Some(result)
            }
            Ok(Err(error)) => {
                tracing::error!(%error, "executor failed");
                None
            }
            Err(payload) => {
                let message = crate::harness::panic_message(payload.as_ref());
                tracing::error!(panic = %message, "executor panicked");
                None
            }
        };

        if result.is_none() && observer.phase() != ObserverPhase::Detached {
            // The executor never reached test_execution_finished.
            self.proxy.clear_current();
        }

        match observer.violation() {
            Some(violation) => Err(BridgeError::ObserverProtocol(violation)),
            None => Ok(result),
        }
    }
}

impl std::fmt::Debug for Coordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Coordinator")
            .field("target", &self.target)
            .field("resolver", &self.resolver)
            .field("timeout_ms", &self.config.timeout_ms)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::harness::{ExecutionObserver, HarnessError, Scope, ScriptedTestCase, Statement};
    use crate::namespace::MemoryNamespace;
    use crate::observer::AttachError;

    #[derive(Clone, Copy)]
    enum Misbehaviour {
        Error,
        Panic,
        DoubleBefore,
        RejectRestore,
    }

    /// Executor double that misbehaves in one specific way.
    struct StubExecutor {
        observers: Mutex<ObserverSet>,
        misbehaviour: Misbehaviour,
        set_calls: AtomicUsize,
    }

    impl StubExecutor {
        fn new(misbehaviour: Misbehaviour) -> Self {
            Self {
                observers: Mutex::new(ObserverSet::new()),
                misbehaviour,
                set_calls: AtomicUsize::new(0),
            }
        }
    }

    impl TestExecutor for StubExecutor {
        fn execute(&self, test: &mut dyn TestCase, _timeout: Duration) -> Result<ExecutionResult, HarnessError> {
            let observers = self.observers();
            let statement = Statement::Output { text: "x".to_string() };
            let scope = Scope::default();
            match self.misbehaviour {
                Misbehaviour::Error => Err(HarnessError::InvalidTimeout(Duration::ZERO)),
                Misbehaviour::Panic => {
                    for observer in observers.iter() {
                        observer.before_statement(&statement, &scope);
                    }
                    panic!("executor blew up")
                }
                Misbehaviour::DoubleBefore | Misbehaviour::RejectRestore => {
                    for observer in observers.iter() {
                        observer.before_statement(&statement, &scope);
                        if matches!(self.misbehaviour, Misbehaviour::DoubleBefore) {
                            observer.before_statement(&statement, &scope);
                        }
                        observer.after_statement(&statement, &scope, None);
                    }
                    let result = ExecutionResult::new(test.name());
                    for observer in observers.iter() {
                        observer.test_execution_finished(&result, &scope);
                    }
                    Ok(result)
                }
            }
        }

        fn observers(&self) -> ObserverSet {
            self.observers.lock().unwrap().clone()
        }

        fn set_observers(&self, observers: ObserverSet) -> Result<(), HarnessError> {
            let call = self.set_calls.fetch_add(1, Ordering::SeqCst);
            if matches!(self.misbehaviour, Misbehaviour::RejectRestore) && call > 0 {
                return Err(HarnessError::ObserverSet("read-only".to_string()));
            }
            *self.observers.lock().unwrap() = observers;
            Ok(())
        }
    }

    struct Bystander;

    impl ExecutionObserver for Bystander {
        fn output(&self, _position: usize, _text: &str) {}
        fn before_statement(&self, _statement: &Statement, _scope: &Scope) {}
        fn after_statement(
            &self,
            _statement: &Statement,
            _scope: &Scope,
            _failure: Option<&crate::harness::ExecutionFailure>,
        ) {
        }
        fn test_execution_finished(&self, _result: &ExecutionResult, _scope: &Scope) {}
        fn clear(&self) {}
    }

    fn coordinator(executor: Arc<dyn TestExecutor>) -> Coordinator {
        let config = BridgeConfig::new("org.example.Stack").with_timeout_ms(1_000);
        let resolver = NamespaceResolver::new(
            MemoryNamespace::new(NamespaceKind::Instrumented),
            MemoryNamespace::new(NamespaceKind::Origin),
        );
        let session = Arc::new(RecordingSession::launch(Vec::new(), config.target().unwrap()));
        Coordinator::new(config, resolver, session, executor)
            .unwrap()
            .with_proxy(Arc::new(CollectorProxy::new()))
    }

    fn install_bystander(executor: &StubExecutor) -> ObserverSet {
        let before = ObserverSet::single(Arc::new(Bystander));
        *executor.observers.lock().unwrap() = before.clone();
        before
    }

    // ========================================
    // Contained failures
    // ========================================

    #[test]
    fn test_executor_error_yields_none_and_restores() {
        let executor = Arc::new(StubExecutor::new(Misbehaviour::Error));
        let before = install_bystander(&executor);
        let coordinator = coordinator(executor.clone());

        let mut case = ScriptedTestCase::new("t", Vec::new());
        assert!(coordinator.run_one_test(&mut case).unwrap().is_none());
        assert_eq!(executor.observers(), before);
    }

    #[test]
    fn test_executor_panic_yields_none_restores_and_disables_proxy() {
        let executor = Arc::new(StubExecutor::new(Misbehaviour::Panic));
        let before = install_bystander(&executor);
        let coordinator = coordinator(executor.clone());

        let mut case = ScriptedTestCase::new("t", Vec::new());
        assert!(coordinator.run_one_test(&mut case).unwrap().is_none());
        assert_eq!(executor.observers(), before);
        assert!(coordinator.proxy().is_disabled());
    }

    // ========================================
    // Bookkeeping defects
    // ========================================

    #[test]
    fn test_protocol_violation_is_reported_after_restore() {
        let executor = Arc::new(StubExecutor::new(Misbehaviour::DoubleBefore));
        let before = install_bystander(&executor);
        let coordinator = coordinator(executor.clone());

        let mut case = ScriptedTestCase::new("t", Vec::new());
        let err = coordinator.run_one_test(&mut case).unwrap_err();
        assert!(matches!(err, BridgeError::ObserverProtocol(_)));
        assert_eq!(executor.observers(), before);
    }

    #[test]
    fn test_observer_on_another_proxy_is_refused_before_install() {
        let executor = Arc::new(StubExecutor::new(Misbehaviour::Error));
        let before = install_bystander(&executor);
        let coordinator = coordinator(executor.clone());
        let observer = Arc::new(TraceObserver::new(
            Arc::clone(coordinator.session()),
            Arc::new(CollectorProxy::new()),
        ));

        let mut case = ScriptedTestCase::new("t", Vec::new());
        let err = coordinator.run_with_observer(&mut case, observer).unwrap_err();

        assert!(matches!(err, BridgeError::ObserverAttach(AttachError::ForeignRun)));
        assert_eq!(executor.set_calls.load(Ordering::SeqCst), 0);
        assert_eq!(executor.observers(), before);
        assert!(coordinator.proxy().is_disabled());
    }

    #[test]
    fn test_restore_failure_propagates() {
        let executor = Arc::new(StubExecutor::new(Misbehaviour::RejectRestore));
        let coordinator = coordinator(executor.clone());

        let mut case = ScriptedTestCase::new("t", Vec::new());
        let err = coordinator.run_one_test(&mut case).unwrap_err();
        assert!(matches!(err, BridgeError::ObserverRestorationFailure(_)));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let resolver = NamespaceResolver::new(
            MemoryNamespace::new(NamespaceKind::Instrumented),
            MemoryNamespace::new(NamespaceKind::Origin),
        );
        let session = Arc::new(RecordingSession::launch(
            Vec::new(),
            QualifiedName::parse("a.B").unwrap(),
        ));
        let executor = Arc::new(StubExecutor::new(Misbehaviour::Error));
        let err = Coordinator::new(BridgeConfig::new(""), resolver, session, executor).unwrap_err();
        assert!(matches!(err, BridgeError::Config(_)));
    }

    // ========================================
    // Singleton
    // ========================================

    // The process-wide instance can only be installed once per test binary, so every singleton
    // assertion lives in this one test.
    #[test]
    fn test_singleton_builds_lazily_from_config_once() {
        let missing = Path::new("/definitely/not/here/tracebridge.json");
        assert!(matches!(instance(), Err(BridgeError::NotInitialized)));
        assert!(matches!(instance_or_init(missing), Err(BridgeError::Config(_))));
        assert!(matches!(instance(), Err(BridgeError::NotInitialized)));

        let config_path = Path::new(env!("CARGO_MANIFEST_DIR")).join("demos").join("tracebridge.json");
        let installed = instance_or_init(&config_path).unwrap();
        assert_eq!(installed.target().as_str(), "org.example.Stack");
        assert_eq!(installed.config().timeout_ms, 2_000);
        assert!(Arc::ptr_eq(installed.proxy(), &CollectorProxy::global()));

        // Later calls never reload.
        assert!(std::ptr::eq(instance_or_init(missing).unwrap(), installed));
        assert!(std::ptr::eq(instance().unwrap(), installed));

        let second = coordinator(Arc::new(StubExecutor::new(Misbehaviour::Error)));
        assert!(matches!(init(second), Err(BridgeError::AlreadyInitialized)));
        assert!(std::ptr::eq(instance().unwrap(), installed));
    }
}
