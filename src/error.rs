//! Coordinator-level errors.
//!
//! Everything that goes wrong inside a test case is reported through
//! [`ExecutionResult`](crate::harness::ExecutionResult). A `BridgeError` means the bridge's own
//! bookkeeping is broken, so it propagates to the caller.

use miette::Diagnostic;
use thiserror::Error;

use crate::config::ConfigError;
use crate::harness::HarnessError;
use crate::observer::{AttachError, TransitionError};

#[derive(Debug, Error, Diagnostic)]
pub enum BridgeError {
    #[error("observer protocol violated during test run: {0}")]
    #[diagnostic(
        code(tracebridge::observer_protocol),
        help("the executor must call before_statement/after_statement in strict alternation")
    )]
    ObserverProtocol(#[source] TransitionError),

    #[error("observer could not be attached to the test run")]
    #[diagnostic(
        code(tracebridge::observer_attach),
        help("build the observer on the coordinator's proxy and clear it between runs")
    )]
    ObserverAttach(#[source] AttachError),

    #[error("failed to restore the executor's observer set")]
    #[diagnostic(code(tracebridge::observer_restore))]
    ObserverRestorationFailure(#[source] HarnessError),

    #[error("coordinator is already initialized")]
    #[diagnostic(code(tracebridge::singleton))]
    AlreadyInitialized,

    #[error("coordinator is not initialized")]
    #[diagnostic(code(tracebridge::singleton), help("call coordinator::init or coordinator::instance_or_init first"))]
    NotInitialized,

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to start the executor")]
    #[diagnostic(code(tracebridge::executor))]
    Executor(#[source] HarnessError),
}

pub type BridgeResult<T> = Result<T, BridgeError>;
