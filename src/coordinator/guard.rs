//! Scoped observer-set replacement.

use crate::error::{BridgeError, BridgeResult};
use crate::harness::{ObserverSet, TestExecutor};

/// Puts an executor's previous observer set back when the run ends.
///
/// Call [`ObserverRestoreGuard::restore`] on the normal path to see restoration errors; if the guard
/// is dropped instead (a panic unwinding through the coordinator), restoration still happens and a
/// failure is logged.
#[must_use = "dropping the guard restores the observers immediately"]
pub struct ObserverRestoreGuard<'a> {
    executor: &'a dyn TestExecutor,
    snapshot: Option<ObserverSet>,
}

impl<'a> ObserverRestoreGuard<'a> {
    /// Snapshot `executor`'s observers and install `replacement`.
    pub fn install(executor: &'a dyn TestExecutor, replacement: ObserverSet) -> BridgeResult<Self> {
        let snapshot = executor.observers();
        executor.set_observers(replacement).map_err(BridgeError::Executor)?;
        tracing::debug!(saved = snapshot.len(), "observer set replaced");
        Ok(Self {
            executor,
            snapshot: Some(snapshot),
        })
    }

    pub fn snapshot(&self) -> Option<&ObserverSet> {
        self.snapshot.as_ref()
    }

    pub fn restore(mut self) -> BridgeResult<()> {
        match self.snapshot.take() {
            Some(snapshot) => self
                .executor
                .set_observers(snapshot)
                .map_err(BridgeError::ObserverRestorationFailure),
            None => Ok(()),
        }
    }
}

impl Drop for ObserverRestoreGuard<'_> {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            if let Err(error) = self.executor.set_observers(snapshot) {
                tracing::error!(%error, "failed to restore observer set");
            }
        }
    }
}
