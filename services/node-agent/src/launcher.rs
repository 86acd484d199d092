//! Launch strategies for bootstrap units.
//!
//! The bootstrap reconciler never spawns tasks itself; it hands each unit to
//! a [`Launcher`]. Production uses [`TokioLauncher`]; tests can collect units
//! with [`DeferredLauncher`] and run (or drop) them when they choose.

use std::sync::Mutex;

use futures_util::future::BoxFuture;
use tokio::task::JoinSet;
use tracing::{debug, warn};

/// A unit of bootstrap work. Owns its concurrency token.
pub type BootstrapUnit = BoxFuture<'static, ()>;

/// Runs bootstrap units.
pub trait Launcher: Send + Sync {
    /// Start `unit`. Must not wait for it to finish.
    fn launch(&self, unit: BootstrapUnit);
}

/// Spawns each unit on the tokio runtime and tracks it until it ends.
#[derive(Default)]
pub struct TokioLauncher {
    tasks: Mutex<JoinSet<()>>,
}

impl TokioLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of spawned units not yet reaped.
    pub fn tracked(&self) -> usize {
        self.lock().len()
    }

    /// Wait for every spawned unit to finish.
    pub async fn wait_idle(&self) {
        let mut tasks = std::mem::take(&mut *self.lock());
        while let Some(result) = tasks.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "Bootstrap unit did not complete");
            }
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, JoinSet<()>> {
        self.tasks.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Launcher for TokioLauncher {
    fn launch(&self, unit: BootstrapUnit) {
        let mut tasks = self.lock();
        // Reap finished units so the set does not grow across passes.
        while let Some(result) = tasks.try_join_next() {
            if let Err(e) = result {
                warn!(error = %e, "Bootstrap unit did not complete");
            }
        }
        tasks.spawn(unit);
        debug!(tracked = tasks.len(), "Bootstrap unit spawned");
    }
}

/// Holds units until the caller runs them.
#[derive(Default)]
pub struct DeferredLauncher {
    units: Mutex<Vec<BootstrapUnit>>,
}

impl DeferredLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pending(&self) -> usize {
        self.lock().len()
    }

    /// Remove and return the queued units.
    pub fn take(&self) -> Vec<BootstrapUnit> {
        std::mem::take(&mut *self.lock())
    }

    /// Run every queued unit to completion, one after another.
    pub async fn run_all(&self) {
        for unit in self.take() {
            unit.await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<BootstrapUnit>> {
        self.units.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Launcher for DeferredLauncher {
    fn launch(&self, unit: BootstrapUnit) {
        self.lock().push(unit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_unit(counter: &Arc<AtomicUsize>) -> BootstrapUnit {
        let counter = Arc::clone(counter);
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[tokio::test]
    async fn test_tokio_launcher_runs_units() {
        let launcher = TokioLauncher::new();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            launcher.launch(counting_unit(&counter));
        }
        launcher.wait_idle().await;

        assert_eq!(counter.load(Ordering::SeqCst), 3);
        assert_eq!(launcher.tracked(), 0);
    }

    #[tokio::test]
    async fn test_deferred_launcher_holds_units() {
        let launcher = DeferredLauncher::new();
        let counter = Arc::new(AtomicUsize::new(0));

        launcher.launch(counting_unit(&counter));
        launcher.launch(counting_unit(&counter));
        assert_eq!(launcher.pending(), 2);
        assert_eq!(counter.load(Ordering::SeqCst), 0);

        launcher.run_all().await;
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(launcher.pending(), 0);
    }
}
