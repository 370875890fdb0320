use std::sync::Arc;

use tokio::sync::watch;

/// Requested pool behaviour, escalating only: `Run` < `Graceful` < `Force`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StopMode {
    Run,
    /// Finish in-flight slices, dispatch nothing new.
    Graceful,
    /// Terminate workers now and requeue their slices.
    Force,
}

/// Stop switch shared between a task and the pools it runs.
#[derive(Clone)]
pub struct PoolControl {
    tx: Arc<watch::Sender<StopMode>>,
}

impl PoolControl {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(StopMode::Run);
        Self { tx: Arc::new(tx) }
    }

    pub fn stop(&self, force: bool) {
        let requested = if force {
            StopMode::Force
        } else {
            StopMode::Graceful
        };
        self.tx.send_if_modified(|mode| {
            if requested > *mode {
                *mode = requested;
                true
            } else {
                false
            }
        });
    }

    /// Re-arm before a new run.
    pub fn reset(&self) {
        self.tx.send_replace(StopMode::Run);
    }

    pub fn mode(&self) -> StopMode {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<StopMode> {
        self.tx.subscribe()
    }
}

impl Default for PoolControl {
    fn default() -> Self {
        Self::new()
    }
}
