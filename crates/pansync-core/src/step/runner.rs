use std::collections::HashSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use tokio::sync::{watch, Notify};

use crate::error::TransferError;

pub type StepFuture = Pin<Box<dyn Future<Output = Result<(), TransferError>> + Send>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepStatus {
    Created,
    Running,
    Finished,
    Stopped,
}

impl StepStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            StepStatus::Created => "created",
            StepStatus::Running => "running",
            StepStatus::Finished => "finished",
            StepStatus::Stopped => "stopped",
        }
    }
}

/// Published on every status transition and step change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub status: StepStatus,
    pub step: Option<&'static str>,
    /// Set when the runner stopped because a step failed.
    pub error: Option<String>,
}

pub struct Step<C> {
    name: &'static str,
    action: fn(C) -> StepFuture,
    cancel: Option<fn(C) -> StepFuture>,
}

impl<C> Step<C> {
    pub fn new(name: &'static str, action: fn(C) -> StepFuture) -> Self {
        Self {
            name,
            action,
            cancel: None,
        }
    }

    /// Hook asked to wind the action down on `stop()`. The action is then
    /// awaited to completion; without a hook it is dropped immediately.
    pub fn with_cancel(mut self, cancel: fn(C) -> StepFuture) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

struct RunnerState {
    status: StepStatus,
    completed: HashSet<&'static str>,
    current: Option<&'static str>,
    last_error: Option<String>,
}

pub struct StepRunner<C> {
    steps: Vec<Step<C>>,
    state: Mutex<RunnerState>,
    stop_requested: AtomicBool,
    stop_notify: Notify,
    status_tx: watch::Sender<StatusChange>,
}

impl<C: Clone + Send + 'static> StepRunner<C> {
    pub fn new(steps: Vec<Step<C>>) -> Self {
        let (status_tx, _) = watch::channel(StatusChange {
            status: StepStatus::Created,
            step: None,
            error: None,
        });
        Self {
            steps,
            state: Mutex::new(RunnerState {
                status: StepStatus::Created,
                completed: HashSet::new(),
                current: None,
                last_error: None,
            }),
            stop_requested: AtomicBool::new(false),
            stop_notify: Notify::new(),
            status_tx,
        }
    }

    fn lock(&self) -> MutexGuard<'_, RunnerState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn publish(&self, st: &RunnerState) {
        self.status_tx.send_replace(StatusChange {
            status: st.status,
            step: st.current,
            error: st.last_error.clone(),
        });
    }

    fn settle(&self, status: StepStatus, error: Option<String>) {
        let mut st = self.lock();
        st.status = status;
        st.current = None;
        st.last_error = error;
        self.publish(&st);
    }

    pub fn subscribe(&self) -> watch::Receiver<StatusChange> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> StepStatus {
        self.lock().status
    }

    pub fn current_step(&self) -> Option<&'static str> {
        self.lock().current
    }

    pub fn last_error(&self) -> Option<String> {
        self.lock().last_error.clone()
    }

    pub fn is_completed(&self, name: &str) -> bool {
        self.lock().completed.contains(name)
    }

    /// Completed step names, in step order.
    pub fn completed_steps(&self) -> Vec<&'static str> {
        let st = self.lock();
        self.steps
            .iter()
            .map(Step::name)
            .filter(|n| st.completed.contains(n))
            .collect()
    }

    /// Run the remaining steps.
    ///
    /// Returns the status after the call: `Finished`, `Stopped` for a
    /// cooperative stop, or the current status unchanged when the runner is
    /// already running or finished. A failing step leaves the runner
    /// `Stopped`, records the error, and returns it; that step runs again on
    /// the next call.
    pub async fn run(&self, ctx: C) -> Result<StepStatus, TransferError> {
        {
            let mut st = self.lock();
            if matches!(st.status, StepStatus::Running | StepStatus::Finished) {
                return Ok(st.status);
            }
            st.status = StepStatus::Running;
            st.last_error = None;
            self.stop_requested.store(false, Ordering::SeqCst);
            self.publish(&st);
        }

        for step in &self.steps {
            if self.is_completed(step.name) {
                tracing::debug!(step = step.name, "step already completed, skipping");
                continue;
            }

            let stop = self.stop_notify.notified();
            tokio::pin!(stop);
            stop.as_mut().enable();
            if self.stop_requested.load(Ordering::SeqCst) {
                self.settle(StepStatus::Stopped, None);
                return Ok(StepStatus::Stopped);
            }

            {
                let mut st = self.lock();
                st.current = Some(step.name);
                self.publish(&st);
            }
            tracing::debug!(step = step.name, "step started");

            let mut action = (step.action)(ctx.clone());
            let result = tokio::select! {
                r = &mut action => r,
                _ = &mut stop => match step.cancel {
                    Some(cancel) => {
                        if let Err(e) = cancel(ctx.clone()).await {
                            tracing::warn!(step = step.name, error = %e, "cancel hook failed");
                        }
                        action.await
                    }
                    None => Err(TransferError::Stopped),
                },
            };

            match result {
                Ok(()) => {
                    tracing::debug!(step = step.name, "step finished");
                    {
                        let mut st = self.lock();
                        st.completed.insert(step.name);
                    }
                    if self.stop_requested.load(Ordering::SeqCst) {
                        self.settle(StepStatus::Stopped, None);
                        return Ok(StepStatus::Stopped);
                    }
                }
                Err(e) if e.is_stopped() => {
                    tracing::info!(step = step.name, "stopped");
                    self.settle(StepStatus::Stopped, None);
                    return Ok(StepStatus::Stopped);
                }
                Err(e) => {
                    tracing::warn!(step = step.name, error = %e, "step failed");
                    self.settle(StepStatus::Stopped, Some(e.to_string()));
                    return Err(e);
                }
            }
        }

        self.settle(StepStatus::Finished, None);
        Ok(StepStatus::Finished)
    }

    /// Ask the active step to wind down and wait until the runner leaves
    /// `Running`. No-op when not running.
    pub async fn stop(&self) {
        let mut rx = self.subscribe();
        if self.status() != StepStatus::Running {
            return;
        }
        self.stop_requested.store(true, Ordering::SeqCst);
        self.stop_notify.notify_waiters();
        let _ = rx.wait_for(|c| c.status != StepStatus::Running).await;
    }
}
