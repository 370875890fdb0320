//! Pool controller: dispatch, failure handling, respawn, stop.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;

use super::control::{PoolControl, StopMode};
use super::message::{SliceOutput, WorkerEvent};
use super::worker::WorkerHandle;
use super::SliceWork;
use crate::error::TransferError;
use crate::retry::{classify, RetryPolicy};
use crate::slices::SliceLedger;

pub struct SlicePool {
    threads: usize,
    /// Per-slice retry inside each worker.
    retry: RetryPolicy,
    /// Pools spawned at most (the first one included) before giving up.
    max_attempts: u32,
    control: PoolControl,
}

fn lock(ledger: &Mutex<SliceLedger>) -> MutexGuard<'_, SliceLedger> {
    ledger.lock().unwrap_or_else(|e| e.into_inner())
}

/// Controller-side state for one `run` call.
struct Dispatch<'a, W> {
    ledger: &'a Mutex<SliceLedger>,
    work: Arc<W>,
    events: mpsc::UnboundedSender<WorkerEvent>,
    workers: Vec<WorkerHandle>,
    next_id: usize,
    attempts: u32,
    draining: bool,
}

impl<W: SliceWork> Dispatch<'_, W> {
    fn spawn_workers(&mut self, threads: usize, retry: RetryPolicy) {
        let pending = lock(self.ledger).pending_count();
        let n = threads.min(pending).max(1);
        for _ in 0..n {
            let id = self.next_id;
            self.next_id += 1;
            self.workers.push(WorkerHandle::spawn(
                id,
                self.work.clone(),
                retry,
                self.events.clone(),
            ));
        }
        tracing::debug!(workers = n, pending, "slice workers started");
    }

    /// Hand pending indices to idle workers until one side runs out.
    fn dispatch(&mut self) {
        if self.draining {
            return;
        }
        let mut ledger = lock(self.ledger);
        for worker in self.workers.iter_mut().filter(|w| w.is_idle()) {
            let Some(index) = ledger.take_next() else {
                break;
            };
            if !worker.assign(index) {
                ledger.requeue(index);
            }
        }
    }

    fn terminate_all(&mut self) {
        self.workers.clear();
        lock(self.ledger).requeue_all();
    }

    fn shutdown_all(&mut self) {
        for worker in &self.workers {
            worker.shutdown();
        }
        self.workers.clear();
    }

    fn on_done<F: FnMut(usize, SliceOutput)>(
        &mut self,
        worker: usize,
        index: usize,
        output: SliceOutput,
        on_slice: &mut F,
    ) {
        if let Some(w) = self.workers.iter_mut().find(|w| w.id == worker) {
            w.assigned = None;
        }
        lock(self.ledger).mark_done(index);
        on_slice(index, output);
    }

    fn on_failed(
        &mut self,
        worker: usize,
        index: usize,
        error: TransferError,
        threads: usize,
        retry: RetryPolicy,
        max_attempts: u32,
    ) -> Result<(), TransferError> {
        self.workers.retain(|w| w.id != worker);
        lock(self.ledger).requeue(index);

        if !classify(&error).is_transient() {
            tracing::warn!(index, error = %error, "slice failed fatally");
            self.terminate_all();
            return Err(error);
        }
        tracing::warn!(worker, index, error = %error, "slice worker failed, removed from pool");

        if self.workers.is_empty() && !self.draining {
            if self.attempts >= max_attempts {
                self.terminate_all();
                return Err(error);
            }
            self.attempts += 1;
            tracing::warn!(attempt = self.attempts, "all slice workers failed, respawning pool");
            self.spawn_workers(threads, retry);
        }
        Ok(())
    }
}

impl SlicePool {
    pub fn new(threads: usize, retry: RetryPolicy, max_attempts: u32, control: PoolControl) -> Self {
        Self {
            threads: threads.max(1),
            retry,
            max_attempts: max_attempts.max(1),
            control,
        }
    }

    pub fn control(&self) -> &PoolControl {
        &self.control
    }

    /// Transfer every pending slice in `ledger`.
    ///
    /// `on_slice` is called once per completed slice, in completion order.
    /// Returns `Err(Stopped)` when stopped through the pool control; the
    /// ledger then holds the unfinished slices as pending.
    pub async fn run<W, F>(
        &self,
        ledger: &Mutex<SliceLedger>,
        work: Arc<W>,
        mut on_slice: F,
    ) -> Result<(), TransferError>
    where
        W: SliceWork,
        F: FnMut(usize, SliceOutput),
    {
        {
            let mut l = lock(ledger);
            l.requeue_all();
            if l.is_complete() {
                return Ok(());
            }
        }

        let mut stop_rx = self.control.subscribe();
        match *stop_rx.borrow_and_update() {
            StopMode::Run => {}
            StopMode::Graceful | StopMode::Force => return Err(TransferError::Stopped),
        }

        let (events_tx, mut events) = mpsc::unbounded_channel();
        let mut state = Dispatch {
            ledger,
            work,
            events: events_tx,
            workers: Vec::new(),
            next_id: 0,
            attempts: 1,
            draining: false,
        };
        state.spawn_workers(self.threads, self.retry);

        loop {
            state.dispatch();
            {
                let l = lock(ledger);
                if l.is_complete() {
                    drop(l);
                    state.shutdown_all();
                    return Ok(());
                }
                if state.draining && l.in_flight_count() == 0 {
                    drop(l);
                    state.shutdown_all();
                    tracing::info!("slice pool drained after stop");
                    return Err(TransferError::Stopped);
                }
            }

            tokio::select! {
                Some(event) = events.recv() => match event {
                    WorkerEvent::Done { worker, index, output } => {
                        state.on_done(worker, index, output, &mut on_slice);
                    }
                    WorkerEvent::Failed { worker, index, error } => {
                        state.on_failed(
                            worker,
                            index,
                            error,
                            self.threads,
                            self.retry,
                            self.max_attempts,
                        )?;
                    }
                },
                changed = stop_rx.changed() => {
                    let mode = if changed.is_ok() {
                        *stop_rx.borrow_and_update()
                    } else {
                        StopMode::Force
                    };
                    match mode {
                        StopMode::Run => {}
                        StopMode::Graceful => {
                            tracing::info!("slice pool stopping after in-flight slices");
                            state.draining = true;
                        }
                        StopMode::Force => {
                            tracing::info!("slice pool terminated");
                            state.terminate_all();
                            return Err(TransferError::Stopped);
                        }
                    }
                }
            }
        }
    }
}
