//! One slice worker: a spawned task serving assignments one at a time.

use std::sync::Arc;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::message::{WorkerEvent, WorkerRequest};
use super::SliceWork;
use crate::retry::{run_with_retry, RetryPolicy};

/// Controller-side handle. Dropping it terminates the worker.
pub(crate) struct WorkerHandle {
    pub(crate) id: usize,
    pub(crate) assigned: Option<usize>,
    tx: mpsc::UnboundedSender<WorkerRequest>,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    pub(crate) fn spawn<W: SliceWork>(
        id: usize,
        work: Arc<W>,
        retry: RetryPolicy,
        events: mpsc::UnboundedSender<WorkerEvent>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let join = tokio::spawn(serve(id, work, retry, rx, events));
        Self {
            id,
            assigned: None,
            tx,
            join,
        }
    }

    pub(crate) fn is_idle(&self) -> bool {
        self.assigned.is_none()
    }

    /// False when the worker is gone.
    pub(crate) fn assign(&mut self, index: usize) -> bool {
        if self.tx.send(WorkerRequest::Assign { index }).is_err() {
            return false;
        }
        self.assigned = Some(index);
        true
    }

    pub(crate) fn shutdown(&self) {
        let _ = self.tx.send(WorkerRequest::Shutdown);
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.join.abort();
    }
}

async fn serve<W: SliceWork>(
    id: usize,
    work: Arc<W>,
    retry: RetryPolicy,
    mut rx: mpsc::UnboundedReceiver<WorkerRequest>,
    events: mpsc::UnboundedSender<WorkerEvent>,
) {
    while let Some(request) = rx.recv().await {
        let event = match request {
            WorkerRequest::Assign { index } => {
                match run_with_retry(&retry, "slice", || work.run(index)).await {
                    Ok(output) => WorkerEvent::Done {
                        worker: id,
                        index,
                        output,
                    },
                    Err(error) => WorkerEvent::Failed {
                        worker: id,
                        index,
                        error,
                    },
                }
            }
            WorkerRequest::Shutdown => break,
        };
        if events.send(event).is_err() {
            break;
        }
    }
    tracing::trace!(worker = id, "slice worker exited");
}
