//! Per-task pool of slice workers.
//!
//! Workers are spawned tasks that talk to the controller only through typed
//! messages: the controller sends [`WorkerRequest`]s over a per-worker channel,
//! workers answer with exactly one [`WorkerEvent`] per assignment. The
//! controller owns the [`SliceLedger`](crate::slices::SliceLedger) mutations:
//! dispatch, requeue on failure, pool respawn, and stop.

mod control;
mod controller;
mod message;
mod worker;

use async_trait::async_trait;

use crate::error::TransferError;

pub use control::{PoolControl, StopMode};
pub use controller::SlicePool;
pub use message::{SliceOutput, WorkerEvent, WorkerRequest};

/// Work performed for one slice index.
#[async_trait]
pub trait SliceWork: Send + Sync + 'static {
    async fn run(&self, index: usize) -> Result<SliceOutput, TransferError>;
}
