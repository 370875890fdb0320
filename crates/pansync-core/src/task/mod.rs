//! Transfer tasks: resumable upload and download state machines.
//!
//! Each task is a [`StepRunner`](crate::step::StepRunner) over a shared
//! context; the slice-moving steps delegate to a [`SlicePool`](crate::pool::SlicePool)
//! and the chunk codec. Tasks report through a status watch channel and a
//! [`TransferInfo`] snapshot.

mod download;
mod guard;
mod source;
mod upload;

use async_trait::async_trait;
use std::path::PathBuf;
use tokio::sync::watch;

use crate::codec::IV_LEN;
use crate::config::PanSyncConfig;
use crate::error::TransferError;
use crate::remote::OnDuplicate;
use crate::retry::RetryPolicy;
use crate::slices::SliceBitmap;
use crate::step::{StatusChange, StepStatus};

pub use download::DownloadTask;
pub use guard::{validate_for_resume, SourceChange, SourceSnapshot};
pub use source::SliceSource;
pub use upload::UploadTask;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferKind {
    Upload,
    Download,
}

impl TransferKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferKind::Upload => "upload",
            TransferKind::Download => "download",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "upload" => Some(TransferKind::Upload),
            "download" => Some(TransferKind::Download),
            _ => None,
        }
    }
}

/// Knobs shared by every task a scheduler or the CLI creates.
#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Slice workers per task.
    pub threads: usize,
    /// Per-call retry (remote calls and each slice inside a worker).
    pub retry: RetryPolicy,
    /// Pools spawned at most per slice step.
    pub pool_max_attempts: u32,
    pub ondup: OnDuplicate,
    /// Re-read downloads from disk and compare digests before finishing.
    pub verify: bool,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            threads: 4,
            retry: RetryPolicy::default(),
            pool_max_attempts: 3,
            ondup: OnDuplicate::Overwrite,
            verify: true,
        }
    }
}

impl TransferOptions {
    pub fn from_config(cfg: &PanSyncConfig) -> Self {
        let retry = cfg.retry_config();
        Self {
            threads: cfg.worker_threads.max(1),
            retry: retry.policy(),
            pool_max_attempts: retry.pool_max_attempts.max(1),
            ondup: OnDuplicate::Overwrite,
            verify: cfg.verify_downloads,
        }
    }
}

/// Snapshot of a task for status displays.
#[derive(Debug, Clone)]
pub struct TransferInfo {
    pub kind: TransferKind,
    pub local: PathBuf,
    pub remote: String,
    pub original_size: Option<u64>,
    pub transfer_size: Option<u64>,
    pub chunk_mb: Option<u32>,
    pub bytes_moved: u64,
    pub slices_done: usize,
    pub slice_count: usize,
    pub step: Option<&'static str>,
    pub status: StepStatus,
    pub last_error: Option<String>,
}

/// Where an earlier attempt of a transfer left off, as persisted between
/// processes. A task seeded with it re-checks the source against `source`
/// and skips the slices in `done` when the layout still matches.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResumePoint {
    /// Source size and mtime captured on the first attempt.
    pub source: Option<SourceSnapshot>,
    pub chunk_mb: Option<u32>,
    /// Upload IV; an encrypted upload must reuse it to reproduce its slices.
    pub iv: Option<[u8; IV_LEN]>,
    pub upload_id: Option<String>,
    pub slice_count: usize,
    pub done: SliceBitmap,
}

impl ResumePoint {
    pub fn done_indices(&self) -> Vec<usize> {
        self.done.iter_set(self.slice_count).collect()
    }
}

/// Surface shared by upload and download tasks.
#[async_trait]
pub trait Transfer: Send + Sync {
    /// Run the remaining steps. No-op once finished.
    async fn run(&self) -> Result<StepStatus, TransferError>;

    /// Cooperative stop: in-flight slices finish, then the task parks.
    async fn stop(&self);

    /// Stop now and drop partial local output.
    async fn terminate(&self);

    fn info(&self) -> TransferInfo;

    fn subscribe(&self) -> watch::Receiver<StatusChange>;

    /// Persisted form of the done-slice set.
    fn done_bitmap(&self) -> SliceBitmap;

    /// State to persist so a later process can pick the transfer up.
    fn resume_point(&self) -> ResumePoint;
}
