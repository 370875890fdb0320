//! One synced folder: its sync pass and pending transfer queues.
//!
//! A pass scans both sides, diffs them, applies folder creates and deletes
//! right away (local ones one at a time, remote deletes in batches), and
//! queues uploads and downloads for the account scheduler to pull.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{Context, Result};

use super::diff::{diff_trees, plan_sync, SyncPlan, SyncPolicy};
use super::exclude::ExcludeSet;
use super::tree::{scan_local, TreeSnapshot};
use crate::config::FolderConfig;
use crate::remote::{join_remote, RemoteDisk, RemoteError};
use crate::scheduler::ListingQueue;
use crate::task::TransferKind;

/// Remote paths per delete call.
pub const REMOTE_DELETE_BATCH: usize = 50;

/// An upload or download waiting for a scheduler slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedTransfer {
    pub folder: String,
    pub kind: TransferKind,
    /// Path relative to the sync root.
    pub relative: String,
    pub local: PathBuf,
    pub remote: String,
}

/// Counts of what a pass did and queued.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub uploads_queued: usize,
    pub downloads_queued: usize,
    pub local_created: usize,
    pub local_deleted: usize,
    pub remote_created: usize,
    pub remote_deleted: usize,
}

#[derive(Default)]
struct FolderQueues {
    upload: VecDeque<String>,
    download: VecDeque<String>,
    /// Relative paths with a transfer task running.
    active: HashSet<String>,
    /// Alternate between the two queues when pulling.
    download_next: bool,
}

/// Clears the processing flag when a pass ends, however it ends.
struct ProcessingGuard<'a>(&'a AtomicBool);

impl Drop for ProcessingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

pub struct Folder {
    id: String,
    local_root: PathBuf,
    remote_root: String,
    key: Option<String>,
    policy: SyncPolicy,
    excludes: ExcludeSet,
    queues: Mutex<FolderQueues>,
    processing: AtomicBool,
}

impl Folder {
    pub fn from_config(cfg: &FolderConfig) -> Self {
        Self {
            id: cfg.id.clone(),
            local_root: cfg.local.clone(),
            remote_root: join_remote("/", &cfg.remote),
            key: cfg.key.clone(),
            policy: SyncPolicy {
                direction: cfg.direction,
                conflict: cfg.conflict,
                delete: cfg.delete,
            },
            excludes: ExcludeSet::new(&cfg.exclude),
            queues: Mutex::new(FolderQueues::default()),
            processing: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn local_root(&self) -> &PathBuf {
        &self.local_root
    }

    pub fn remote_root(&self) -> &str {
        &self.remote_root
    }

    pub fn is_processing(&self) -> bool {
        self.processing.load(Ordering::SeqCst)
    }

    fn queues(&self) -> MutexGuard<'_, FolderQueues> {
        self.queues.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Uploads and downloads still waiting.
    pub fn queued(&self) -> usize {
        let q = self.queues();
        q.upload.len() + q.download.len()
    }

    /// Drop everything still queued (the folder was stopped).
    pub fn clear_queues(&self) {
        let mut q = self.queues();
        q.upload.clear();
        q.download.clear();
    }

    /// Next queued transfer, alternating uploads and downloads.
    pub fn pop_transfer(&self) -> Option<QueuedTransfer> {
        let mut q = self.queues();
        let (kind, relative) = if q.download_next {
            q.download
                .pop_front()
                .map(|r| (TransferKind::Download, r))
                .or_else(|| q.upload.pop_front().map(|r| (TransferKind::Upload, r)))
        } else {
            q.upload
                .pop_front()
                .map(|r| (TransferKind::Upload, r))
                .or_else(|| q.download.pop_front().map(|r| (TransferKind::Download, r)))
        }?;
        q.download_next = kind == TransferKind::Upload;
        q.active.insert(relative.clone());
        drop(q);
        Some(self.transfer(kind, relative))
    }

    /// A task pulled with [`pop_transfer`](Self::pop_transfer) ended.
    pub fn transfer_done(&self, relative: &str) {
        self.queues().active.remove(relative);
    }

    fn transfer(&self, kind: TransferKind, relative: String) -> QueuedTransfer {
        QueuedTransfer {
            folder: self.id.clone(),
            kind,
            local: self.local_path(&relative),
            remote: join_remote(&self.remote_root, &relative),
            relative,
        }
    }

    fn local_path(&self, relative: &str) -> PathBuf {
        relative
            .split('/')
            .fold(self.local_root.clone(), |p, part| p.join(part))
    }

    fn enqueue(&self, plan: &SyncPlan) -> (usize, usize) {
        let mut q = self.queues();
        let mut added = (0, 0);
        for rel in &plan.upload {
            if !q.active.contains(rel) && !q.upload.contains(rel) {
                q.upload.push_back(rel.clone());
                added.0 += 1;
            }
        }
        for rel in &plan.download {
            if !q.active.contains(rel) && !q.download.contains(rel) {
                q.download.push_back(rel.clone());
                added.1 += 1;
            }
        }
        added
    }

    /// Compute the diff for this folder without applying anything.
    pub async fn plan(&self, listing: &ListingQueue, remote: &dyn RemoteDisk) -> Result<SyncPlan> {
        let root = self.local_root.clone();
        tokio::fs::create_dir_all(&root)
            .await
            .with_context(|| format!("creating local root {}", root.display()))?;
        let excludes = self.excludes.clone();
        let local = tokio::task::spawn_blocking(move || scan_local(&root, &excludes))
            .await?
            .with_context(|| format!("scanning {}", self.local_root.display()))?;

        let entries = match listing.list_all(&self.remote_root).await {
            Ok(entries) => entries,
            Err(RemoteError::NotFound(_)) => {
                remote
                    .create_folder(&self.remote_root)
                    .await
                    .with_context(|| format!("creating remote root {}", self.remote_root))?;
                Vec::new()
            }
            Err(e) => {
                return Err(e).with_context(|| format!("listing {}", self.remote_root));
            }
        };
        let remote_tree = TreeSnapshot::from_remote(&self.remote_root, &entries, &self.excludes);

        let diff = diff_trees(&local, &remote_tree, self.key.is_some());
        Ok(plan_sync(&diff, self.policy))
    }

    /// One sync pass. Returns `None` when a pass is already running.
    pub async fn run_sync(
        &self,
        listing: &ListingQueue,
        remote: &Arc<dyn RemoteDisk>,
    ) -> Result<Option<SyncReport>> {
        if self.processing.swap(true, Ordering::SeqCst) {
            tracing::debug!(folder = %self.id, "sync pass already running, trigger ignored");
            return Ok(None);
        }
        let _guard = ProcessingGuard(&self.processing);

        let plan = self.plan(listing, remote.as_ref()).await?;
        let mut report = SyncReport::default();

        for rel in &plan.local_create {
            let path = self.local_path(rel);
            tokio::fs::create_dir_all(&path)
                .await
                .with_context(|| format!("creating {}", path.display()))?;
            report.local_created += 1;
        }
        for rel in &plan.local_delete {
            let path = self.local_path(rel);
            let res = match tokio::fs::symlink_metadata(&path).await {
                Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(&path).await,
                Ok(_) => tokio::fs::remove_file(&path).await,
                Err(e) => Err(e),
            };
            match res {
                Ok(()) => report.local_deleted += 1,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    return Err(e).with_context(|| format!("deleting {}", path.display()));
                }
            }
        }

        for rel in &plan.remote_create {
            let path = join_remote(&self.remote_root, rel);
            remote
                .create_folder(&path)
                .await
                .with_context(|| format!("creating remote folder {path}"))?;
            report.remote_created += 1;
        }
        let deletes: Vec<String> = plan
            .remote_delete
            .iter()
            .map(|rel| join_remote(&self.remote_root, rel))
            .collect();
        for batch in deletes.chunks(REMOTE_DELETE_BATCH) {
            remote
                .delete_paths(batch)
                .await
                .with_context(|| format!("deleting {} remote paths", batch.len()))?;
            report.remote_deleted += batch.len();
        }

        (report.uploads_queued, report.downloads_queued) = self.enqueue(&plan);
        tracing::info!(
            folder = %self.id,
            uploads = report.uploads_queued,
            downloads = report.downloads_queued,
            local_created = report.local_created,
            local_deleted = report.local_deleted,
            remote_created = report.remote_created,
            remote_deleted = report.remote_deleted,
            "sync pass done"
        );
        Ok(Some(report))
    }
}
