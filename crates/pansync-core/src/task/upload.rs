//! Upload task: local file → remote path.
//!
//! Steps: get-local-file-info → compute-local-digest → request-upload-session
//! → upload-slices → finalize-upload. Steps that read the source (or commit
//! it) first check that its size and mtime still match the first attempt.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;

use super::guard::{validate_for_resume, SourceSnapshot};
use super::source::SliceSource;
use super::{ResumePoint, Transfer, TransferInfo, TransferKind, TransferOptions};
use crate::codec::{
    file_md5, md5_hex, random_iv, ChunkCipher, ChunkLayout, EncryptionKey, Trailer, IV_LEN,
};
use crate::error::TransferError;
use crate::pool::{PoolControl, SliceOutput, SlicePool, SliceWork};
use crate::remote::{
    FinalizeRequest, PrecreateRequest, RemoteDisk, RemoteEntry, RemoteError, SliceUpload,
    UploadEndpointCache,
};
use crate::retry::run_with_retry;
use crate::slices::{SliceBitmap, SliceLedger};
use crate::step::{StatusChange, Step, StepFuture, StepRunner, StepStatus};

pub const GET_LOCAL_FILE_INFO: &str = "get-local-file-info";
pub const COMPUTE_LOCAL_DIGEST: &str = "compute-local-digest";
pub const REQUEST_UPLOAD_SESSION: &str = "request-upload-session";
pub const UPLOAD_SLICES: &str = "upload-slices";
pub const FINALIZE_UPLOAD: &str = "finalize-upload";

#[derive(Default)]
struct UploadState {
    snapshot: Option<SourceSnapshot>,
    layout: Option<ChunkLayout>,
    iv: Option<[u8; IV_LEN]>,
    digest: Option<String>,
    trailer: Option<Trailer>,
    /// Per-slice digests of the transfer stream; `None` until computed.
    block_list: Vec<Option<String>>,
    upload_id: Option<String>,
    entry: Option<RemoteEntry>,
    /// Recorded by an earlier process; consumed once the session is open.
    resume: Option<ResumePoint>,
}

struct UploadCtx {
    remote: Arc<dyn RemoteDisk>,
    endpoints: Arc<UploadEndpointCache>,
    local: PathBuf,
    remote_path: String,
    key: Option<EncryptionKey>,
    opts: TransferOptions,
    control: PoolControl,
    ledger: Mutex<SliceLedger>,
    bytes_moved: AtomicU64,
    state: Mutex<UploadState>,
}

type Ctx = Arc<UploadCtx>;

impl UploadCtx {
    fn state(&self) -> MutexGuard<'_, UploadState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ledger(&self) -> MutexGuard<'_, SliceLedger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn layout(&self) -> Result<ChunkLayout, TransferError> {
        self.state()
            .layout
            .ok_or_else(|| TransferError::Precondition("local file info missing".into()))
    }

    fn pool(&self) -> SlicePool {
        SlicePool::new(
            self.opts.threads,
            self.opts.retry,
            self.opts.pool_max_attempts,
            self.control.clone(),
        )
    }

    fn cipher(&self) -> Option<ChunkCipher> {
        let iv = self.state().iv?;
        Some(ChunkCipher::new(self.key.as_ref()?, iv))
    }

    fn block_list(&self) -> Result<Vec<String>, TransferError> {
        self.state()
            .block_list
            .iter()
            .cloned()
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| TransferError::Precondition("slice digests incomplete".into()))
    }

    async fn ensure_unchanged(&self) -> Result<(), TransferError> {
        let path = self.local.clone();
        let current = tokio::task::spawn_blocking(move || SourceSnapshot::capture(&path))
            .await
            .map_err(TransferError::join)??;
        let stored = self.state().snapshot;
        validate_for_resume(stored.as_ref(), &current).map_err(|change| {
            tracing::warn!(path = %self.local.display(), %change, "refusing to resume upload");
            TransferError::FileChanged {
                path: self.local.clone(),
            }
        })
    }

    async fn open_source(&self) -> Result<Arc<SliceSource>, TransferError> {
        let layout = self.layout()?;
        let cipher = self.cipher();
        let trailer = self.state().trailer.as_ref().map(Trailer::encode);
        let path = self.local.clone();
        let source =
            tokio::task::spawn_blocking(move || SliceSource::open(&path, layout, cipher, trailer))
                .await
                .map_err(TransferError::join)??;
        Ok(Arc::new(source))
    }
}

/// Digest of each slice of the transfer stream (the remote's block list).
struct DigestWork {
    source: Arc<SliceSource>,
}

#[async_trait]
impl SliceWork for DigestWork {
    async fn run(&self, index: usize) -> Result<SliceOutput, TransferError> {
        let source = self.source.clone();
        let digest = tokio::task::spawn_blocking(move || source.slice(index).map(|s| md5_hex(&s)))
            .await
            .map_err(TransferError::join)??;
        Ok(SliceOutput::with_payload(0, digest.into_bytes()))
    }
}

struct UploadWork {
    source: Arc<SliceSource>,
    remote: Arc<dyn RemoteDisk>,
    endpoints: Arc<UploadEndpointCache>,
    path: String,
    upload_id: String,
    block_list: Vec<String>,
}

#[async_trait]
impl SliceWork for UploadWork {
    async fn run(&self, index: usize) -> Result<SliceOutput, TransferError> {
        let source = self.source.clone();
        let data = tokio::task::spawn_blocking(move || source.slice(index))
            .await
            .map_err(TransferError::join)??;
        let endpoint = self.endpoints.get(self.remote.as_ref()).await?;
        let slice = SliceUpload {
            path: &self.path,
            upload_id: &self.upload_id,
            seq: index,
            data: &data,
        };
        let digest = match self.remote.upload_slice(&endpoint, slice).await {
            Ok(d) => d,
            Err(e) => {
                if matches!(e, RemoteError::Connection(_) | RemoteError::Timeout) {
                    self.endpoints.invalidate();
                }
                return Err(e.into());
            }
        };
        let expected = self.block_list.get(index).map(String::as_str).unwrap_or_default();
        if !digest.eq_ignore_ascii_case(expected) {
            return Err(TransferError::Integrity(format!(
                "slice {index}: remote digest {digest}, expected {expected}"
            )));
        }
        Ok(SliceOutput::bytes(data.len() as u64))
    }
}

fn get_local_file_info(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        let path = ctx.local.clone();
        let snapshot = tokio::task::spawn_blocking(move || SourceSnapshot::capture(&path))
            .await
            .map_err(TransferError::join)??;
        let layout = ChunkLayout::select(snapshot.size, ctx.key.is_some())?;
        let recorded_done = {
            let mut st = ctx.state();
            if let Err(change) = validate_for_resume(st.snapshot.as_ref(), &snapshot) {
                tracing::warn!(path = %ctx.local.display(), %change, "refusing to resume upload");
                return Err(TransferError::FileChanged {
                    path: ctx.local.clone(),
                });
            }
            let layout_matches = st.resume.as_ref().is_some_and(|r| {
                r.chunk_mb == Some(layout.chunk_mb()) && r.slice_count == layout.slice_count()
            });
            if st.resume.is_some() && !layout_matches {
                tracing::warn!(
                    path = %ctx.local.display(),
                    "recorded upload used another layout, starting over"
                );
                st.resume = None;
                st.upload_id = None;
                st.iv = None;
            }
            st.snapshot = Some(snapshot);
            st.layout = Some(layout);
            if ctx.key.is_some() && st.iv.is_none() {
                st.iv = Some(random_iv());
            }
            st.block_list = vec![None; layout.slice_count()];
            st.resume
                .as_ref()
                .map(ResumePoint::done_indices)
                .unwrap_or_default()
        };
        *ctx.ledger() = SliceLedger::with_done(layout.slice_count(), recorded_done);
        tracing::info!(
            path = %ctx.local.display(),
            size = snapshot.size,
            chunk_mb = layout.chunk_mb(),
            slices = layout.slice_count(),
            encrypted = layout.encrypted(),
            "upload planned"
        );
        Ok(())
    })
}

fn compute_local_digest(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        ctx.ensure_unchanged().await?;
        let layout = ctx.layout()?;

        let need_digest = ctx.state().digest.is_none();
        if need_digest {
            let path = ctx.local.clone();
            let size = layout.original_size();
            let digest = tokio::task::spawn_blocking(move || file_md5(&path, Some(size)))
                .await
                .map_err(TransferError::join)??;
            tracing::debug!(%digest, "content digest computed");
            let mut st = ctx.state();
            if let Some(iv) = st.iv {
                st.trailer = Some(Trailer::new(iv, &digest, size, layout.chunk_mb())?);
            }
            st.digest = Some(digest);
        }

        let source = ctx.open_source().await?;
        let done: Vec<usize> = ctx
            .state()
            .block_list
            .iter()
            .enumerate()
            .filter(|(_, d)| d.is_some())
            .map(|(i, _)| i)
            .collect();
        let ledger = Mutex::new(SliceLedger::with_done(layout.slice_count(), done));
        let mut digests = Vec::new();
        let result = ctx
            .pool()
            .run(&ledger, Arc::new(DigestWork { source }), |index, out| {
                if let Some(d) = out.payload {
                    digests.push((index, String::from_utf8_lossy(&d).into_owned()));
                }
            })
            .await;
        {
            let mut st = ctx.state();
            for (index, digest) in digests {
                if let Some(slot) = st.block_list.get_mut(index) {
                    *slot = Some(digest);
                }
            }
        }
        result
    })
}

fn request_upload_session(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        let layout = ctx.layout()?;
        let local_mtime = ctx.state().snapshot.map(|s| s.mtime).unwrap_or(0);
        let req = PrecreateRequest {
            path: ctx.remote_path.clone(),
            size: layout.transfer_size(),
            block_list: ctx.block_list()?,
            ondup: ctx.opts.ondup,
            local_mtime,
        };
        let remote = &ctx.remote;
        let resp = run_with_retry(&ctx.opts.retry, "precreate", || async {
            Ok(remote.precreate(&req).await?)
        })
        .await?;

        let present: Vec<usize> = resp
            .present
            .iter()
            .copied()
            .filter(|&i| i < layout.slice_count())
            .collect();
        if !present.is_empty() {
            tracing::info!(present = present.len(), "remote already holds slices of this session");
        }
        let mut done = present;
        if let Some(point) = ctx.state().resume.take() {
            match &point.upload_id {
                Some(id) if *id == resp.upload_id => {
                    done.extend(point.done_indices());
                    tracing::info!(upload_id = %id, "resuming recorded upload session");
                }
                Some(id) => {
                    tracing::info!(old = %id, new = %resp.upload_id, "recorded upload session is gone");
                }
                None => {}
            }
        }
        *ctx.ledger() = SliceLedger::with_done(layout.slice_count(), done);
        ctx.state().upload_id = Some(resp.upload_id);
        Ok(())
    })
}

fn upload_slices(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        ctx.ensure_unchanged().await?;
        let upload_id = ctx
            .state()
            .upload_id
            .clone()
            .ok_or_else(|| TransferError::Precondition("no upload session".into()))?;
        let work = Arc::new(UploadWork {
            source: ctx.open_source().await?,
            remote: ctx.remote.clone(),
            endpoints: ctx.endpoints.clone(),
            path: ctx.remote_path.clone(),
            upload_id,
            block_list: ctx.block_list()?,
        });
        let moved = &ctx.bytes_moved;
        ctx.pool()
            .run(&ctx.ledger, work, |_, out| {
                moved.fetch_add(out.bytes, Ordering::Relaxed);
            })
            .await
    })
}

fn finalize_upload(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        ctx.ensure_unchanged().await?;
        let layout = ctx.layout()?;
        let (upload_id, mtime) = {
            let st = ctx.state();
            (st.upload_id.clone(), st.snapshot.map(|s| s.mtime).unwrap_or(0))
        };
        let req = FinalizeRequest {
            path: ctx.remote_path.clone(),
            size: layout.transfer_size(),
            upload_id: upload_id
                .ok_or_else(|| TransferError::Precondition("no upload session".into()))?,
            block_list: ctx.block_list()?,
            ondup: ctx.opts.ondup,
            local_mtime: mtime,
        };
        let remote = &ctx.remote;
        let entry = run_with_retry(&ctx.opts.retry, "finalize", || async {
            Ok(remote.finalize(&req).await?)
        })
        .await?;
        if entry.size != layout.transfer_size() {
            return Err(TransferError::Integrity(format!(
                "remote committed {} bytes, expected {}",
                entry.size,
                layout.transfer_size()
            )));
        }
        tracing::info!(remote = %entry.path, size = entry.size, "upload finished");
        ctx.state().entry = Some(entry);
        Ok(())
    })
}

fn stop_pool(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        ctx.control.stop(false);
        Ok(())
    })
}

pub struct UploadTask {
    ctx: Ctx,
    runner: StepRunner<Ctx>,
    terminated: AtomicBool,
}

impl UploadTask {
    /// Fails immediately on a malformed key.
    pub fn new(
        remote: Arc<dyn RemoteDisk>,
        endpoints: Arc<UploadEndpointCache>,
        local: impl Into<PathBuf>,
        remote_path: impl Into<String>,
        key: Option<&str>,
        opts: TransferOptions,
    ) -> Result<Self, TransferError> {
        let key = key.map(EncryptionKey::parse).transpose()?;
        let ctx = Arc::new(UploadCtx {
            remote,
            endpoints,
            local: local.into(),
            remote_path: remote_path.into(),
            key,
            opts,
            control: PoolControl::new(),
            ledger: Mutex::new(SliceLedger::new(0)),
            bytes_moved: AtomicU64::new(0),
            state: Mutex::new(UploadState::default()),
        });
        let runner = StepRunner::new(vec![
            Step::new(GET_LOCAL_FILE_INFO, get_local_file_info),
            Step::new(COMPUTE_LOCAL_DIGEST, compute_local_digest).with_cancel(stop_pool),
            Step::new(REQUEST_UPLOAD_SESSION, request_upload_session),
            Step::new(UPLOAD_SLICES, upload_slices).with_cancel(stop_pool),
            Step::new(FINALIZE_UPLOAD, finalize_upload),
        ]);
        Ok(Self {
            ctx,
            runner,
            terminated: AtomicBool::new(false),
        })
    }

    /// Continue a transfer an earlier process recorded. The source must still
    /// match the recorded size and mtime, else the first step fails with
    /// [`TransferError::FileChanged`].
    pub fn resume_from(self, point: ResumePoint) -> Self {
        {
            let mut st = self.ctx.state();
            st.snapshot = point.source;
            st.upload_id = point.upload_id.clone();
            if self.ctx.key.is_some() {
                st.iv = point.iv;
            }
            st.resume = Some(point);
        }
        self
    }

    /// Committed remote file, once finished.
    pub fn entry(&self) -> Option<RemoteEntry> {
        self.ctx.state().entry.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.ctx.state().upload_id.clone()
    }

    /// Whole-file plaintext digest, once computed.
    pub fn content_digest(&self) -> Option<String> {
        self.ctx.state().digest.clone()
    }

    pub fn completed_steps(&self) -> Vec<&'static str> {
        self.runner.completed_steps()
    }
}

#[async_trait]
impl Transfer for UploadTask {
    async fn run(&self) -> Result<StepStatus, TransferError> {
        if self.terminated.load(Ordering::SeqCst) {
            return Ok(StepStatus::Stopped);
        }
        if self.runner.status() != StepStatus::Running {
            self.ctx.control.reset();
        }
        self.runner.run(self.ctx.clone()).await
    }

    async fn stop(&self) {
        self.runner.stop().await;
    }

    async fn terminate(&self) {
        self.terminated.store(true, Ordering::SeqCst);
        self.ctx.control.stop(true);
        self.runner.stop().await;
    }

    fn info(&self) -> TransferInfo {
        let layout = self.ctx.state().layout;
        let (slices_done, slice_count) = {
            let ledger = self.ctx.ledger();
            (ledger.done_count(), ledger.total())
        };
        TransferInfo {
            kind: TransferKind::Upload,
            local: self.ctx.local.clone(),
            remote: self.ctx.remote_path.clone(),
            original_size: layout.map(|l| l.original_size()),
            transfer_size: layout.map(|l| l.transfer_size()),
            chunk_mb: layout.map(|l| l.chunk_mb()),
            bytes_moved: self.ctx.bytes_moved.load(Ordering::Relaxed),
            slices_done,
            slice_count,
            step: self.runner.current_step(),
            status: self.runner.status(),
            last_error: self.runner.last_error(),
        }
    }

    fn subscribe(&self) -> watch::Receiver<StatusChange> {
        self.runner.subscribe()
    }

    fn done_bitmap(&self) -> SliceBitmap {
        self.ctx.ledger().bitmap()
    }

    fn resume_point(&self) -> ResumePoint {
        let (source, layout, iv, upload_id, pending) = {
            let st = self.ctx.state();
            (st.snapshot, st.layout, st.iv, st.upload_id.clone(), st.resume.clone())
        };
        let ledger = self.ctx.ledger();
        // Seeded but not planned yet: report the recorded point.
        if let Some(point) = pending.filter(|_| ledger.total() == 0) {
            return point;
        }
        ResumePoint {
            source,
            chunk_mb: layout.map(|l| l.chunk_mb()),
            iv,
            upload_id,
            slice_count: ledger.total(),
            done: ledger.bitmap(),
        }
    }
}
