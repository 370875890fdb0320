//! Download task: remote path → local file.
//!
//! Chunks are fetched by range into a preallocated `<final>.part`, decrypted
//! when a key is set, and folded into an ordered content digest. The `.part`
//! file is renamed onto the final path only in the last step. When chunks
//! arrive too far out of order, or a recorded `.part` is resumed, the digest
//! is read back from the `.part` file instead.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tokio::sync::watch;

use super::guard::{validate_for_resume, SourceSnapshot};
use super::{ResumePoint, Transfer, TransferInfo, TransferKind, TransferOptions};
use crate::codec::{
    file_md5, ChunkCipher, ChunkLayout, EncryptionKey, OrderedDigest, Trailer, TRAILER_LEN,
};
use crate::error::TransferError;
use crate::pool::{PoolControl, SliceOutput, SlicePool, SliceWork};
use crate::remote::{RemoteDisk, RemoteEntry, RemoteError};
use crate::retry::run_with_retry;
use crate::slices::{SliceBitmap, SliceLedger};
use crate::step::{StatusChange, Step, StepFuture, StepRunner, StepStatus};
use crate::storage::{part_path, set_mtime, PartFile, PartFileBuilder};

pub const RESOLVE_REMOTE_ID: &str = "resolve-remote-id";
pub const FETCH_REMOTE_LINK: &str = "fetch-remote-link";
pub const VALIDATE_DOWNLOAD_PRECONDITIONS: &str = "validate-download-preconditions";
pub const FETCH_DECRYPT_HEADER: &str = "fetch-decrypt-header";
pub const PREALLOCATE_LOCAL_FILE: &str = "preallocate-local-file";
pub const DOWNLOAD_SLICES: &str = "download-slices";
pub const VERIFY_DIGEST_ON_DISK: &str = "verify-digest-on-disk";
pub const SET_LOCAL_MTIME: &str = "set-local-mtime";
pub const FINISH: &str = "finish";

/// Chunks each worker may run ahead of the digest cursor before the
/// streamed digest gives way to a read-back.
const REORDER_CHUNKS_PER_WORKER: usize = 2;

#[derive(Default)]
struct DownloadState {
    entry: Option<RemoteEntry>,
    link: Option<String>,
    layout: Option<ChunkLayout>,
    trailer: Option<Trailer>,
    part: Option<PartFile>,
    /// Plaintext digest, once every chunk was folded in.
    digest: Option<String>,
    /// The digest was computed from the `.part` file rather than streamed.
    digest_from_disk: bool,
    finished: bool,
    /// Recorded by an earlier process; consumed when the `.part` is opened.
    resume: Option<ResumePoint>,
}

struct DownloadCtx {
    remote: Arc<dyn RemoteDisk>,
    remote_path: String,
    local: PathBuf,
    part: PathBuf,
    key: Option<EncryptionKey>,
    opts: TransferOptions,
    control: PoolControl,
    ledger: Mutex<SliceLedger>,
    ordered: Mutex<OrderedDigest>,
    bytes_moved: AtomicU64,
    state: Mutex<DownloadState>,
}

type Ctx = Arc<DownloadCtx>;

impl DownloadCtx {
    fn state(&self) -> MutexGuard<'_, DownloadState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ledger(&self) -> MutexGuard<'_, SliceLedger> {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn ordered(&self) -> MutexGuard<'_, OrderedDigest> {
        self.ordered.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn entry(&self) -> Result<RemoteEntry, TransferError> {
        self.state()
            .entry
            .clone()
            .ok_or_else(|| TransferError::Precondition("remote file not resolved".into()))
    }

    fn layout(&self) -> Result<ChunkLayout, TransferError> {
        self.state()
            .layout
            .ok_or_else(|| TransferError::Precondition("download layout unknown".into()))
    }

    fn link(&self) -> Result<String, TransferError> {
        self.state()
            .link
            .clone()
            .ok_or_else(|| TransferError::Precondition("no download link".into()))
    }

    fn part_file(&self) -> Result<PartFile, TransferError> {
        if let Some(part) = self.state().part.clone() {
            return Ok(part);
        }
        let part = PartFile::open_existing(&self.part)?;
        self.state().part = Some(part.clone());
        Ok(part)
    }
}

struct DownloadWork {
    remote: Arc<dyn RemoteDisk>,
    link: String,
    layout: ChunkLayout,
    cipher: Option<ChunkCipher>,
    part: PartFile,
}

#[async_trait]
impl SliceWork for DownloadWork {
    async fn run(&self, index: usize) -> Result<SliceOutput, TransferError> {
        let span = self.layout.chunk(index);
        let data = if span.stream_len == 0 {
            Vec::new()
        } else {
            let end = span.stream_offset + span.stream_len;
            let data = self
                .remote
                .range_fetch(&self.link, span.stream_offset, end)
                .await?;
            if data.len() as u64 != span.stream_len {
                return Err(RemoteError::Connection(format!(
                    "short read for chunk {index}: {} of {} bytes",
                    data.len(),
                    span.stream_len
                ))
                .into());
            }
            data
        };
        let moved = data.len() as u64;

        let plain = match &self.cipher {
            Some(cipher) => cipher
                .decrypt(&data)
                .map_err(|e| TransferError::Integrity(format!("chunk {index}: {e}")))?,
            None => data,
        };
        if plain.len() as u64 != span.plain_len {
            return Err(TransferError::Integrity(format!(
                "chunk {index} decoded to {} bytes, expected {}",
                plain.len(),
                span.plain_len
            )));
        }

        let part = self.part.clone();
        let plain = tokio::task::spawn_blocking(move || {
            part.write_at(span.plain_offset, &plain).map(|()| plain)
        })
        .await
        .map_err(TransferError::join)??;
        Ok(SliceOutput::with_payload(moved, plain))
    }
}

fn resolve_remote_id(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        let remote = &ctx.remote;
        let path = &ctx.remote_path;
        let entry = run_with_retry(&ctx.opts.retry, "file meta", || async {
            Ok(remote.file_meta(path).await?)
        })
        .await?
        .ok_or_else(|| RemoteError::NotFound(ctx.remote_path.clone()))?;
        if entry.is_dir {
            return Err(TransferError::Precondition(format!(
                "{} is a remote folder",
                entry.path
            )));
        }
        tracing::debug!(remote = %entry.path, fsid = entry.fsid, size = entry.size, "remote file resolved");
        let mut st = ctx.state();
        let current = SourceSnapshot {
            size: entry.size,
            mtime: entry.mtime,
        };
        let recorded = st.resume.as_ref().and_then(|p| p.source);
        if let Err(change) = validate_for_resume(recorded.as_ref(), &current) {
            tracing::warn!(remote = %entry.path, %change, "remote file changed since the recorded attempt, starting over");
            st.resume = None;
        }
        st.entry = Some(entry);
        Ok(())
    })
}

fn fetch_remote_link(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        let fsid = ctx.entry()?.fsid;
        let remote = &ctx.remote;
        let link = run_with_retry(&ctx.opts.retry, "download link", || async {
            Ok(remote.download_link(fsid).await?)
        })
        .await?;
        ctx.state().link = Some(link);
        Ok(())
    })
}

fn validate_download_preconditions(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        let entry = ctx.entry()?;
        if ctx.local.is_dir() {
            return Err(TransferError::Precondition(format!(
                "{} is a local folder",
                ctx.local.display()
            )));
        }
        if let Some(parent) = ctx.local.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        if ctx.key.is_some() {
            if entry.size < TRAILER_LEN as u64 {
                return Err(TransferError::Integrity(format!(
                    "{} is {} bytes, too short to be encrypted",
                    entry.path, entry.size
                )));
            }
        } else {
            ctx.state().layout = Some(ChunkLayout::for_ranges(entry.size));
        }
        Ok(())
    })
}

fn fetch_decrypt_header(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        if ctx.key.is_none() {
            return Ok(());
        }
        let entry = ctx.entry()?;
        let link = ctx.link()?;
        let start = entry.size - TRAILER_LEN as u64;
        let remote = &ctx.remote;
        let bytes = run_with_retry(&ctx.opts.retry, "trailer fetch", || async {
            Ok(remote.range_fetch(&link, start, entry.size).await?)
        })
        .await?;
        let trailer = Trailer::decode(&bytes)?;
        let layout = ChunkLayout::from_parts(trailer.original_size, trailer.chunk_mb, true)?;
        if layout.transfer_size() != entry.size {
            return Err(TransferError::Integrity(format!(
                "trailer describes {} transfer bytes, remote holds {}",
                layout.transfer_size(),
                entry.size
            )));
        }
        tracing::debug!(
            original_size = trailer.original_size,
            chunk_mb = trailer.chunk_mb,
            "trailer decoded"
        );
        let mut st = ctx.state();
        st.layout = Some(layout);
        st.trailer = Some(trailer);
        Ok(())
    })
}

fn preallocate_local_file(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        let layout = ctx.layout()?;
        let recorded_done = ctx
            .state()
            .resume
            .take()
            .filter(|p| {
                p.chunk_mb == Some(layout.chunk_mb()) && p.slice_count == layout.chunk_count()
            })
            .map(|p| p.done_indices())
            .filter(|done| !done.is_empty());
        let path = ctx.part.clone();
        let size = layout.original_size();
        let (part, resumed) = tokio::task::spawn_blocking(move || {
            if let Some(done) = recorded_done {
                let existing = std::fs::metadata(&path).map(|m| m.len()).ok();
                if existing == Some(size) {
                    return Ok((PartFile::open_existing(&path)?, Some(done)));
                }
            }
            let mut builder = PartFileBuilder::create(&path)?;
            builder.preallocate(size)?;
            Ok::<_, std::io::Error>((builder.build(), None))
        })
        .await
        .map_err(TransferError::join)??;
        ctx.state().part = Some(part);

        let mut ordered =
            OrderedDigest::with_window(ctx.opts.threads.max(1) * REORDER_CHUNKS_PER_WORKER);
        let ledger = match resumed {
            Some(done) => {
                tracing::info!(part = %ctx.part.display(), done = done.len(), "resuming partial download");
                ordered.spill();
                SliceLedger::with_done(layout.chunk_count(), done)
            }
            None => SliceLedger::new(layout.chunk_count()),
        };
        *ctx.ledger() = ledger;
        *ctx.ordered() = ordered;
        tracing::info!(
            part = %ctx.part.display(),
            size,
            chunks = layout.chunk_count(),
            "download planned"
        );
        Ok(())
    })
}

fn download_slices(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        let layout = ctx.layout()?;
        let cipher = match (&ctx.key, ctx.state().trailer.as_ref()) {
            (Some(key), Some(trailer)) => Some(ChunkCipher::new(key, trailer.iv)),
            _ => None,
        };
        let work = Arc::new(DownloadWork {
            remote: ctx.remote.clone(),
            link: ctx.link()?,
            layout,
            cipher,
            part: ctx.part_file()?,
        });
        let pool = SlicePool::new(
            ctx.opts.threads,
            ctx.opts.retry,
            ctx.opts.pool_max_attempts,
            ctx.control.clone(),
        );
        pool.run(&ctx.ledger, work, |index, out| {
            ctx.bytes_moved.fetch_add(out.bytes, Ordering::Relaxed);
            if let Some(plain) = out.payload {
                ctx.ordered().push(index, plain);
            }
        })
        .await?;

        ctx.part_file()?.sync()?;
        let (streamed, spilled) = {
            let ordered = ctx.ordered();
            (ordered.finish(layout.chunk_count()), ordered.is_spilled())
        };
        let digest = match streamed {
            Some(digest) => digest,
            None if spilled => {
                let path = ctx.part.clone();
                let size = layout.original_size();
                tokio::task::spawn_blocking(move || file_md5(&path, Some(size)))
                    .await
                    .map_err(TransferError::join)??
            }
            None => return Err(TransferError::Integrity("content digest missing chunks".into())),
        };
        if let Some(trailer) = ctx.state().trailer.as_ref() {
            if !trailer.matches_digest(&digest) {
                return Err(TransferError::Integrity(format!(
                    "content digest {digest} does not match trailer fragment {}",
                    trailer.digest_middle()
                )));
            }
        }
        let mut st = ctx.state();
        st.digest = Some(digest);
        st.digest_from_disk = spilled;
        Ok(())
    })
}

fn verify_digest_on_disk(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        if !ctx.opts.verify || ctx.state().digest_from_disk {
            return Ok(());
        }
        let layout = ctx.layout()?;
        let expected = ctx
            .state()
            .digest
            .clone()
            .ok_or_else(|| TransferError::Precondition("content digest missing".into()))?;
        let path = ctx.part.clone();
        let size = layout.original_size();
        let on_disk = tokio::task::spawn_blocking(move || file_md5(&path, Some(size)))
            .await
            .map_err(TransferError::join)??;
        if on_disk != expected {
            return Err(TransferError::Integrity(format!(
                "{} digest {on_disk}, expected {expected}",
                ctx.part.display()
            )));
        }
        Ok(())
    })
}

fn set_local_mtime(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        let mtime = ctx.entry()?.mtime;
        let path = ctx.part.clone();
        tokio::task::spawn_blocking(move || set_mtime(&path, mtime))
            .await
            .map_err(TransferError::join)??;
        Ok(())
    })
}

fn finish(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        let part = ctx.part_file()?;
        ctx.state().part = None;
        let local = ctx.local.clone();
        tokio::task::spawn_blocking(move || part.finalize(&local))
            .await
            .map_err(TransferError::join)??;
        ctx.state().finished = true;
        tracing::info!(local = %ctx.local.display(), "download finished");
        Ok(())
    })
}

fn stop_pool(ctx: Ctx) -> StepFuture {
    Box::pin(async move {
        ctx.control.stop(false);
        Ok(())
    })
}

pub struct DownloadTask {
    ctx: Ctx,
    runner: StepRunner<Ctx>,
    terminated: AtomicBool,
}

impl DownloadTask {
    /// Fails immediately on a malformed key.
    pub fn new(
        remote: Arc<dyn RemoteDisk>,
        remote_path: impl Into<String>,
        local: impl Into<PathBuf>,
        key: Option<&str>,
        opts: TransferOptions,
    ) -> Result<Self, TransferError> {
        let key = key.map(EncryptionKey::parse).transpose()?;
        let local = local.into();
        let ctx = Arc::new(DownloadCtx {
            remote,
            remote_path: remote_path.into(),
            part: part_path(&local),
            local,
            key,
            opts,
            control: PoolControl::new(),
            ledger: Mutex::new(SliceLedger::new(0)),
            ordered: Mutex::new(OrderedDigest::new()),
            bytes_moved: AtomicU64::new(0),
            state: Mutex::new(DownloadState::default()),
        });
        let runner = StepRunner::new(vec![
            Step::new(RESOLVE_REMOTE_ID, resolve_remote_id),
            Step::new(FETCH_REMOTE_LINK, fetch_remote_link),
            Step::new(VALIDATE_DOWNLOAD_PRECONDITIONS, validate_download_preconditions),
            Step::new(FETCH_DECRYPT_HEADER, fetch_decrypt_header),
            Step::new(PREALLOCATE_LOCAL_FILE, preallocate_local_file),
            Step::new(DOWNLOAD_SLICES, download_slices).with_cancel(stop_pool),
            Step::new(VERIFY_DIGEST_ON_DISK, verify_digest_on_disk),
            Step::new(SET_LOCAL_MTIME, set_local_mtime),
            Step::new(FINISH, finish),
        ]);
        Ok(Self {
            ctx,
            runner,
            terminated: AtomicBool::new(false),
        })
    }

    /// Continue a download an earlier process recorded. The recorded `.part`
    /// is reused when the remote file and the layout are unchanged.
    pub fn resume_from(self, point: ResumePoint) -> Self {
        self.ctx.state().resume = Some(point);
        self
    }

    /// Plaintext content digest, once every chunk arrived.
    pub fn content_digest(&self) -> Option<String> {
        self.ctx.state().digest.clone()
    }

    pub fn part_path(&self) -> &std::path::Path {
        &self.ctx.part
    }

    pub fn completed_steps(&self) -> Vec<&'static str> {
        self.runner.completed_steps()
    }
}

#[async_trait]
impl Transfer for DownloadTask {
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

        let created = self.runner.is_completed(PREALLOCATE_LOCAL_FILE);
        let finished = {
            let mut st = self.ctx.state();
            st.part = None;
            st.finished
        };
        if created && !finished {
            match tokio::fs::remove_file(&self.ctx.part).await {
                Ok(()) => tracing::info!(part = %self.ctx.part.display(), "removed partial download"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(part = %self.ctx.part.display(), error = %e, "could not remove partial download")
                }
            }
        }
    }

    fn info(&self) -> TransferInfo {
        let layout = self.ctx.state().layout;
        let (slices_done, slice_count) = {
            let ledger = self.ctx.ledger();
            (ledger.done_count(), ledger.total())
        };
        TransferInfo {
            kind: TransferKind::Download,
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
        let (source, layout, pending) = {
            let st = self.ctx.state();
            let source = st.entry.as_ref().map(|e| SourceSnapshot {
                size: e.size,
                mtime: e.mtime,
            });
            (source, st.layout, st.resume.clone())
        };
        let ledger = self.ctx.ledger();
        if let Some(point) = pending.filter(|_| ledger.total() == 0) {
            return point;
        }
        ResumePoint {
            source,
            chunk_mb: layout.map(|l| l.chunk_mb()),
            iv: None,
            upload_id: None,
            slice_count: ledger.total(),
            done: ledger.bitmap(),
        }
    }
}
