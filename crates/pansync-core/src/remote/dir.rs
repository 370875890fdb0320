//! Remote disk backed by a local directory.
//!
//! Upload sessions stage slices under `<root>/.pansync-sessions/<upload_id>/`
//! and are assembled on finalize. Session ids are derived from the path and
//! block list, so re-opening a session after an interruption reports the
//! slices already staged.

use async_trait::async_trait;
use md5::{Digest, Md5};
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use walkdir::WalkDir;

use super::{
    FinalizeRequest, Fsid, ListPage, OnDuplicate, PrecreateRequest, PrecreateResponse,
    RemoteDisk, RemoteEntry, RemoteError, SliceUpload,
};
use crate::codec::md5_hex;
use crate::storage::{mtime_secs, set_mtime};

const SESSION_DIR: &str = ".pansync-sessions";
const LINK_SCHEME: &str = "dir://";
const DEFAULT_PAGE_SIZE: usize = 1000;

#[derive(Debug, Clone)]
struct Session {
    path: String,
    size: u64,
    block_list: Vec<String>,
}

pub struct DirRemote {
    root: PathBuf,
    page_size: usize,
    sessions: Mutex<HashMap<String, Session>>,
    ids: Mutex<HashMap<Fsid, String>>,
    endpoint_requests: AtomicUsize,
    list_requests: AtomicUsize,
    slice_uploads: AtomicUsize,
    range_fetches: AtomicUsize,
    /// Pending injected failures per slice sequence number.
    upload_failures: Mutex<HashMap<usize, u32>>,
    fetch_failures: AtomicU32,
    /// Added before each slice PUT and range fetch, in milliseconds.
    io_delay_ms: AtomicU64,
}

fn internal(e: impl std::fmt::Display) -> RemoteError {
    RemoteError::Api {
        code: -1,
        message: e.to_string(),
    }
}

async fn blocking<T, F>(f: F) -> Result<T, RemoteError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, RemoteError> + Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(internal)?
}

fn fsid_for(path: &str) -> Fsid {
    let digest = Md5::digest(path.as_bytes());
    let mut id = [0u8; 8];
    id.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(id)
}

fn entry_for(path: &str, meta: &fs::Metadata) -> RemoteEntry {
    RemoteEntry {
        fsid: fsid_for(path),
        path: path.to_string(),
        is_dir: meta.is_dir(),
        size: if meta.is_dir() { 0 } else { meta.len() },
        mtime: mtime_secs(meta).unwrap_or(0),
        md5: None,
    }
}

/// Pick `name (n).ext` style alternatives until one is free.
fn renamed_target(target: &Path) -> PathBuf {
    let stem = target
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_default();
    let ext = target
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let parent = target.parent().map(Path::to_path_buf).unwrap_or_default();
    (1..)
        .map(|n| parent.join(format!("{stem}({n}){ext}")))
        .find(|p| !p.exists())
        .unwrap_or_else(|| target.to_path_buf())
}

impl DirRemote {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            page_size: DEFAULT_PAGE_SIZE,
            sessions: Mutex::new(HashMap::new()),
            ids: Mutex::new(HashMap::new()),
            endpoint_requests: AtomicUsize::new(0),
            list_requests: AtomicUsize::new(0),
            slice_uploads: AtomicUsize::new(0),
            range_fetches: AtomicUsize::new(0),
            upload_failures: Mutex::new(HashMap::new()),
            fetch_failures: AtomicU32::new(0),
            io_delay_ms: AtomicU64::new(0),
        }
    }

    /// Entries per listing page.
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn endpoint_requests(&self) -> usize {
        self.endpoint_requests.load(Ordering::Relaxed)
    }

    pub fn list_requests(&self) -> usize {
        self.list_requests.load(Ordering::Relaxed)
    }

    /// Successful slice PUTs so far.
    pub fn slice_uploads(&self) -> usize {
        self.slice_uploads.load(Ordering::Relaxed)
    }

    /// Successful range fetches so far (trailer fetches included).
    pub fn range_fetches(&self) -> usize {
        self.range_fetches.load(Ordering::Relaxed)
    }

    /// Slow every slice PUT and range fetch down by `delay`.
    pub fn set_io_delay(&self, delay: Duration) {
        self.io_delay_ms
            .store(delay.as_millis() as u64, Ordering::Relaxed);
    }

    async fn io_delay(&self) {
        let ms = self.io_delay_ms.load(Ordering::Relaxed);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    /// Make the next upload of slice `seq` fail with a connection error.
    /// Calls add up: failing twice fails the next two uploads of `seq`.
    pub fn fail_slice_upload(&self, seq: usize) {
        *self
            .upload_failures
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(seq)
            .or_insert(0) += 1;
    }

    fn take_slice_failure(&self, seq: usize) -> bool {
        let mut failures = self.upload_failures.lock().unwrap_or_else(|e| e.into_inner());
        match failures.get_mut(&seq) {
            Some(n) if *n > 1 => {
                *n -= 1;
                true
            }
            Some(_) => {
                failures.remove(&seq);
                true
            }
            None => false,
        }
    }

    /// Make the next `n` range fetches fail with a connection error.
    pub fn fail_next_range_fetches(&self, n: u32) {
        self.fetch_failures.store(n, Ordering::SeqCst);
    }

    fn take_failure(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn local_path(&self, path: &str) -> Result<PathBuf, RemoteError> {
        let relative = Path::new(path.trim_start_matches('/'));
        if relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err(RemoteError::Permission(path.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn session_dir(&self, upload_id: &str) -> PathBuf {
        self.root.join(SESSION_DIR).join(upload_id)
    }

    fn remember(&self, entries: &[RemoteEntry]) {
        let mut ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        for e in entries {
            ids.insert(e.fsid, e.path.clone());
        }
    }

    fn session(&self, upload_id: &str) -> Result<Session, RemoteError> {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(upload_id)
            .cloned()
            .ok_or_else(|| RemoteError::InvalidSession(upload_id.to_string()))
    }
}

#[async_trait]
impl RemoteDisk for DirRemote {
    async fn file_meta(&self, path: &str) -> Result<Option<RemoteEntry>, RemoteError> {
        let local = self.local_path(path)?;
        let entry = match fs::metadata(&local) {
            Ok(meta) => entry_for(path, &meta),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(RemoteError::from_io(e, path)),
        };
        self.remember(std::slice::from_ref(&entry));
        Ok(Some(entry))
    }

    async fn precreate(&self, req: &PrecreateRequest) -> Result<PrecreateResponse, RemoteError> {
        self.local_path(&req.path)?;
        let upload_id = md5_hex(
            format!("{}\n{}\n{}", req.path, req.size, req.block_list.join(",")).as_bytes(),
        );
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(upload_id.clone())
            .or_insert_with(|| Session {
                path: req.path.clone(),
                size: req.size,
                block_list: req.block_list.clone(),
            });

        let dir = self.session_dir(&upload_id);
        let block_list = req.block_list.clone();
        let present = blocking(move || {
            Ok(block_list
                .iter()
                .enumerate()
                .filter(|(seq, md5)| {
                    fs::read(dir.join(seq.to_string()))
                        .map(|data| &md5_hex(&data) == *md5)
                        .unwrap_or(false)
                })
                .map(|(seq, _)| seq)
                .collect::<Vec<_>>())
        })
        .await?;
        Ok(PrecreateResponse { upload_id, present })
    }

    async fn upload_endpoint(&self) -> Result<String, RemoteError> {
        self.endpoint_requests.fetch_add(1, Ordering::Relaxed);
        Ok(format!("{LINK_SCHEME}upload"))
    }

    async fn upload_slice(
        &self,
        _endpoint: &str,
        slice: SliceUpload<'_>,
    ) -> Result<String, RemoteError> {
        if self.take_slice_failure(slice.seq) {
            return Err(RemoteError::Connection("injected slice failure".into()));
        }
        self.io_delay().await;
        let session = self.session(slice.upload_id)?;
        if session.path != slice.path || slice.seq >= session.block_list.len() {
            return Err(RemoteError::InvalidSession(format!(
                "{} seq {}",
                slice.upload_id, slice.seq
            )));
        }
        let dir = self.session_dir(slice.upload_id);
        let data = slice.data.to_vec();
        let seq = slice.seq;
        let digest = blocking(move || {
            fs::create_dir_all(&dir).map_err(internal)?;
            fs::write(dir.join(seq.to_string()), &data).map_err(internal)?;
            Ok(md5_hex(&data))
        })
        .await?;
        self.slice_uploads.fetch_add(1, Ordering::Relaxed);
        Ok(digest)
    }

    async fn finalize(&self, req: &FinalizeRequest) -> Result<RemoteEntry, RemoteError> {
        let session = self.session(&req.upload_id)?;
        if session.path != req.path || session.block_list != req.block_list {
            return Err(RemoteError::InvalidSession(req.upload_id.clone()));
        }
        if session.size != req.size {
            return Err(RemoteError::Api {
                code: 31363,
                message: format!("size mismatch: session {} vs {}", session.size, req.size),
            });
        }

        let mut target = self.local_path(&req.path)?;
        if target.exists() {
            match req.ondup {
                OnDuplicate::Overwrite => {}
                OnDuplicate::Fail => return Err(RemoteError::AlreadyExists(req.path.clone())),
                OnDuplicate::Rename => target = renamed_target(&target),
            }
        }
        let path = match target.strip_prefix(&self.root) {
            Ok(rel) => format!("/{}", rel.to_string_lossy().replace('\\', "/")),
            Err(_) => req.path.clone(),
        };

        let dir = self.session_dir(&req.upload_id);
        let block_list = req.block_list.clone();
        let size = req.size;
        let mtime = req.local_mtime;
        let committed = path.clone();
        let (meta, digest) = blocking(move || {
            if let Some(parent) = target.parent() {
                fs::create_dir_all(parent).map_err(internal)?;
            }
            let mut staging = target.as_os_str().to_owned();
            staging.push(".commit");
            let staging = PathBuf::from(staging);
            let mut out = File::create(&staging).map_err(internal)?;
            let mut hasher = Md5::new();
            let mut written = 0u64;
            for (seq, expected) in block_list.iter().enumerate() {
                let data = fs::read(dir.join(seq.to_string())).map_err(|_| RemoteError::Api {
                    code: 31363,
                    message: format!("block {seq} missing"),
                })?;
                if &md5_hex(&data) != expected {
                    return Err(RemoteError::Api {
                        code: 31363,
                        message: format!("block {seq} digest mismatch"),
                    });
                }
                hasher.update(&data);
                out.write_all(&data).map_err(internal)?;
                written += data.len() as u64;
            }
            if written != size {
                let _ = fs::remove_file(&staging);
                return Err(RemoteError::Api {
                    code: 31363,
                    message: format!("committed {written} bytes, expected {size}"),
                });
            }
            out.sync_all().map_err(internal)?;
            drop(out);
            fs::rename(&staging, &target).map_err(|e| RemoteError::from_io(e, &committed))?;
            if mtime > 0 {
                set_mtime(&target, mtime).map_err(internal)?;
            }
            let _ = fs::remove_dir_all(&dir);
            let meta = fs::metadata(&target).map_err(internal)?;
            Ok((meta, hex::encode(hasher.finalize())))
        })
        .await?;

        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&req.upload_id);
        let mut entry = entry_for(&path, &meta);
        entry.md5 = Some(digest);
        self.remember(std::slice::from_ref(&entry));
        Ok(entry)
    }

    async fn list_recursive(&self, path: &str, cursor: u64) -> Result<ListPage, RemoteError> {
        self.list_requests.fetch_add(1, Ordering::Relaxed);
        let base = self.local_path(path)?;
        if !base.is_dir() {
            return Err(RemoteError::NotFound(path.to_string()));
        }
        let root = self.root.clone();
        let page_size = self.page_size;
        let page = blocking(move || {
            let mut entries = Vec::new();
            let walker = WalkDir::new(&base)
                .min_depth(1)
                .sort_by_file_name()
                .into_iter()
                .filter_entry(|e| e.file_name() != SESSION_DIR);
            for item in walker {
                let item = item.map_err(internal)?;
                let meta = item.metadata().map_err(internal)?;
                let Ok(rel) = item.path().strip_prefix(&root) else {
                    continue;
                };
                let remote_path = format!("/{}", rel.to_string_lossy().replace('\\', "/"));
                if remote_path.ends_with(".commit") {
                    continue;
                }
                entries.push(entry_for(&remote_path, &meta));
            }
            let start = (cursor as usize).min(entries.len());
            let end = (start + page_size).min(entries.len());
            Ok(ListPage {
                entries: entries[start..end].to_vec(),
                has_more: end < entries.len(),
                cursor: end as u64,
            })
        })
        .await?;
        self.remember(&page.entries);
        Ok(page)
    }

    async fn download_link(&self, fsid: Fsid) -> Result<String, RemoteError> {
        let ids = self.ids.lock().unwrap_or_else(|e| e.into_inner());
        ids.get(&fsid)
            .map(|path| format!("{LINK_SCHEME}{path}"))
            .ok_or_else(|| RemoteError::NotFound(format!("fsid {fsid}")))
    }

    async fn range_fetch(
        &self,
        link: &str,
        start: u64,
        end: u64,
    ) -> Result<Vec<u8>, RemoteError> {
        if Self::take_failure(&self.fetch_failures) {
            return Err(RemoteError::Connection("injected fetch failure".into()));
        }
        let path = link
            .strip_prefix(LINK_SCHEME)
            .ok_or_else(|| RemoteError::Permission(link.to_string()))?
            .to_string();
        let local = self.local_path(&path)?;
        self.io_delay().await;
        let data = blocking(move || {
            let mut file = File::open(&local).map_err(|e| RemoteError::from_io(e, &path))?;
            let len = file.metadata().map_err(internal)?.len();
            let end = end.min(len);
            let mut buf = vec![0u8; end.saturating_sub(start) as usize];
            file.seek(SeekFrom::Start(start)).map_err(internal)?;
            file.read_exact(&mut buf).map_err(internal)?;
            Ok(buf)
        })
        .await?;
        self.range_fetches.fetch_add(1, Ordering::Relaxed);
        Ok(data)
    }

    async fn create_folder(&self, path: &str) -> Result<(), RemoteError> {
        let local = self.local_path(path)?;
        let path = path.to_string();
        blocking(move || fs::create_dir_all(&local).map_err(|e| RemoteError::from_io(e, &path)))
            .await
    }

    async fn delete_paths(&self, paths: &[String]) -> Result<(), RemoteError> {
        let targets = paths
            .iter()
            .map(|p| self.local_path(p).map(|l| (p.clone(), l)))
            .collect::<Result<Vec<_>, _>>()?;
        blocking(move || {
            for (path, local) in targets {
                let res = if local.is_dir() {
                    fs::remove_dir_all(&local)
                } else {
                    fs::remove_file(&local)
                };
                match res {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                    Err(e) => return Err(RemoteError::from_io(e, &path)),
                }
            }
            Ok(())
        })
        .await
    }
}
