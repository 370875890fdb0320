//! Remote disk collaborator.
//!
//! The engine talks to the remote object store only through [`RemoteDisk`].
//! [`DirRemote`] implements it over a local directory; it backs the CLI and
//! the integration tests.

mod cache;
mod dir;
mod error;
mod types;

use async_trait::async_trait;

pub use cache::{Clock, ManualClock, SystemClock, UploadEndpointCache};
pub use dir::DirRemote;
pub use error::RemoteError;
pub use types::{
    FinalizeRequest, Fsid, ListPage, OnDuplicate, PrecreateRequest, PrecreateResponse,
    RemoteEntry, SliceUpload,
};

#[async_trait]
pub trait RemoteDisk: Send + Sync + 'static {
    /// Metadata for one path, or `None` when it does not exist.
    async fn file_meta(&self, path: &str) -> Result<Option<RemoteEntry>, RemoteError>;

    /// Open (or re-open) an upload session for `req.path`.
    async fn precreate(&self, req: &PrecreateRequest) -> Result<PrecreateResponse, RemoteError>;

    /// Resolve the host slices are PUT to. Valid for a limited time.
    async fn upload_endpoint(&self) -> Result<String, RemoteError>;

    /// PUT one slice; returns the digest the remote computed for it.
    async fn upload_slice(
        &self,
        endpoint: &str,
        slice: SliceUpload<'_>,
    ) -> Result<String, RemoteError>;

    /// Commit a session into a file.
    async fn finalize(&self, req: &FinalizeRequest) -> Result<RemoteEntry, RemoteError>;

    /// One page of the recursive listing under `path`, starting at `cursor`.
    async fn list_recursive(&self, path: &str, cursor: u64) -> Result<ListPage, RemoteError>;

    /// Signed download link for a file.
    async fn download_link(&self, fsid: Fsid) -> Result<String, RemoteError>;

    /// Bytes `[start, end)` behind a download link.
    async fn range_fetch(&self, link: &str, start: u64, end: u64)
        -> Result<Vec<u8>, RemoteError>;

    async fn create_folder(&self, path: &str) -> Result<(), RemoteError>;

    /// Delete files or folders (recursively). Missing paths are ignored.
    async fn delete_paths(&self, paths: &[String]) -> Result<(), RemoteError>;
}

/// Join a remote root and a `/`-separated relative path.
pub fn join_remote(root: &str, relative: &str) -> String {
    let root = root.trim_end_matches('/');
    let relative = relative.trim_start_matches('/');
    if relative.is_empty() {
        if root.is_empty() {
            "/".to_string()
        } else {
            root.to_string()
        }
    } else {
        format!("{root}/{relative}")
    }
}

/// Path of `path` relative to `root`, or `None` when it is not below it.
pub fn relative_remote<'a>(root: &str, path: &'a str) -> Option<&'a str> {
    let root = root.trim_end_matches('/');
    let rest = path.strip_prefix(root)?;
    if rest.is_empty() {
        return Some("");
    }
    rest.strip_prefix('/')
}
