//! Request/response shapes of the remote disk operations the engine uses.

use serde::{Deserialize, Serialize};

/// Stable identifier of a remote file or folder.
pub type Fsid = u64;

/// A remote file or folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    pub fsid: Fsid,
    /// Absolute `/`-separated path.
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
    /// Modification time, Unix seconds.
    pub mtime: i64,
    /// Content digest as reported by the remote (may be absent or unreliable).
    #[serde(default)]
    pub md5: Option<String>,
}

/// What to do when the target path already exists at commit time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OnDuplicate {
    #[default]
    Overwrite,
    Rename,
    Fail,
}

/// Open an upload session.
#[derive(Debug, Clone)]
pub struct PrecreateRequest {
    pub path: String,
    /// Bytes that will be committed (transfer size).
    pub size: u64,
    /// Per-slice digests, in sequence order.
    pub block_list: Vec<String>,
    pub ondup: OnDuplicate,
    /// Local modification time to carry onto the remote file, Unix seconds.
    pub local_mtime: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrecreateResponse {
    pub upload_id: String,
    /// Slice sequence numbers the remote already holds for this session.
    pub present: Vec<usize>,
}

/// One slice PUT.
#[derive(Debug, Clone, Copy)]
pub struct SliceUpload<'a> {
    pub path: &'a str,
    pub upload_id: &'a str,
    pub seq: usize,
    pub data: &'a [u8],
}

/// Commit an upload session.
#[derive(Debug, Clone)]
pub struct FinalizeRequest {
    pub path: String,
    pub size: u64,
    pub upload_id: String,
    pub block_list: Vec<String>,
    pub ondup: OnDuplicate,
    pub local_mtime: i64,
}

/// One page of a recursive listing.
#[derive(Debug, Clone, Default)]
pub struct ListPage {
    pub entries: Vec<RemoteEntry>,
    pub has_more: bool,
    /// Cursor to pass for the next page.
    pub cursor: u64,
}
