//! Types stored in the transfer database.

use std::path::PathBuf;

use crate::codec::IV_LEN;
use crate::slices::SliceBitmap;
use crate::task::{ResumePoint, SourceSnapshot, TransferKind};

pub type TransferId = i64;

/// Row state, stored as a string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    Running,
    Stopped,
    Finished,
    Error,
}

impl TransferState {
    pub fn as_str(self) -> &'static str {
        match self {
            TransferState::Running => "running",
            TransferState::Stopped => "stopped",
            TransferState::Finished => "finished",
            TransferState::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "running" => TransferState::Running,
            "stopped" => TransferState::Stopped,
            "finished" => TransferState::Finished,
            _ => TransferState::Error,
        }
    }
}

/// What is known when a task is created.
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub kind: TransferKind,
    pub local: PathBuf,
    pub remote: String,
}

/// Fields refreshed as a task advances.
#[derive(Debug, Clone, Default)]
pub struct TransferProgress {
    pub chunk_mb: Option<u32>,
    pub upload_id: Option<String>,
    pub slice_count: usize,
    pub bitmap: SliceBitmap,
    /// Size and mtime of the source on the first attempt.
    pub source_size: Option<u64>,
    pub source_mtime: Option<i64>,
    pub iv: Option<[u8; IV_LEN]>,
}

impl From<ResumePoint> for TransferProgress {
    fn from(point: ResumePoint) -> Self {
        Self {
            chunk_mb: point.chunk_mb,
            upload_id: point.upload_id,
            slice_count: point.slice_count,
            bitmap: point.done,
            source_size: point.source.map(|s| s.size),
            source_mtime: point.source.map(|s| s.mtime),
            iv: point.iv,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TransferRecord {
    pub id: TransferId,
    pub kind: TransferKind,
    pub local: PathBuf,
    pub remote: String,
    pub state: TransferState,
    pub chunk_mb: Option<u32>,
    pub upload_id: Option<String>,
    pub slice_count: usize,
    pub bitmap: SliceBitmap,
    pub source_size: Option<u64>,
    pub source_mtime: Option<i64>,
    pub iv: Option<[u8; IV_LEN]>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl TransferRecord {
    pub fn slices_done(&self) -> usize {
        self.bitmap.count(self.slice_count)
    }

    /// What a new task needs to pick this transfer up.
    pub fn resume_point(&self) -> ResumePoint {
        let source = match (self.source_size, self.source_mtime) {
            (Some(size), Some(mtime)) => Some(SourceSnapshot { size, mtime }),
            _ => None,
        };
        ResumePoint {
            source,
            chunk_mb: self.chunk_mb,
            iv: self.iv,
            upload_id: self.upload_id.clone(),
            slice_count: self.slice_count,
            done: self.bitmap.clone(),
        }
    }
}
