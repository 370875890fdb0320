//! Engine error type shared by steps, pools, and tasks.

use std::path::PathBuf;

use crate::codec::{ChunkSizeError, KeyError, TrailerError};
use crate::remote::RemoteError;

/// Error surfaced by a transfer step or slice worker.
///
/// Classified into retry kinds by [`crate::retry::classify`]; `Stopped` marks a
/// cooperative stop and is never recorded as a task's last error.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("local io: {0}")]
    Io(#[from] std::io::Error),
    #[error("integrity check failed: {0}")]
    Integrity(String),
    #[error("local file changed since the transfer started: {}", .path.display())]
    FileChanged { path: PathBuf },
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    ChunkSize(#[from] ChunkSizeError),
    #[error(transparent)]
    Trailer(#[from] TrailerError),
    #[error("precondition failed: {0}")]
    Precondition(String),
    #[error("worker failed: {0}")]
    Worker(String),
    #[error("transfer stopped")]
    Stopped,
}

impl TransferError {
    pub fn is_stopped(&self) -> bool {
        matches!(self, TransferError::Stopped)
    }

    pub(crate) fn join(e: tokio::task::JoinError) -> Self {
        TransferError::Worker(e.to_string())
    }
}
