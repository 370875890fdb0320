//! Map remote and transfer errors onto retry kinds.

use crate::error::TransferError;
use crate::remote::RemoteError;
use crate::retry::policy::ErrorKind;

pub fn classify_remote(e: &RemoteError) -> ErrorKind {
    match e {
        RemoteError::Timeout => ErrorKind::Timeout,
        RemoteError::Throttled => ErrorKind::Throttled,
        RemoteError::Connection(_) => ErrorKind::Connection,
        RemoteError::Server(code) => ErrorKind::Server(*code),
        RemoteError::NotFound(_)
        | RemoteError::AlreadyExists(_)
        | RemoteError::Quota
        | RemoteError::Permission(_)
        | RemoteError::InvalidSession(_)
        | RemoteError::Api { .. } => ErrorKind::Remote,
    }
}

pub fn classify(e: &TransferError) -> ErrorKind {
    match e {
        TransferError::Remote(re) => classify_remote(re),
        TransferError::Io(_) => ErrorKind::Local,
        TransferError::Integrity(_) | TransferError::Trailer(_) => ErrorKind::Integrity,
        TransferError::FileChanged { .. }
        | TransferError::Key(_)
        | TransferError::ChunkSize(_)
        | TransferError::Precondition(_) => ErrorKind::Precondition,
        // A worker that died without reporting is treated like a dropped connection.
        TransferError::Worker(_) => ErrorKind::Connection,
        TransferError::Stopped => ErrorKind::Stopped,
    }
}
