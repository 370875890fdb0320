//! Messages between the pool controller and its workers.

use crate::error::TransferError;

/// Controller → worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerRequest {
    /// Transfer this slice, then report.
    Assign { index: usize },
    /// Exit after the current slice (if any).
    Shutdown,
}

/// Worker → controller. Exactly one per `Assign`.
#[derive(Debug)]
pub enum WorkerEvent {
    Done {
        worker: usize,
        index: usize,
        output: SliceOutput,
    },
    Failed {
        worker: usize,
        index: usize,
        error: TransferError,
    },
}

/// Result of one slice.
#[derive(Debug, Default)]
pub struct SliceOutput {
    /// Bytes moved over the network for this slice.
    pub bytes: u64,
    /// Optional data for the owner (a slice digest, or plaintext to fold into
    /// an ordered digest).
    pub payload: Option<Vec<u8>>,
}

impl SliceOutput {
    pub fn bytes(bytes: u64) -> Self {
        Self {
            bytes,
            payload: None,
        }
    }

    pub fn with_payload(bytes: u64, payload: Vec<u8>) -> Self {
        Self {
            bytes,
            payload: Some(payload),
        }
    }
}
