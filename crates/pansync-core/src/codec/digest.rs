//! Content digests (MD5, lowercase hex).

use md5::{Digest, Md5};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const READ_BUF: usize = 1024 * 1024;

pub fn md5_hex(data: &[u8]) -> String {
    hex::encode(Md5::digest(data))
}

/// Characters 8..24 of a 32-char hex digest.
pub fn digest_middle(digest: &str) -> Option<&str> {
    if digest.len() != 32 || !digest.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    Some(&digest[8..24])
}

/// Cumulative digest fed chunk by chunk.
#[derive(Clone, Default)]
pub struct ContentDigest {
    hasher: Md5,
    bytes: u64,
}

impl ContentDigest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.hasher.update(data);
        self.bytes += data.len() as u64;
    }

    pub fn bytes(&self) -> u64 {
        self.bytes
    }

    pub fn finalize_hex(self) -> String {
        hex::encode(self.hasher.finalize())
    }
}

/// Digest over chunks that complete out of order.
///
/// Payloads are buffered by index and folded into the digest only once every
/// lower index has been folded, so bytes are hashed in file order. With a
/// window set, more than `window` buffered chunks spill the digest: buffers
/// are dropped, later pushes are ignored, and the caller re-reads the written
/// file instead.
#[derive(Default)]
pub struct OrderedDigest {
    next: usize,
    pending: BTreeMap<usize, Vec<u8>>,
    window: Option<usize>,
    spilled: bool,
    digest: ContentDigest,
}

impl OrderedDigest {
    pub fn new() -> Self {
        Self::default()
    }

    /// Buffer at most `window` chunks ahead of the digest cursor.
    pub fn with_window(window: usize) -> Self {
        Self {
            window: Some(window),
            ..Self::default()
        }
    }

    pub fn push(&mut self, index: usize, data: Vec<u8>) {
        if self.spilled || index < self.next {
            return;
        }
        self.pending.insert(index, data);
        while let Some(data) = self.pending.remove(&self.next) {
            self.digest.update(&data);
            self.next += 1;
        }
        if self.window.is_some_and(|w| self.pending.len() > w) {
            tracing::debug!(
                cursor = self.next,
                buffered = self.pending.len(),
                "reorder window exceeded, digest will be read from disk"
            );
            self.spill();
        }
    }

    /// Give up on streaming; [`finish`](Self::finish) returns `None` from now on.
    pub fn spill(&mut self) {
        self.pending.clear();
        self.spilled = true;
    }

    pub fn is_spilled(&self) -> bool {
        self.spilled
    }

    /// Index of the next chunk the digest is waiting for.
    pub fn next_index(&self) -> usize {
        self.next
    }

    /// Chunks received but not yet folded in.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Final digest once exactly `chunks` contiguous chunks were folded in.
    pub fn finish(&self, chunks: usize) -> Option<String> {
        (!self.spilled && self.next == chunks && self.pending.is_empty())
            .then(|| self.digest.clone().finalize_hex())
    }
}

/// Digest of the first `len` bytes of a file (the whole file when `None`).
pub fn file_md5(path: &Path, len: Option<u64>) -> io::Result<String> {
    let file = File::open(path)?;
    let mut reader: Box<dyn Read> = match len {
        Some(n) => Box::new(file.take(n)),
        None => Box::new(file),
    };
    let mut digest = ContentDigest::new();
    let mut buf = vec![0u8; READ_BUF];
    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        digest.update(&buf[..n]);
    }
    Ok(digest.finalize_hex())
}
