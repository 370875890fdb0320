//! Chunk size selection and byte arithmetic for one file.
//!
//! A file is cut into chunks of `chunk_size` plaintext bytes (one less when
//! encrypted, so each full chunk's ciphertext is exactly `chunk_size`). The
//! transfer stream is the concatenation of those chunks' bytes, plus the
//! trailer after the final encrypted chunk, cut into slices of `chunk_size`.

use std::ops::Range;

use super::trailer::TRAILER_LEN;

pub const MIB: u64 = 1024 * 1024;

/// Allowed chunk sizes in MiB, smallest first.
pub const CHUNK_LADDER_MB: [u32; 5] = [4, 8, 16, 32, 64];

/// Most slices the remote accepts for one file.
pub const MAX_SLICES: usize = 2048;

const BLOCK: u64 = 16;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChunkSizeError {
    #[error("file too large: {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: u64, max: u64 },
    #[error("invalid chunk size: {0} MiB")]
    Invalid(u32),
}

/// Ciphertext length of `plain` bytes under PKCS#7.
fn padded_len(plain: u64) -> u64 {
    (plain / BLOCK + 1) * BLOCK
}

/// One chunk: where its plaintext lives in the local file and where its
/// bytes (ciphertext when encrypted, trailer excluded) live in the transfer stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSpan {
    pub index: usize,
    pub plain_offset: u64,
    pub plain_len: u64,
    pub stream_offset: u64,
    pub stream_len: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkLayout {
    original_size: u64,
    chunk_mb: u32,
    encrypted: bool,
}

impl ChunkLayout {
    /// Smallest ladder entry that keeps the file within [`MAX_SLICES`].
    pub fn select(original_size: u64, encrypted: bool) -> Result<Self, ChunkSizeError> {
        for &chunk_mb in CHUNK_LADDER_MB.iter() {
            let layout = Self {
                original_size,
                chunk_mb,
                encrypted,
            };
            if layout.slice_count() <= MAX_SLICES {
                return Ok(layout);
            }
        }
        let top = CHUNK_LADDER_MB[CHUNK_LADDER_MB.len() - 1];
        Err(ChunkSizeError::TooLarge {
            size: original_size,
            max: Self::max_original_size(top, encrypted),
        })
    }

    /// Layout for fetching a plain remote file by range. Past the ladder's
    /// slice limit the top chunk size is used, since no upload slices apply.
    pub fn for_ranges(original_size: u64) -> Self {
        Self::select(original_size, false).unwrap_or(Self {
            original_size,
            chunk_mb: CHUNK_LADDER_MB[CHUNK_LADDER_MB.len() - 1],
            encrypted: false,
        })
    }

    /// Rebuild a layout from values recorded in a trailer or a database row.
    pub fn from_parts(
        original_size: u64,
        chunk_mb: u32,
        encrypted: bool,
    ) -> Result<Self, ChunkSizeError> {
        if chunk_mb == 0 || chunk_mb > CHUNK_LADDER_MB[CHUNK_LADDER_MB.len() - 1] {
            return Err(ChunkSizeError::Invalid(chunk_mb));
        }
        Ok(Self {
            original_size,
            chunk_mb,
            encrypted,
        })
    }

    /// Largest plaintext size that fits in [`MAX_SLICES`] slices of `chunk_mb`.
    pub fn max_original_size(chunk_mb: u32, encrypted: bool) -> u64 {
        let chunk = chunk_mb as u64 * MIB;
        let slices = MAX_SLICES as u64;
        if !encrypted {
            return chunk * slices;
        }
        // The last chunk's ciphertext plus the trailer must fit in one slice.
        let last = chunk - TRAILER_LEN as u64 - 1;
        (slices - 1) * (chunk - 1) + last
    }

    pub fn original_size(&self) -> u64 {
        self.original_size
    }

    pub fn chunk_mb(&self) -> u32 {
        self.chunk_mb
    }

    pub fn encrypted(&self) -> bool {
        self.encrypted
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_mb as u64 * MIB
    }

    /// Plaintext bytes carried by each full chunk.
    pub fn usable(&self) -> u64 {
        if self.encrypted {
            self.chunk_size() - 1
        } else {
            self.chunk_size()
        }
    }

    /// Number of plaintext chunks; an empty file still has one.
    pub fn chunk_count(&self) -> usize {
        (self.original_size.div_ceil(self.usable()) as usize).max(1)
    }

    pub fn chunk(&self, index: usize) -> ChunkSpan {
        let plain_offset = index as u64 * self.usable();
        let plain_len = self
            .usable()
            .min(self.original_size.saturating_sub(plain_offset));
        let stream_len = if self.encrypted {
            padded_len(plain_len)
        } else {
            plain_len
        };
        ChunkSpan {
            index,
            plain_offset,
            plain_len,
            stream_offset: index as u64 * self.chunk_size(),
            stream_len,
        }
    }

    pub fn last_chunk(&self) -> ChunkSpan {
        self.chunk(self.chunk_count() - 1)
    }

    /// Bytes sent to (or stored on) the remote.
    pub fn transfer_size(&self) -> u64 {
        if !self.encrypted {
            return self.original_size;
        }
        let last = self.last_chunk();
        last.stream_offset + last.stream_len + TRAILER_LEN as u64
    }

    /// Upload slices; one more than `chunk_count` when the trailer spills over.
    pub fn slice_count(&self) -> usize {
        (self.transfer_size().div_ceil(self.chunk_size()) as usize).max(1)
    }

    /// Byte range of slice `seq` within the transfer stream.
    pub fn slice_range(&self, seq: usize) -> Range<u64> {
        let start = seq as u64 * self.chunk_size();
        let end = (start + self.chunk_size()).min(self.transfer_size());
        start.min(end)..end
    }

    /// True when the final chunk plus trailer needed two slices.
    pub fn trailer_split(&self) -> bool {
        self.slice_count() > self.chunk_count()
    }
}
