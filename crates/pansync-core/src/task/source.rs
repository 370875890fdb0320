//! Produces upload slice bytes from a local file.

use std::io;
use std::path::Path;

use crate::codec::{ChunkCipher, ChunkLayout, TRAILER_LEN};
use crate::storage::SliceReader;

/// Plaintext reader plus the optional cipher and trailer for one upload.
pub struct SliceSource {
    reader: SliceReader,
    layout: ChunkLayout,
    cipher: Option<ChunkCipher>,
    trailer: Option<[u8; TRAILER_LEN]>,
}

impl SliceSource {
    pub fn open(
        path: &Path,
        layout: ChunkLayout,
        cipher: Option<ChunkCipher>,
        trailer: Option<[u8; TRAILER_LEN]>,
    ) -> io::Result<Self> {
        let reader = SliceReader::open(path)?;
        if reader.len() < layout.original_size() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "{} shrank to {} bytes (expected {})",
                    path.display(),
                    reader.len(),
                    layout.original_size()
                ),
            ));
        }
        if cipher.is_some() && trailer.is_none() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "encrypted upload without a trailer",
            ));
        }
        Ok(Self {
            reader,
            layout,
            cipher,
            trailer,
        })
    }

    pub fn layout(&self) -> &ChunkLayout {
        &self.layout
    }

    /// Bytes of slice `seq` of the transfer stream.
    pub fn slice(&self, seq: usize) -> io::Result<Vec<u8>> {
        let range = self.layout.slice_range(seq);
        let (Some(cipher), Some(trailer)) = (&self.cipher, &self.trailer) else {
            return self.reader.read_at(range.start, range.end - range.start);
        };

        let last = self.layout.chunk_count() - 1;
        if seq < last {
            let span = self.layout.chunk(seq);
            let plain = self.reader.read_at(span.plain_offset, span.plain_len)?;
            return Ok(cipher.encrypt(&plain));
        }

        // Final chunk ciphertext + trailer, possibly spread over two slices.
        let span = self.layout.chunk(last);
        let plain = self.reader.read_at(span.plain_offset, span.plain_len)?;
        let mut tail = cipher.encrypt(&plain);
        tail.extend_from_slice(trailer);
        let start = (range.start - span.stream_offset) as usize;
        let end = (range.end - span.stream_offset) as usize;
        tail.get(start..end).map(<[u8]>::to_vec).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("slice {seq} outside the final chunk"),
            )
        })
    }
}
