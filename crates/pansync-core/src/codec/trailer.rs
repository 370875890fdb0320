//! Trailer block appended after the final encrypted chunk.
//!
//! Layout (48 bytes, integers big-endian):
//!
//! | bytes  | field                                       |
//! |--------|---------------------------------------------|
//! | 0..16  | IV                                          |
//! | 16..32 | middle 16 hex chars of the content digest   |
//! | 32..40 | original size                               |
//! | 40..44 | chunk size in MiB                           |
//! | 44..48 | sum of bytes 0..44, mod 2^32                |

use super::digest::digest_middle;

pub const IV_LEN: usize = 16;
pub const TRAILER_LEN: usize = 48;

const MIDDLE_LEN: usize = 16;
const CHECKED_LEN: usize = TRAILER_LEN - 4;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TrailerError {
    #[error("trailer is {0} bytes, expected {TRAILER_LEN}")]
    Length(usize),
    #[error("trailer checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    Checksum { stored: u32, computed: u32 },
    #[error("trailer digest fragment is not hex")]
    Digest,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trailer {
    pub iv: [u8; IV_LEN],
    middle: [u8; MIDDLE_LEN],
    pub original_size: u64,
    pub chunk_mb: u32,
}

fn checksum(bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| acc.wrapping_add(u32::from(b)))
}

impl Trailer {
    /// `digest` is the full 32-char hex content digest.
    pub fn new(
        iv: [u8; IV_LEN],
        digest: &str,
        original_size: u64,
        chunk_mb: u32,
    ) -> Result<Self, TrailerError> {
        let fragment = digest_middle(digest).ok_or(TrailerError::Digest)?;
        let mut middle = [0u8; MIDDLE_LEN];
        middle.copy_from_slice(fragment.as_bytes());
        Ok(Self {
            iv,
            middle,
            original_size,
            chunk_mb,
        })
    }

    /// The digest fragment (always 16 lowercase or uppercase hex chars).
    pub fn digest_middle(&self) -> &str {
        // Validated as ASCII hex on construction and decode.
        std::str::from_utf8(&self.middle).unwrap_or_default()
    }

    pub fn matches_digest(&self, digest: &str) -> bool {
        digest_middle(digest)
            .map(|m| m.eq_ignore_ascii_case(self.digest_middle()))
            .unwrap_or(false)
    }

    pub fn encode(&self) -> [u8; TRAILER_LEN] {
        let mut out = [0u8; TRAILER_LEN];
        out[..16].copy_from_slice(&self.iv);
        out[16..32].copy_from_slice(&self.middle);
        out[32..40].copy_from_slice(&self.original_size.to_be_bytes());
        out[40..44].copy_from_slice(&self.chunk_mb.to_be_bytes());
        let sum = checksum(&out[..CHECKED_LEN]);
        out[44..48].copy_from_slice(&sum.to_be_bytes());
        out
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, TrailerError> {
        let bytes: &[u8; TRAILER_LEN] = bytes
            .try_into()
            .map_err(|_| TrailerError::Length(bytes.len()))?;
        let mut word = [0u8; 4];
        word.copy_from_slice(&bytes[44..48]);
        let stored = u32::from_be_bytes(word);
        let computed = checksum(&bytes[..CHECKED_LEN]);
        if stored != computed {
            return Err(TrailerError::Checksum { stored, computed });
        }

        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[..16]);
        let mut middle = [0u8; MIDDLE_LEN];
        middle.copy_from_slice(&bytes[16..32]);
        if !middle.iter().all(u8::is_ascii_hexdigit) {
            return Err(TrailerError::Digest);
        }
        let mut size = [0u8; 8];
        size.copy_from_slice(&bytes[32..40]);
        word.copy_from_slice(&bytes[40..44]);
        Ok(Self {
            iv,
            middle,
            original_size: u64::from_be_bytes(size),
            chunk_mb: u32::from_be_bytes(word),
        })
    }
}
