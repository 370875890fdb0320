//! Chunk codec.
//!
//! Picks a chunk size from a fixed ladder, encrypts chunks independently
//! (AES-256-CBC, PKCS#7), appends a checksummed trailer to the final chunk,
//! and computes the whole-file content digest over plaintext.

mod cipher;
mod digest;
mod key;
mod layout;
mod trailer;

pub use cipher::{ChunkCipher, DecryptError};
pub use digest::{digest_middle, file_md5, md5_hex, ContentDigest, OrderedDigest};
pub use key::{EncryptionKey, KeyError, KEY_LEN};
pub use layout::{ChunkLayout, ChunkSizeError, ChunkSpan, CHUNK_LADDER_MB, MAX_SLICES, MIB};
pub use trailer::{Trailer, TrailerError, IV_LEN, TRAILER_LEN};

/// Fresh random IV for one task.
pub fn random_iv() -> [u8; IV_LEN] {
    rand::random()
}
