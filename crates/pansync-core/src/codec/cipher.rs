//! Per-chunk AES-256-CBC.

use aes::Aes256;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use super::key::{EncryptionKey, KEY_LEN};
use super::trailer::IV_LEN;

type Encryptor = cbc::Encryptor<Aes256>;
type Decryptor = cbc::Decryptor<Aes256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("chunk failed to decrypt (wrong key or corrupt data)")]
pub struct DecryptError;

/// Encrypts every chunk independently with the same key and IV, so chunks can
/// be produced and consumed in any order.
#[derive(Clone)]
pub struct ChunkCipher {
    key: [u8; KEY_LEN],
    iv: [u8; IV_LEN],
}

impl ChunkCipher {
    pub fn new(key: &EncryptionKey, iv: [u8; IV_LEN]) -> Self {
        Self {
            key: *key.as_bytes(),
            iv,
        }
    }

    pub fn iv(&self) -> [u8; IV_LEN] {
        self.iv
    }

    pub fn encrypt(&self, plain: &[u8]) -> Vec<u8> {
        Encryptor::new(&self.key.into(), &self.iv.into()).encrypt_padded_vec_mut::<Pkcs7>(plain)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, DecryptError> {
        Decryptor::new(&self.key.into(), &self.iv.into())
            .decrypt_padded_vec_mut::<Pkcs7>(data)
            .map_err(|_| DecryptError)
    }
}
