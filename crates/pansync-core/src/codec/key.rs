//! Encryption key validation.

/// Key length after padding (AES-256).
pub const KEY_LEN: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    #[error("encryption key is empty")]
    Empty,
    #[error("encryption key is {0} bytes, at most {KEY_LEN} allowed")]
    TooLong(usize),
    #[error("encryption key must not contain whitespace")]
    Whitespace,
}

/// A validated key, zero-padded to [`KEY_LEN`] bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct EncryptionKey([u8; KEY_LEN]);

impl EncryptionKey {
    pub fn parse(key: &str) -> Result<Self, KeyError> {
        if key.is_empty() {
            return Err(KeyError::Empty);
        }
        if key.chars().any(char::is_whitespace) {
            return Err(KeyError::Whitespace);
        }
        if key.len() > KEY_LEN {
            return Err(KeyError::TooLong(key.len()));
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes[..key.len()].copy_from_slice(key.as_bytes());
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for EncryptionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("EncryptionKey(..)")
    }
}
