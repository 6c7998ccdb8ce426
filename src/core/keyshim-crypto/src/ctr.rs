//! AES-256-CTR with a big-endian 128-bit counter.

use aes::cipher::{KeyIvInit, StreamCipher};

use crate::error::CryptoError;
use crate::{check_len, BLOCK_SIZE, KEY_SIZE};

type Aes256Ctr = ctr::Ctr128BE<aes::Aes256>;

#[derive(Debug, Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

impl Direction {
    fn failure(self, detail: String) -> CryptoError {
        match self {
            Self::Encrypt => CryptoError::EncryptionFailed(detail),
            Self::Decrypt => CryptoError::DecryptionFailed(detail),
        }
    }
}

/// Encrypts `plaintext`. The output has the same length as the input.
pub fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    apply(key, iv, plaintext, Direction::Encrypt)
}

/// Decrypts `ciphertext`. The output has the same length as the input.
pub fn decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    apply(key, iv, ciphertext, Direction::Decrypt)
}

fn apply(key: &[u8], iv: &[u8], input: &[u8], direction: Direction) -> Result<Vec<u8>, CryptoError> {
    check_len("key", key, KEY_SIZE)?;
    check_len("iv", iv, BLOCK_SIZE)?;

    let mut cipher =
        Aes256Ctr::new_from_slices(key, iv).map_err(|e| direction.failure(e.to_string()))?;

    let mut output = input.to_vec();
    cipher
        .try_apply_keystream(&mut output)
        .map_err(|e| direction.failure(e.to_string()))?;

    Ok(output)
}
