//! AES-256-CBC with PKCS#7 padding.
//!
//! Ciphertext is always a whole number of blocks: a block-aligned plaintext
//! gains one full block of padding.

use aes::cipher::{block_padding::Pkcs7, BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::{check_len, BLOCK_SIZE, KEY_SIZE};

type Aes256CbcEnc = cbc::Encryptor<aes::Aes256>;
type Aes256CbcDec = cbc::Decryptor<aes::Aes256>;

/// Returns the ciphertext length produced for a plaintext of `plaintext_len` bytes.
pub const fn ciphertext_len(plaintext_len: usize) -> usize {
    (plaintext_len / BLOCK_SIZE + 1) * BLOCK_SIZE
}

/// Encrypts `plaintext` with AES-256-CBC.
///
/// # Arguments
///
/// * `key` - 32-byte encryption key
/// * `iv` - 16-byte initialization vector
/// * `plaintext` - Data to encrypt, any length
pub fn encrypt(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, CryptoError> {
    check_len("key", key, KEY_SIZE)?;
    check_len("iv", iv, BLOCK_SIZE)?;

    let cipher = Aes256CbcEnc::new_from_slices(key, iv)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

/// Decrypts AES-256-CBC `ciphertext` and strips its PKCS#7 padding.
///
/// # Returns
///
/// Decrypted plaintext wrapped in `Zeroizing` for automatic memory cleanup.
pub fn decrypt(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    check_len("key", key, KEY_SIZE)?;
    check_len("iv", iv, BLOCK_SIZE)?;

    if ciphertext.is_empty() || ciphertext.len() % BLOCK_SIZE != 0 {
        return Err(CryptoError::InvalidInput(format!(
            "ciphertext length {} is not a positive multiple of {}",
            ciphertext.len(),
            BLOCK_SIZE
        )));
    }

    let cipher = Aes256CbcDec::new_from_slices(key, iv)
        .map_err(|e| CryptoError::DecryptionFailed(e.to_string()))?;

    let plaintext = cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| CryptoError::DecryptionFailed("invalid padding".to_string()))?;

    Ok(Zeroizing::new(plaintext))
}
