//! Cryptographically secure random generation.
//!
//! Uses the operating system's CSPRNG for all random number generation.

use rand::{rngs::OsRng, RngCore};
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::{BLOCK_SIZE, KEY_SIZE};

/// Generates `len` cryptographically secure random bytes.
pub fn generate_bytes(len: usize) -> Result<Vec<u8>, CryptoError> {
    let mut bytes = vec![0u8; len];
    OsRng
        .try_fill_bytes(&mut bytes)
        .map_err(rng_unavailable)?;
    Ok(bytes)
}

fn rng_unavailable(e: rand::Error) -> CryptoError {
    CryptoError::RandomFailed(format!("os rng unavailable: {e}"))
}

/// Generates a random 256-bit key.
///
/// The key is wrapped in `Zeroizing` to ensure it is cleared from memory when dropped.
pub fn generate_key() -> Zeroizing<[u8; KEY_SIZE]> {
    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    OsRng.fill_bytes(&mut *key);
    key
}

/// Generates a random 128-bit IV.
pub fn generate_iv() -> [u8; BLOCK_SIZE] {
    let mut iv = [0u8; BLOCK_SIZE];
    OsRng.fill_bytes(&mut iv);
    iv
}
