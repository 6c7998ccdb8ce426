//! # Keyshim Crypto
//!
//! Host-side cryptographic primitives for the keyshim engine bridge.
//!
//! The encryption engine links no crypto library of its own and calls back
//! into the host for every primitive. This crate provides those primitives
//! as plain safe functions over byte slices:
//! - AES-256-CBC with PKCS#7 padding
//! - AES-256-CTR
//! - HMAC-SHA-256, HMAC-SHA-512 and SHA-256
//! - Secure random generation
//! - RSASSA-PKCS1-v1_5 signatures over SHA-256

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cbc;
pub mod ctr;
pub mod error;
pub mod mac;
pub mod random;
pub mod sign;

pub use error::CryptoError;

/// Size of an AES-256 key in bytes.
pub const KEY_SIZE: usize = 32;

/// Size of an AES block, IV and counter block in bytes.
pub const BLOCK_SIZE: usize = 16;

pub(crate) fn check_len(what: &str, bytes: &[u8], expected: usize) -> Result<(), CryptoError> {
    if bytes.len() != expected {
        let detail = format!("expected {} bytes, got {}", expected, bytes.len());
        return Err(match what {
            "key" => CryptoError::InvalidKey(detail),
            "iv" => CryptoError::InvalidIv(detail),
            _ => CryptoError::InvalidInput(format!("{what}: {detail}")),
        });
    }
    Ok(())
}
