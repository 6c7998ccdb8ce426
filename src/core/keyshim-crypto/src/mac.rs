//! Message authentication codes and hashing.

use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256, Sha512};

use crate::error::CryptoError;

type HmacSha256 = Hmac<Sha256>;
type HmacSha512 = Hmac<Sha512>;

/// Length of an HMAC-SHA-256 tag and of a SHA-256 digest.
pub const SHA256_LEN: usize = 32;

/// Length of an HMAC-SHA-512 tag.
pub const SHA512_LEN: usize = 64;

/// Computes HMAC-SHA-256 of `input` under `key`.
pub fn hmac_sha256(key: &[u8], input: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    mac.update(input);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Computes HMAC-SHA-512 of `input` under `key`.
pub fn hmac_sha512(key: &[u8], input: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let mut mac = <HmacSha512 as Mac>::new_from_slice(key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;
    mac.update(input);
    Ok(mac.finalize().into_bytes().to_vec())
}

/// Computes the SHA-256 digest of `input`.
pub fn sha256(input: &[u8]) -> Vec<u8> {
    Sha256::digest(input).to_vec()
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_sha256_empty() {
        assert_eq!(
            hex::encode(sha256(b"")),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_sha256_abc() {
        assert_eq!(
            hex::encode(sha256(b"abc")),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_hmac_sha256_rfc4231_case2() {
        let tag = hmac_sha256(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(tag),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn test_hmac_sha512_rfc4231_case2() {
        let tag = hmac_sha512(b"Jefe", b"what do ya want for nothing?").unwrap();
        assert_eq!(
            hex::encode(tag),
            "164b7a7bfcf819e2e395fbe73b56e0a387bd64222e831fd610270cd7ea250554\
             9758bf75c05a994a6d034f65f8f0e6fdcaeab1a34d4a6b4b636e070a38bce737"
        );
    }

    #[test]
    fn test_hmac_deterministic_and_sized() {
        let key = [0x42u8; 96];
        let a = hmac_sha256(&key, b"input").unwrap();
        let b = hmac_sha256(&key, b"input").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), SHA256_LEN);

        let c = hmac_sha512(&key, b"input").unwrap();
        assert_eq!(c.len(), SHA512_LEN);
        assert_eq!(c, hmac_sha512(&key, b"input").unwrap());
    }

    #[test]
    fn test_hmac_empty_key_accepted() {
        assert_eq!(hmac_sha256(b"", b"input").unwrap().len(), SHA256_LEN);
    }
}
