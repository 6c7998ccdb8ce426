//! RSASSA-PKCS1-v1_5 signatures over SHA-256.
//!
//! Private keys are exchanged as PKCS#8 DER blobs, the format KMS providers
//! hand out for service account keys.

use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::error::CryptoError;

/// Signs `input` with the PKCS#8 DER encoded RSA private key `private_key`.
///
/// The input is hashed with SHA-256 and the digest is signed with the
/// PKCS#1 v1.5 encoding. The signature length equals the modulus size.
pub fn sign_rsa_pkcs1v15_sha256(private_key: &[u8], input: &[u8]) -> Result<Vec<u8>, CryptoError> {
    let key = RsaPrivateKey::from_pkcs8_der(private_key)
        .map_err(|e| CryptoError::InvalidKey(e.to_string()))?;

    let digest = Sha256::digest(input);
    key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)
        .map_err(|e| CryptoError::SignatureFailed(e.to_string()))
}

/// Generates a fresh RSA private key of `bits` bits, PKCS#8 DER encoded.
pub fn generate_private_key(bits: usize) -> Result<Zeroizing<Vec<u8>>, CryptoError> {
    let mut rng = rand::rngs::OsRng;
    let key = RsaPrivateKey::new(&mut rng, bits)
        .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
    let der = key
        .to_pkcs8_der()
        .map_err(|e| CryptoError::KeyGenerationFailed(e.to_string()))?;
    Ok(Zeroizing::new(der.as_bytes().to_vec()))
}
