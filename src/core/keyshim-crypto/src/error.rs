//! Cryptographic error types.

use thiserror::Error;

/// Errors that can occur during cryptographic operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// Signature creation failed.
    #[error("signature creation failed: {0}")]
    SignatureFailed(String),

    /// The operating system random source failed.
    #[error("random generation failed: {0}")]
    RandomFailed(String),

    /// Key generation failed.
    #[error("key generation failed: {0}")]
    KeyGenerationFailed(String),

    /// Invalid key format or size.
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// Invalid initialization vector or counter block.
    #[error("invalid iv: {0}")]
    InvalidIv(String),

    /// Invalid input data.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl CryptoError {
    /// Short identifier of the failure kind, used as the prefix of engine
    /// status messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EncryptionFailed(_) => "EncryptionFailed",
            Self::DecryptionFailed(_) => "DecryptionFailed",
            Self::SignatureFailed(_) => "SignatureFailed",
            Self::RandomFailed(_) => "RandomFailed",
            Self::KeyGenerationFailed(_) => "KeyGenerationFailed",
            Self::InvalidKey(_) => "InvalidKey",
            Self::InvalidIv(_) => "InvalidIv",
            Self::InvalidInput(_) => "InvalidInput",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_variant() {
        assert_eq!(CryptoError::InvalidKey("x".into()).kind(), "InvalidKey");
        assert_eq!(CryptoError::InvalidIv("x".into()).kind(), "InvalidIv");
        assert_eq!(
            CryptoError::DecryptionFailed("x".into()).kind(),
            "DecryptionFailed"
        );
        assert_eq!(CryptoError::RandomFailed("x".into()).kind(), "RandomFailed");
    }

    #[test]
    fn test_display_includes_detail() {
        let err = CryptoError::InvalidKey("expected 32 bytes, got 10".into());
        assert_eq!(err.to_string(), "invalid key: expected 32 bytes, got 10");
    }
}
