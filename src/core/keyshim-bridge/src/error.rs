//! Host-visible bridge error types.

use thiserror::Error;

/// Errors surfaced to the code constructing an engine handle.
///
/// Hook failures never appear here: they are reported to the engine through
/// its status record (see [`crate::guard::HookError`]).
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The schema map is not a mapping.
    #[error("schema map must be a mapping, got {0}")]
    InvalidSchemaMap(&'static str),

    /// The encrypted fields map is not a mapping.
    #[error("encrypted fields map must be a mapping, got {0}")]
    InvalidEncryptedFieldsMap(&'static str),

    /// The engine could not allocate a native handle.
    #[error("engine handle allocation failed")]
    EngineAllocation,

    /// One-time engine initialization failed.
    #[error("engine initialization failed: {message} (code {code})")]
    EngineInit {
        /// Engine status code.
        code: u32,
        /// Engine status message.
        message: String,
    },

    /// The engine refused an option.
    #[error("engine rejected {option}: {message}")]
    OptionRejected {
        /// Option name.
        option: &'static str,
        /// Engine status message.
        message: String,
    },

    /// A document exceeds the engine's 32-bit length field.
    #[error("{option} document of {len} bytes is too large")]
    DocumentTooLarge {
        /// Option name.
        option: &'static str,
        /// Serialized length.
        len: usize,
    },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid configuration file.
    #[error("configuration error: {0}")]
    Config(String),
}

impl BridgeError {
    /// Whether the error stems from invalid configuration rather than the engine.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::InvalidSchemaMap(_) | Self::InvalidEncryptedFieldsMap(_) | Self::Config(_)
        )
    }
}
