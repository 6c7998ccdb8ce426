//! One-time engine options applied before initialization.

use std::ptr::NonNull;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::abi::{EngineApi, RawBinary, RawEngine, BUFFER_FIXED};
use crate::config::KmsCredentials;
use crate::error::BridgeError;
use crate::hooks::rejected;
use crate::logger::{log_trampoline, EngineLogger, LogSink};

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "mapping",
    }
}

/// Fails unless `value` is a mapping from collection to schema document.
pub fn validate_schema_map(value: &Value) -> Result<(), BridgeError> {
    match value {
        Value::Object(_) => Ok(()),
        other => Err(BridgeError::InvalidSchemaMap(value_kind(other))),
    }
}

/// Fails unless `value` is a mapping from collection to encrypted fields document.
pub fn validate_encrypted_fields_map(value: &Value) -> Result<(), BridgeError> {
    match value {
        Value::Object(_) => Ok(()),
        other => Err(BridgeError::InvalidEncryptedFieldsMap(value_kind(other))),
    }
}

/// Applies configuration to a freshly created native handle.
pub struct OptionConfigurator<'a> {
    api: &'a dyn EngineApi,
    engine: NonNull<RawEngine>,
}

impl<'a> OptionConfigurator<'a> {
    /// # Safety
    ///
    /// `engine` must be a live handle created by `api` that stays live for `'a`.
    pub(crate) unsafe fn new(api: &'a dyn EngineApi, engine: NonNull<RawEngine>) -> Self {
        Self { api, engine }
    }

    /// Validates and forwards the schema map.
    pub fn set_schema_map(&self, schema_map: &Value) -> Result<(), BridgeError> {
        validate_schema_map(schema_map)?;
        self.forward("schema_map", schema_map, |api, engine, document| {
            // SAFETY: engine is live per constructor contract.
            unsafe { api.set_schema_map(engine, document) }
        })
    }

    /// Validates and forwards the encrypted fields map.
    pub fn set_encrypted_fields_map(&self, encrypted_fields_map: &Value) -> Result<(), BridgeError> {
        validate_encrypted_fields_map(encrypted_fields_map)?;
        self.forward("encrypted_fields_map", encrypted_fields_map, |api, engine, document| {
            // SAFETY: engine is live per constructor contract.
            unsafe { api.set_encrypted_fields_map(engine, document) }
        })
    }

    /// Disables automatic query analysis.
    pub fn set_bypass_query_analysis(&self) {
        // SAFETY: engine is live per constructor contract.
        unsafe { self.api.set_bypass_query_analysis(self.engine) };
        debug!(option = "bypass_query_analysis", "engine option applied");
    }

    /// Forwards the KMS provider credentials.
    pub fn set_kms_providers(&self, credentials: &KmsCredentials) -> Result<(), BridgeError> {
        let document = serde_json::to_value(credentials)?;
        self.forward("kms_providers", &document, |api, engine, document| {
            // SAFETY: engine is live per constructor contract.
            unsafe { api.set_kms_providers(engine, document) }
        })
    }

    /// Installs the log trampoline for `logger`.
    ///
    /// The returned sink is the trampoline's context; the caller must keep it
    /// alive until the native handle is destroyed.
    pub(crate) fn set_logger(&self, logger: Arc<dyn EngineLogger>) -> Result<Box<LogSink>, BridgeError> {
        let sink = LogSink::new(logger);
        // SAFETY: engine is live; the sink outlives it per this method's contract.
        if !unsafe { self.api.set_log_handler(self.engine, log_trampoline, sink.as_ctx()) } {
            // SAFETY: engine is live.
            return Err(unsafe { rejected(self.api, self.engine, "log_handler") });
        }
        debug!(option = "log_handler", "engine option applied");
        Ok(sink)
    }

    fn forward<F>(&self, option: &'static str, value: &Value, set: F) -> Result<(), BridgeError>
    where
        F: FnOnce(&dyn EngineApi, NonNull<RawEngine>, &mut RawBinary) -> bool,
    {
        let mut document = serde_json::to_vec(value)?;
        let len = u32::try_from(document.len()).map_err(|_| BridgeError::DocumentTooLarge {
            option,
            len: document.len(),
        })?;
        let mut raw = RawBinary {
            data: document.as_mut_ptr(),
            len,
            mode: BUFFER_FIXED,
        };

        if !set(self.api, self.engine, &mut raw) {
            // SAFETY: engine is live per constructor contract.
            return Err(unsafe { rejected(self.api, self.engine, option) });
        }
        debug!(option, bytes = len, "engine option applied");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_schema_map_accepts_mapping() {
        validate_schema_map(&json!({})).unwrap();
        validate_schema_map(&json!({ "db.coll": { "bsonType": "object" } })).unwrap();
    }

    #[test]
    fn test_validate_schema_map_rejects_non_mapping() {
        for (value, kind) in [
            (json!([{ "db.coll": {} }]), "array"),
            (json!("db.coll"), "string"),
            (json!(42), "number"),
            (json!(null), "null"),
            (json!(true), "boolean"),
        ] {
            let err = validate_schema_map(&value).unwrap_err();
            assert!(matches!(err, BridgeError::InvalidSchemaMap(k) if k == kind));
        }
    }

    #[test]
    fn test_validate_encrypted_fields_map() {
        validate_encrypted_fields_map(&json!({ "db.coll": { "fields": [] } })).unwrap();
        assert!(matches!(
            validate_encrypted_fields_map(&json!([])),
            Err(BridgeError::InvalidEncryptedFieldsMap("array"))
        ));
    }
}
