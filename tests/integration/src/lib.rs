//! Integration tests for the keyshim bridge.
//!
//! These tests drive a full engine handle lifecycle against the in-process
//! engine and call every hook it received through the raw C signatures.

// Allow unwrap() in tests - panics are acceptable for test assertions
#![allow(clippy::disallowed_methods)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use keyshim_bridge::testing::SimEngineApi;
use keyshim_bridge::{ConfigFile, EngineHandle, KmsCredentials};
use serde_json::{json, Map, Value};
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

/// Credentials for the `local` and `aws` providers.
pub fn two_providers() -> KmsCredentials {
    KmsCredentials::new()
        .with_provider("local", object(json!({ "key": "a2V5c2hpbQ==" })))
        .with_provider(
            "aws",
            object(json!({ "accessKeyId": "AKIAEXAMPLE", "secretAccessKey": "secret" })),
        )
}

/// Unwraps a JSON object literal.
pub fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        other => panic!("expected an object, got {other}"),
    }
}

/// A configuration file written to a temporary directory.
pub struct ConfigFixture {
    _dir: TempDir,
    /// Path of the written file.
    pub path: PathBuf,
}

impl ConfigFixture {
    /// Writes `document` as `keyshim.json`.
    pub fn write(document: &Value) -> Result<Self> {
        let dir = TempDir::new().context("Failed to create temp dir")?;
        let path = dir.path().join("keyshim.json");
        let mut file = std::fs::File::create(&path).context("Failed to create config file")?;
        file.write_all(serde_json::to_string_pretty(document)?.as_bytes())?;
        Ok(Self { _dir: dir, path })
    }
}

/// Builds a handle on a fresh in-process engine from a configuration file.
pub fn handle_from_file(document: &Value) -> Result<(Arc<SimEngineApi>, EngineHandle)> {
    let fixture = ConfigFixture::write(document)?;
    let config = ConfigFile::load(&fixture.path)?;
    config.validate()?;

    let api = Arc::new(SimEngineApi::new());
    let handle = EngineHandle::new(api.clone(), config.into_engine_config())?;
    Ok((api, handle))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use keyshim_bridge::{BridgeError, EngineConfig, HookProbe, KmsTlsOptions, OutputMode, TlsOptions};
    use keyshim_crypto::sign;

    #[test]
    fn test_full_lifecycle() {
        let api = Arc::new(SimEngineApi::new());
        let handle = EngineHandle::new(api.clone(), EngineConfig::new(two_providers())).unwrap();

        let engine = handle.as_raw();
        assert!(api.is_live(engine.as_ptr()));
        assert_eq!(api.init_calls(), 1);
        assert_eq!(api.kms_providers().unwrap()["aws"]["accessKeyId"], "AKIAEXAMPLE");
        assert_eq!(api.schema_map(), None);
        assert!(!api.has_log_handler());

        handle.close();
        assert_eq!(api.destroy_calls(), 1);
        assert_eq!(api.live_handles(), 0);
    }

    #[test]
    fn test_registered_hooks_answer_engine_calls() {
        let api = Arc::new(SimEngineApi::new());
        let _handle = EngineHandle::new(api.clone(), EngineConfig::new(two_providers())).unwrap();
        let hooks = api.registered_hooks().unwrap();

        for mode in [OutputMode::Growable, OutputMode::Fixed] {
            let probe = HookProbe::new(hooks).with_output_mode(mode);
            let key = [0x42u8; 32];
            let iv = [0x24u8; 16];

            for len in [0usize, 1, 15, 16, 17, 100] {
                let plaintext = vec![0xA5u8; len];
                let ciphertext = probe.aes_256_cbc_encrypt(&key, &iv, &plaintext).unwrap();
                assert_eq!(ciphertext.len(), (len / 16 + 1) * 16);
                assert_eq!(probe.aes_256_cbc_decrypt(&key, &iv, &ciphertext).unwrap(), plaintext);

                let stream = probe.aes_256_ctr_encrypt(&key, &iv, &plaintext).unwrap();
                assert_eq!(stream.len(), len);
                assert_eq!(probe.aes_256_ctr_decrypt(&key, &iv, &stream).unwrap(), plaintext);
            }

            assert_eq!(probe.random(96).unwrap().len(), 96);
            assert_eq!(probe.hmac_sha_256(b"key", b"data").unwrap().len(), 32);
            assert_eq!(probe.hmac_sha_512(b"key", b"data").unwrap().len(), 64);
            assert_eq!(
                hex::encode(probe.sha_256(b"").unwrap()),
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
            );
        }
    }

    #[test]
    fn test_sign_hook_with_generated_key() {
        let api = Arc::new(SimEngineApi::new());
        let _handle = EngineHandle::new(api.clone(), EngineConfig::new(two_providers())).unwrap();
        let probe = HookProbe::new(api.registered_hooks().unwrap());

        let private_key = sign::generate_private_key(2048).unwrap();
        let signature = probe.sign_rsaes_pkcs1_v1_5(&private_key, b"datakey").unwrap();

        assert_eq!(signature.len(), 256);
        assert_eq!(
            signature,
            sign::sign_rsa_pkcs1v15_sha256(&private_key, b"datakey").unwrap()
        );
    }

    #[test]
    fn test_malformed_inputs_become_statuses() {
        let api = Arc::new(SimEngineApi::new());
        let _handle = EngineHandle::new(api.clone(), EngineConfig::new(two_providers())).unwrap();
        let probe = HookProbe::new(api.registered_hooks().unwrap());

        let short_key = probe.aes_256_cbc_encrypt(&[0u8; 31], &[0u8; 16], b"x").unwrap_err();
        assert_eq!(short_key.code, 1);
        assert!(short_key.message.starts_with("InvalidKey: "));

        let bad_iv = probe.aes_256_ctr_encrypt(&[0u8; 32], &[0u8; 8], b"x").unwrap_err();
        assert!(bad_iv.message.starts_with("InvalidIv: "));

        let unaligned = probe.aes_256_cbc_decrypt(&[0u8; 32], &[0u8; 16], &[0u8; 7]).unwrap_err();
        assert!(unaligned.message.starts_with("InvalidInput: "));

        let bad_rsa = probe.sign_rsaes_pkcs1_v1_5(b"garbage", b"x").unwrap_err();
        assert!(bad_rsa.message.starts_with("InvalidKey: "));
    }

    #[test]
    fn test_hooks_called_from_many_threads() {
        let api = Arc::new(SimEngineApi::new());
        let _handle = EngineHandle::new(api.clone(), EngineConfig::new(two_providers())).unwrap();
        let hooks = api.registered_hooks().unwrap();
        let expected_mac = HookProbe::new(hooks).hmac_sha_256(b"shared key", b"payload").unwrap();

        std::thread::scope(|scope| {
            for worker in 0u8..8 {
                let expected_mac = &expected_mac;
                scope.spawn(move || {
                    let mode = if worker % 2 == 0 {
                        OutputMode::Growable
                    } else {
                        OutputMode::Fixed
                    };
                    let probe = HookProbe::new(hooks).with_output_mode(mode);
                    let key = [worker; 32];
                    let iv = [worker.wrapping_add(1); 16];

                    for round in 0..50usize {
                        let plaintext = vec![worker; round];
                        let ciphertext = probe.aes_256_cbc_encrypt(&key, &iv, &plaintext).unwrap();
                        assert_eq!(ciphertext.len(), (round / 16 + 1) * 16);
                        assert_eq!(probe.aes_256_cbc_decrypt(&key, &iv, &ciphertext).unwrap(), plaintext);

                        assert_eq!(
                            &probe.hmac_sha_256(b"shared key", b"payload").unwrap(),
                            expected_mac
                        );
                        assert_eq!(probe.random(round as u32).unwrap().len(), round);

                        // A failure on one thread must not bleed into the next call.
                        let failure = probe.aes_256_cbc_encrypt(&key[..10], &iv, b"x").unwrap_err();
                        assert!(failure.message.starts_with("InvalidKey: "));
                        assert_eq!(probe.sha_256(b"abc").unwrap().len(), 32);
                    }
                });
            }
        });
    }

    #[test]
    fn test_kms_tls_options() {
        let api = Arc::new(SimEngineApi::new());
        let kmip = TlsOptions {
            ca_file: Some("/etc/ssl/kmip-ca.pem".into()),
            cert_key_file: Some("/etc/ssl/client.pem".into()),
            ..TlsOptions::default()
        };
        let handle = EngineHandle::new(
            api,
            EngineConfig::new(two_providers())
                .with_kms_tls_options(KmsTlsOptions::new().with_provider("kmip", kmip.clone())),
        )
        .unwrap();

        assert_eq!(handle.kms_tls_options("kmip"), &kmip);
        assert!(handle.kms_tls_options("local").is_empty());
        assert!(handle.kms_tls_options("gcp").is_empty());
    }

    #[test]
    fn test_handle_from_config_file() {
        let (api, handle) = handle_from_file(&json!({
            "kms_providers": { "local": { "key": "a2V5c2hpbQ==" } },
            "kms_tls_options": { "kmip": { "allow_invalid_certificates": true } },
            "encrypted_fields_map": { "db.coll": { "fields": [] } },
            "bypass_query_analysis": true,
            "log_to_tracing": true
        }))
        .unwrap();

        assert_eq!(
            api.encrypted_fields_map(),
            Some(json!({ "db.coll": { "fields": [] } }))
        );
        assert!(api.bypass_query_analysis());
        assert!(api.has_log_handler());
        assert_eq!(handle.kms_tls_options("kmip").allow_invalid_certificates, Some(true));

        drop(handle);
        assert_eq!(api.destroy_calls(), 1);
        assert!(!api.has_log_handler());
    }

    #[test]
    fn test_config_file_with_list_schema_map() {
        let err = handle_from_file(&json!({
            "kms_providers": { "local": {} },
            "schema_map": [{ "db.coll": {} }]
        }))
        .unwrap_err();

        let bridge = err.downcast_ref::<BridgeError>().unwrap();
        assert!(matches!(bridge, BridgeError::InvalidSchemaMap("array")));
    }

    #[test]
    fn test_handles_share_engine_api() {
        let api = Arc::new(SimEngineApi::new());
        let first = EngineHandle::new(api.clone(), EngineConfig::new(two_providers())).unwrap();
        let second = EngineHandle::new(api.clone(), EngineConfig::new(two_providers())).unwrap();

        assert_ne!(first.as_raw().as_ptr(), second.as_raw().as_ptr());
        assert_eq!(api.live_handles(), 2);

        let worker = std::thread::spawn(move || drop(first));
        worker.join().unwrap();
        assert_eq!(api.live_handles(), 1);

        drop(second);
        assert_eq!(api.destroy_calls(), 2);
    }
}
