//! Engine configuration.
//!
//! Configuration is assembled once, validated when the handle is built and
//! never changed afterwards. [`ConfigFile`] is the serializable form used by
//! the CLI; [`EngineConfig`] additionally carries the logger.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::BridgeError;
use crate::logger::{EngineLogger, TracingLogger};
use crate::options::{validate_encrypted_fields_map, validate_schema_map};

/// Credential documents keyed by KMS provider name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KmsCredentials(BTreeMap<String, Map<String, Value>>);

impl KmsCredentials {
    /// Creates an empty credential set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds the credential document of `provider`.
    pub fn with_provider(mut self, provider: impl Into<String>, credentials: Map<String, Value>) -> Self {
        self.0.insert(provider.into(), credentials);
        self
    }

    /// Credential document of `provider`.
    pub fn get(&self, provider: &str) -> Option<&Map<String, Value>> {
        self.0.get(provider)
    }

    /// Configured provider names, sorted.
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Number of configured providers.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no provider is configured.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// TLS settings for the connection to one KMS provider.
///
/// Passed through unmodified to the transport; the bridge never interprets it.
/// Keys beyond the common ones below are kept verbatim in `extra`.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsOptions {
    /// CA bundle used to verify the provider.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    /// Client certificate and private key (PEM).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_key_file: Option<PathBuf>,
    /// Password protecting `cert_key_file`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_key_file_password: Option<String>,
    /// Disables certificate verification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_invalid_certificates: Option<bool>,
    /// Any other transport setting, e.g. `verify_hostname`.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn empty_tls() -> &'static TlsOptions {
    static EMPTY: OnceLock<TlsOptions> = OnceLock::new();
    EMPTY.get_or_init(TlsOptions::default)
}

impl TlsOptions {
    /// Options with nothing set.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Adds a transport setting outside the common fields.
    pub fn with_extra(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    /// Whether nothing is set.
    pub fn is_empty(&self) -> bool {
        self == empty_tls()
    }
}

impl fmt::Debug for TlsOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsOptions")
            .field("ca_file", &self.ca_file)
            .field("cert_key_file", &self.cert_key_file)
            .field(
                "cert_key_file_password",
                &self.cert_key_file_password.as_ref().map(|_| "[REDACTED]"),
            )
            .field("allow_invalid_certificates", &self.allow_invalid_certificates)
            // Values may hold inline key material.
            .field("extra", &self.extra.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// TLS settings keyed by KMS provider name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KmsTlsOptions(BTreeMap<String, TlsOptions>);

impl KmsTlsOptions {
    /// Creates an empty mapping.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the TLS options of `provider`.
    pub fn with_provider(mut self, provider: impl Into<String>, options: TlsOptions) -> Self {
        self.0.insert(provider.into(), options);
        self
    }

    /// TLS options of `provider`, empty when none are configured.
    pub fn get(&self, provider: &str) -> &TlsOptions {
        self.0.get(provider).unwrap_or_else(|| empty_tls())
    }

    /// Providers with explicit TLS options, sorted.
    pub fn providers(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

/// Everything an engine handle is configured with.
#[derive(Clone, Default)]
pub struct EngineConfig {
    /// KMS provider credentials. Always applied.
    pub kms_credentials: KmsCredentials,
    /// Per-provider TLS settings, kept by the handle for KMS transports.
    pub kms_tls_options: KmsTlsOptions,
    /// Optional local schema map; must be a mapping.
    pub schema_map: Option<Value>,
    /// Optional encrypted fields map; must be a mapping.
    pub encrypted_fields_map: Option<Value>,
    /// Disables automatic query analysis.
    pub bypass_query_analysis: bool,
    /// Optional receiver of engine log records.
    pub logger: Option<Arc<dyn EngineLogger>>,
}

impl EngineConfig {
    /// Creates a configuration with the given credentials and nothing else.
    pub fn new(kms_credentials: KmsCredentials) -> Self {
        Self {
            kms_credentials,
            ..Self::default()
        }
    }

    /// Sets per-provider TLS options.
    pub fn with_kms_tls_options(mut self, options: KmsTlsOptions) -> Self {
        self.kms_tls_options = options;
        self
    }

    /// Sets the schema map.
    pub fn with_schema_map(mut self, schema_map: Value) -> Self {
        self.schema_map = Some(schema_map);
        self
    }

    /// Sets the encrypted fields map.
    pub fn with_encrypted_fields_map(mut self, encrypted_fields_map: Value) -> Self {
        self.encrypted_fields_map = Some(encrypted_fields_map);
        self
    }

    /// Disables automatic query analysis.
    pub fn with_bypass_query_analysis(mut self) -> Self {
        self.bypass_query_analysis = true;
        self
    }

    /// Sets the logger.
    pub fn with_logger(mut self, logger: Arc<dyn EngineLogger>) -> Self {
        self.logger = Some(logger);
        self
    }
}

impl fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineConfig")
            .field("kms_providers", &self.kms_credentials.providers().collect::<Vec<_>>())
            .field("kms_tls_options", &self.kms_tls_options)
            .field("schema_map", &self.schema_map.is_some())
            .field("encrypted_fields_map", &self.encrypted_fields_map.is_some())
            .field("bypass_query_analysis", &self.bypass_query_analysis)
            .field("logger", &self.logger.is_some())
            .finish()
    }
}

/// On-disk configuration, JSON encoded.
///
/// ```json
/// {
///   "kms_providers": { "local": { "key": "..." } },
///   "kms_tls_options": { "kmip": { "ca_file": "/etc/ssl/kmip-ca.pem" } },
///   "schema_map": { "db.coll": { "bsonType": "object" } },
///   "log_to_tracing": true
/// }
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    /// KMS provider credentials.
    pub kms_providers: KmsCredentials,
    /// Per-provider TLS settings.
    #[serde(default)]
    pub kms_tls_options: KmsTlsOptions,
    /// Optional local schema map.
    #[serde(default)]
    pub schema_map: Option<Value>,
    /// Optional encrypted fields map.
    #[serde(default)]
    pub encrypted_fields_map: Option<Value>,
    /// Disables automatic query analysis.
    #[serde(default)]
    pub bypass_query_analysis: bool,
    /// Forwards engine logs to `tracing`.
    #[serde(default)]
    pub log_to_tracing: bool,
}

impl ConfigFile {
    /// Reads and parses a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, BridgeError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)
            .map_err(|e| BridgeError::Config(format!("failed to read {}: {e}", path.display())))?;
        serde_json::from_slice(&bytes)
            .map_err(|e| BridgeError::Config(format!("failed to parse {}: {e}", path.display())))
    }

    /// Checks the shape of every document without touching an engine.
    pub fn validate(&self) -> Result<(), BridgeError> {
        if self.kms_providers.is_empty() {
            return Err(BridgeError::Config(
                "at least one KMS provider must be configured".into(),
            ));
        }
        if let Some(schema_map) = &self.schema_map {
            validate_schema_map(schema_map)?;
        }
        if let Some(encrypted_fields_map) = &self.encrypted_fields_map {
            validate_encrypted_fields_map(encrypted_fields_map)?;
        }
        Ok(())
    }

    /// Converts into the in-memory configuration.
    pub fn into_engine_config(self) -> EngineConfig {
        EngineConfig {
            kms_credentials: self.kms_providers,
            kms_tls_options: self.kms_tls_options,
            schema_map: self.schema_map,
            encrypted_fields_map: self.encrypted_fields_map,
            bypass_query_analysis: self.bypass_query_analysis,
            logger: self
                .log_to_tracing
                .then(|| Arc::new(TracingLogger) as Arc<dyn EngineLogger>),
        }
    }
}
