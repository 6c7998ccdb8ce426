//! Ownership and lifecycle of the native engine handle.

use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::abi::{EngineApi, RawEngine, RawStatus};
use crate::config::{EngineConfig, KmsTlsOptions, TlsOptions};
use crate::error::BridgeError;
use crate::hooks::CryptoHookSet;
use crate::logger::LogSink;
use crate::options::{validate_encrypted_fields_map, validate_schema_map, OptionConfigurator};
use crate::status::Status;

/// Exclusive owner of an initialized native engine handle.
///
/// Construction applies every option exactly once, registers the host crypto
/// hooks and initializes the engine. The native handle is destroyed exactly
/// once, by [`EngineHandle::close`] or on drop, including when construction
/// fails half way.
pub struct EngineHandle {
    raw: NonNull<RawEngine>,
    released: bool,
    api: Arc<dyn EngineApi>,
    kms_tls_options: KmsTlsOptions,
    // Fields drop after `Drop::drop` has run `release`, so the sink outlives
    // the native handle.
    log_sink: Option<Box<LogSink>>,
}

// SAFETY: the native handle is only touched through `EngineApi`, which is
// Send + Sync; hooks are stateless and the logger is Send + Sync.
unsafe impl Send for EngineHandle {}
// SAFETY: as above.
unsafe impl Sync for EngineHandle {}

impl EngineHandle {
    /// Creates, configures and initializes a native engine handle.
    ///
    /// # Errors
    ///
    /// - [`BridgeError::EngineAllocation`] when no handle could be created.
    /// - [`BridgeError::InvalidSchemaMap`] / [`BridgeError::InvalidEncryptedFieldsMap`]
    ///   before any crypto hook is registered.
    /// - [`BridgeError::OptionRejected`] when the engine refuses an option.
    /// - [`BridgeError::EngineInit`] when initialization fails.
    ///
    /// Invalid documents are rejected before a native handle is created. Any
    /// later failure destroys the native handle before the error is returned.
    pub fn new(api: Arc<dyn EngineApi>, config: EngineConfig) -> Result<Self, BridgeError> {
        if let Some(schema_map) = &config.schema_map {
            validate_schema_map(schema_map)?;
        }
        if let Some(encrypted_fields_map) = &config.encrypted_fields_map {
            validate_encrypted_fields_map(encrypted_fields_map)?;
        }

        let raw = api.create().ok_or(BridgeError::EngineAllocation)?;

        let EngineConfig {
            kms_credentials,
            kms_tls_options,
            schema_map,
            encrypted_fields_map,
            bypass_query_analysis,
            logger,
        } = config;

        let mut handle = Self {
            raw,
            released: false,
            api,
            kms_tls_options,
            log_sink: None,
        };

        {
            // SAFETY: raw was just created by api and is released only by `handle`.
            let options = unsafe { OptionConfigurator::new(handle.api.as_ref(), handle.raw) };

            if let Some(schema_map) = &schema_map {
                options.set_schema_map(schema_map)?;
            }
            if let Some(encrypted_fields_map) = &encrypted_fields_map {
                options.set_encrypted_fields_map(encrypted_fields_map)?;
            }
            if bypass_query_analysis {
                options.set_bypass_query_analysis();
            }
            if let Some(logger) = logger {
                handle.log_sink = Some(options.set_logger(logger)?);
            }

            // SAFETY: as above.
            unsafe { CryptoHookSet::host().register(handle.api.as_ref(), handle.raw)? };

            options.set_kms_providers(&kms_credentials)?;
        }

        handle.initialize()?;

        info!(
            kms_providers = kms_credentials.len(),
            logger = handle.log_sink.is_some(),
            "engine handle initialized"
        );
        Ok(handle)
    }

    fn initialize(&self) -> Result<(), BridgeError> {
        // SAFETY: raw is live until release.
        if unsafe { self.api.init(self.raw) } {
            return Ok(());
        }

        let mut raw_status = RawStatus::default();
        // SAFETY: raw is live; the message is copied before the next engine call.
        let status = unsafe {
            self.api.status(self.raw, &mut raw_status);
            Status::from_engine(&raw_status)
        };
        warn!(code = status.code, message = %status.message, "engine initialization failed");
        Err(BridgeError::EngineInit {
            code: status.code,
            message: status.message,
        })
    }

    /// Borrowed view of the native handle for encryption and decryption contexts.
    pub fn as_raw(&self) -> EngineRef<'_> {
        EngineRef {
            raw: self.raw,
            api: self.api.as_ref(),
            _handle: PhantomData,
        }
    }

    /// TLS options for `provider`, empty when none were configured.
    pub fn kms_tls_options(&self, provider: &str) -> &TlsOptions {
        self.kms_tls_options.get(provider)
    }

    /// Destroys the native handle now.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        // SAFETY: raw was created by api and this is the only destroy call.
        unsafe { self.api.destroy(self.raw) };
        debug!("engine handle released");
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("raw", &self.raw)
            .field("released", &self.released)
            .field("logger", &self.log_sink.is_some())
            .finish()
    }
}

/// Borrowed, copyable reference to a live native handle.
#[derive(Clone, Copy)]
pub struct EngineRef<'a> {
    raw: NonNull<RawEngine>,
    api: &'a dyn EngineApi,
    _handle: PhantomData<&'a EngineHandle>,
}

impl<'a> EngineRef<'a> {
    /// The native handle. Valid for `'a`; never pass it to `destroy`.
    pub fn as_ptr(&self) -> NonNull<RawEngine> {
        self.raw
    }

    /// The engine entry points the handle was created with.
    pub fn api(&self) -> &'a dyn EngineApi {
        self.api
    }
}

impl fmt::Debug for EngineRef<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("EngineRef").field(&self.raw).finish()
    }
}
