//! In-process software engine for exercising the bridge without the native library.
//!
//! [`SimEngineApi`] implements [`EngineApi`] in Rust, records every call it
//! receives, and lets tests probe the hooks and log handler it was given.

use std::collections::HashSet;
use std::ffi::c_void;
use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard};

use serde_json::Value;

use crate::abi::{
    CryptoCallbacks, CryptoFn, EngineApi, HmacFn, LogFn, LogLevel, RawBinary, RawEngine, RawStatus,
    StatusCategory,
};
use crate::hooks::CryptoHookSet;

struct SimInstance {
    _id: usize,
}

#[derive(Debug, Default)]
struct SimState {
    calls: Vec<&'static str>,
    live: HashSet<usize>,
    created: usize,
    destroy_calls: usize,
    init_calls: usize,
    kms_providers: Option<Value>,
    schema_map: Option<Value>,
    encrypted_fields_map: Option<Value>,
    bypass_query_analysis: bool,
    // Context pointers are stored as addresses so the state stays Send.
    log_handler: Option<(LogFn, usize)>,
    crypto: Option<CryptoCallbacks>,
    aes_256_ctr: Option<(CryptoFn, CryptoFn)>,
    sign: Option<HmacFn>,
    status_message: Vec<u8>,
    status_code: u32,
}

/// Software engine double.
#[derive(Debug, Default)]
pub struct SimEngineApi {
    state: Mutex<SimState>,
    fail_create: bool,
    fail_init: Option<String>,
    reject: Option<&'static str>,
}

impl SimEngineApi {
    /// An engine that accepts everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `create` return no handle.
    pub fn failing_create(mut self) -> Self {
        self.fail_create = true;
        self
    }

    /// Makes `init` fail with `message`.
    pub fn failing_init(mut self, message: impl Into<String>) -> Self {
        self.fail_init = Some(message.into());
        self
    }

    /// Makes the entry point named `call` (e.g. `"set_schema_map"`) return `false`.
    pub fn rejecting(mut self, call: &'static str) -> Self {
        self.reject = Some(call);
        self
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Records `call`, returning whether it should succeed.
    fn record(&self, call: &'static str) -> bool {
        let mut state = self.state();
        state.calls.push(call);
        if self.reject == Some(call) {
            state.status_code = 1;
            state.status_message = format!("{call} refused by engine").into_bytes();
            return false;
        }
        true
    }

    /// Every entry point invoked so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state().calls.clone()
    }

    /// Number of `destroy` calls, including redundant ones.
    pub fn destroy_calls(&self) -> usize {
        self.state().destroy_calls
    }

    /// Number of handles created and not yet destroyed.
    pub fn live_handles(&self) -> usize {
        self.state().live.len()
    }

    /// Whether `engine` is a live handle of this engine.
    pub fn is_live(&self, engine: NonNull<RawEngine>) -> bool {
        self.state().live.contains(&(engine.as_ptr() as usize))
    }

    /// Number of `init` calls.
    pub fn init_calls(&self) -> usize {
        self.state().init_calls
    }

    /// The KMS provider document received, parsed.
    pub fn kms_providers(&self) -> Option<Value> {
        self.state().kms_providers.clone()
    }

    /// The schema map document received, parsed.
    pub fn schema_map(&self) -> Option<Value> {
        self.state().schema_map.clone()
    }

    /// The encrypted fields map document received, parsed.
    pub fn encrypted_fields_map(&self) -> Option<Value> {
        self.state().encrypted_fields_map.clone()
    }

    /// Whether query analysis was bypassed.
    pub fn bypass_query_analysis(&self) -> bool {
        self.state().bypass_query_analysis
    }

    /// Whether a log handler is installed on a live handle.
    pub fn has_log_handler(&self) -> bool {
        self.state().log_handler.is_some()
    }

    /// The hooks registered so far, once every registration call happened.
    pub fn registered_hooks(&self) -> Option<CryptoHookSet> {
        let state = self.state();
        let crypto = state.crypto?;
        let (aes_256_ctr_encrypt, aes_256_ctr_decrypt) = state.aes_256_ctr?;
        Some(CryptoHookSet {
            aes_256_cbc_encrypt: crypto.aes_256_cbc_encrypt,
            aes_256_cbc_decrypt: crypto.aes_256_cbc_decrypt,
            aes_256_ctr_encrypt,
            aes_256_ctr_decrypt,
            random: crypto.random,
            hmac_sha_512: crypto.hmac_sha_512,
            hmac_sha_256: crypto.hmac_sha_256,
            sha_256: crypto.sha_256,
            sign_rsaes_pkcs1_v1_5: state.sign?,
        })
    }

    /// Emits a log record through the installed handler, as the engine would.
    ///
    /// Returns `false` when no handler is installed.
    pub fn emit_log(&self, level: LogLevel, message: &str) -> bool {
        let handler = self.state().log_handler;
        let Some((handler, ctx)) = handler else {
            return false;
        };
        // SAFETY: the handler and its context stay valid until destroy, which
        // clears them.
        unsafe {
            handler(
                level.as_raw(),
                message.as_ptr(),
                message.len() as u32,
                ctx as *mut c_void,
            )
        };
        true
    }
}

fn parse_document(document: &RawBinary) -> Option<Value> {
    if document.data.is_null() {
        return None;
    }
    // SAFETY: the bridge lends a readable document for the duration of the call.
    let bytes = unsafe { std::slice::from_raw_parts(document.data, document.len as usize) };
    serde_json::from_slice(bytes).ok()
}

impl EngineApi for SimEngineApi {
    fn create(&self) -> Option<NonNull<RawEngine>> {
        self.record("create");
        if self.fail_create {
            return None;
        }
        let mut state = self.state();
        state.created += 1;
        let instance = Box::into_raw(Box::new(SimInstance { _id: state.created }));
        state.live.insert(instance as usize);
        NonNull::new(instance.cast::<RawEngine>())
    }

    unsafe fn destroy(&self, engine: NonNull<RawEngine>) {
        self.record("destroy");
        let mut state = self.state();
        state.destroy_calls += 1;
        if state.live.remove(&(engine.as_ptr() as usize)) {
            state.log_handler = None;
            // SAFETY: the address was live, so it is a SimInstance not yet freed.
            drop(unsafe { Box::from_raw(engine.as_ptr().cast::<SimInstance>()) });
        }
    }

    unsafe fn set_kms_providers(&self, _engine: NonNull<RawEngine>, document: &mut RawBinary) -> bool {
        if !self.record("set_kms_providers") {
            return false;
        }
        self.state().kms_providers = parse_document(document);
        true
    }

    unsafe fn set_schema_map(&self, _engine: NonNull<RawEngine>, document: &mut RawBinary) -> bool {
        if !self.record("set_schema_map") {
            return false;
        }
        self.state().schema_map = parse_document(document);
        true
    }

    unsafe fn set_encrypted_fields_map(
        &self,
        _engine: NonNull<RawEngine>,
        document: &mut RawBinary,
    ) -> bool {
        if !self.record("set_encrypted_fields_map") {
            return false;
        }
        self.state().encrypted_fields_map = parse_document(document);
        true
    }

    unsafe fn set_bypass_query_analysis(&self, _engine: NonNull<RawEngine>) {
        self.record("set_bypass_query_analysis");
        self.state().bypass_query_analysis = true;
    }

    unsafe fn set_log_handler(&self, _engine: NonNull<RawEngine>, handler: LogFn, ctx: *mut c_void) -> bool {
        if !self.record("set_log_handler") {
            return false;
        }
        self.state().log_handler = Some((handler, ctx as usize));
        true
    }

    unsafe fn set_crypto_hooks(
        &self,
        _engine: NonNull<RawEngine>,
        callbacks: &CryptoCallbacks,
        _ctx: *mut c_void,
    ) -> bool {
        if !self.record("set_crypto_hooks") {
            return false;
        }
        self.state().crypto = Some(*callbacks);
        true
    }

    fn supports_aes_256_ctr(&self) -> bool {
        true
    }

    unsafe fn set_aes_256_ctr_hooks(
        &self,
        _engine: NonNull<RawEngine>,
        encrypt: CryptoFn,
        decrypt: CryptoFn,
        _ctx: *mut c_void,
    ) -> bool {
        if !self.record("set_aes_256_ctr_hooks") {
            return false;
        }
        self.state().aes_256_ctr = Some((encrypt, decrypt));
        true
    }

    unsafe fn set_sign_hook(&self, _engine: NonNull<RawEngine>, sign: HmacFn, _ctx: *mut c_void) -> bool {
        if !self.record("set_sign_hook") {
            return false;
        }
        self.state().sign = Some(sign);
        true
    }

    unsafe fn init(&self, _engine: NonNull<RawEngine>) -> bool {
        if !self.record("init") {
            return false;
        }
        let mut state = self.state();
        state.init_calls += 1;
        if let Some(message) = &self.fail_init {
            state.status_code = 1;
            state.status_message = message.clone().into_bytes();
            return false;
        }
        true
    }

    unsafe fn status(&self, _engine: NonNull<RawEngine>, out: &mut RawStatus) {
        let mut state = self.state();
        let failed = !state.status_message.is_empty();
        out.category = if failed {
            StatusCategory::Client.as_raw()
        } else {
            StatusCategory::Ok.as_raw()
        };
        out.code = state.status_code;
        out.message = state.status_message.as_mut_ptr();
        out.message_len = state.status_message.len() as u32;
    }
}
