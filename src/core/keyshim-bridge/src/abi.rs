//! Raw engine ABI.
//!
//! Layouts and callback signatures shared with the native encryption engine.
//! Everything here is `#[repr(C)]` and crosses the foreign-function boundary
//! as-is; the safe wrappers live in [`crate::buffer`] and [`crate::status`].

use std::ffi::c_void;
use std::marker::{PhantomData, PhantomPinned};
use std::ptr::{self, NonNull};

/// Opaque native engine handle.
#[repr(C)]
pub struct RawEngine {
    _data: [u8; 0],
    _marker: PhantomData<(*mut u8, PhantomPinned)>,
}

/// Engine-owned region of fixed capacity `len`.
pub const BUFFER_FIXED: u32 = 0;
/// Pointer+length region the host may replace with its own allocation.
pub const BUFFER_GROWABLE: u32 = 1;
/// Region allocated by the host; the engine frees it with [`keyshim_release`].
pub const BUFFER_HOST_OWNED: u32 = 2;

/// Byte region exchanged with the engine.
#[repr(C)]
#[derive(Debug)]
pub struct RawBinary {
    /// Start of the region, may be null when `len` is zero.
    pub data: *mut u8,
    /// Length in bytes (capacity for fixed buffers on entry).
    pub len: u32,
    /// One of [`BUFFER_FIXED`], [`BUFFER_GROWABLE`], [`BUFFER_HOST_OWNED`].
    pub mode: u32,
}

impl RawBinary {
    /// An empty growable region.
    pub const fn growable() -> Self {
        Self {
            data: ptr::null_mut(),
            len: 0,
            mode: BUFFER_GROWABLE,
        }
    }
}

/// Status record written by failing hooks and read by the engine.
///
/// A status handed to a hook carries a null `message`, or a message the host
/// allocated during an earlier failure. Messages produced by hooks are host
/// allocations released with [`keyshim_release`]. Messages filled in by
/// [`EngineApi::status`] belong to the engine and stay valid only until the
/// next call on the same handle.
#[repr(C)]
#[derive(Debug)]
pub struct RawStatus {
    /// Raw [`StatusCategory`] value.
    pub category: u32,
    /// Category specific error code.
    pub code: u32,
    /// UTF-8 message bytes, not NUL terminated.
    pub message: *mut u8,
    /// Message length in bytes.
    pub message_len: u32,
}

impl Default for RawStatus {
    fn default() -> Self {
        Self {
            category: StatusCategory::Ok.as_raw(),
            code: 0,
            message: ptr::null_mut(),
            message_len: 0,
        }
    }
}

/// Failure category of a status record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusCategory {
    /// No failure.
    Ok,
    /// Failure caused by the caller of the engine, including every hook failure.
    Client,
    /// Failure reported by a KMS provider.
    Kms,
    /// Failure from the shared query analysis library.
    CryptShared,
}

impl StatusCategory {
    /// ABI value of this category.
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Ok => 0,
            Self::Client => 1,
            Self::Kms => 2,
            Self::CryptShared => 3,
        }
    }

    /// Parses an ABI value.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Ok),
            1 => Some(Self::Client),
            2 => Some(Self::Kms),
            3 => Some(Self::CryptShared),
            _ => None,
        }
    }
}

/// Severity of an engine log record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Unrecoverable engine failure.
    Fatal,
    /// Error.
    Error,
    /// Warning.
    Warning,
    /// Informational.
    Info,
    /// Verbose tracing.
    Trace,
}

impl LogLevel {
    /// ABI value of this level.
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Fatal => 0,
            Self::Error => 1,
            Self::Warning => 2,
            Self::Info => 3,
            Self::Trace => 4,
        }
    }

    /// Parses an ABI value.
    pub const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(Self::Fatal),
            1 => Some(Self::Error),
            2 => Some(Self::Warning),
            3 => Some(Self::Info),
            4 => Some(Self::Trace),
            _ => None,
        }
    }
}

/// Block cipher hook: `(ctx, key, iv, input, output, bytes_written, status)`.
pub type CryptoFn = unsafe extern "C" fn(
    ctx: *mut c_void,
    key: *mut RawBinary,
    iv: *mut RawBinary,
    input: *mut RawBinary,
    output: *mut RawBinary,
    bytes_written: *mut u32,
    status: *mut RawStatus,
) -> bool;

/// Random hook: `(ctx, output, count, status)`.
pub type RandomFn = unsafe extern "C" fn(
    ctx: *mut c_void,
    output: *mut RawBinary,
    count: u32,
    status: *mut RawStatus,
) -> bool;

/// Keyed hook (HMAC, signature): `(ctx, key, input, output, status)`.
pub type HmacFn = unsafe extern "C" fn(
    ctx: *mut c_void,
    key: *mut RawBinary,
    input: *mut RawBinary,
    output: *mut RawBinary,
    status: *mut RawStatus,
) -> bool;

/// Hash hook: `(ctx, input, output, status)`.
pub type HashFn = unsafe extern "C" fn(
    ctx: *mut c_void,
    input: *mut RawBinary,
    output: *mut RawBinary,
    status: *mut RawStatus,
) -> bool;

/// Log handler: `(level, message, message_len, ctx)`.
pub type LogFn = unsafe extern "C" fn(level: u32, message: *const u8, message_len: u32, ctx: *mut c_void);

/// Callbacks passed to the engine's `set_crypto_hooks` entry point.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct CryptoCallbacks {
    /// AES-256-CBC encryption.
    pub aes_256_cbc_encrypt: CryptoFn,
    /// AES-256-CBC decryption.
    pub aes_256_cbc_decrypt: CryptoFn,
    /// Secure random bytes.
    pub random: RandomFn,
    /// HMAC-SHA-512.
    pub hmac_sha_512: HmacFn,
    /// HMAC-SHA-256.
    pub hmac_sha_256: HmacFn,
    /// SHA-256.
    pub sha_256: HashFn,
}

/// Entry points of the native engine.
///
/// A production binding forwards each method to the engine's exported C
/// symbol of the same name. Every `bool` return reports success; on `false`
/// the failure detail is available through [`EngineApi::status`].
///
/// # Safety
///
/// Methods taking a [`RawEngine`] pointer require a pointer obtained from
/// [`EngineApi::create`] on the same implementation that has not been passed
/// to [`EngineApi::destroy`]. Document buffers are only borrowed for the
/// duration of the call.
pub trait EngineApi: Send + Sync {
    /// Allocates a native handle.
    fn create(&self) -> Option<NonNull<RawEngine>>;

    /// Releases a native handle. Idempotent on the engine side.
    unsafe fn destroy(&self, engine: NonNull<RawEngine>);

    /// Sets the KMS provider credential document.
    unsafe fn set_kms_providers(&self, engine: NonNull<RawEngine>, document: &mut RawBinary) -> bool;

    /// Sets the local schema map document.
    unsafe fn set_schema_map(&self, engine: NonNull<RawEngine>, document: &mut RawBinary) -> bool;

    /// Sets the encrypted fields map document.
    unsafe fn set_encrypted_fields_map(
        &self,
        engine: NonNull<RawEngine>,
        document: &mut RawBinary,
    ) -> bool;

    /// Disables automatic query analysis.
    unsafe fn set_bypass_query_analysis(&self, engine: NonNull<RawEngine>);

    /// Installs the log handler. `ctx` is passed back on every call.
    unsafe fn set_log_handler(&self, engine: NonNull<RawEngine>, handler: LogFn, ctx: *mut c_void) -> bool;

    /// Installs the mandatory crypto callbacks.
    unsafe fn set_crypto_hooks(
        &self,
        engine: NonNull<RawEngine>,
        callbacks: &CryptoCallbacks,
        ctx: *mut c_void,
    ) -> bool;

    /// Whether the engine exposes the AES-256-CTR entry point.
    fn supports_aes_256_ctr(&self) -> bool {
        false
    }

    /// Installs AES-256-CTR callbacks.
    unsafe fn set_aes_256_ctr_hooks(
        &self,
        _engine: NonNull<RawEngine>,
        _encrypt: CryptoFn,
        _decrypt: CryptoFn,
        _ctx: *mut c_void,
    ) -> bool {
        false
    }

    /// Installs the RSASSA-PKCS1-v1_5 signing callback.
    unsafe fn set_sign_hook(&self, engine: NonNull<RawEngine>, sign: HmacFn, ctx: *mut c_void) -> bool;

    /// Runs one-time initialization after every option is set.
    unsafe fn init(&self, engine: NonNull<RawEngine>) -> bool;

    /// Copies the engine's current status into `out`.
    unsafe fn status(&self, engine: NonNull<RawEngine>, out: &mut RawStatus);
}

/// Releases a region the host allocated for the engine.
///
/// # Safety
///
/// `data` and `len` must describe a region previously handed out by the
/// bridge as a [`BUFFER_HOST_OWNED`] buffer or a hook status message, and
/// must be released at most once.
#[no_mangle]
pub unsafe extern "C" fn keyshim_release(data: *mut u8, len: u32) {
    // SAFETY: forwarded caller contract.
    unsafe { crate::buffer::release_host_allocation(data, len) }
}
