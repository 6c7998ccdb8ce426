//! Host implementations of the engine's crypto callbacks.
//!
//! Every hook follows the same protocol: read its inputs into owned bytes,
//! run the primitive from [`keyshim_crypto`], write the result into the
//! output buffer (and the length slot for variable-length output). The whole
//! body runs inside [`guarded`], so failures only surface as a status record
//! and a `false` return. The leading context argument is ignored.

use std::ffi::c_void;
use std::ptr::{self, NonNull};

use tracing::debug;
use zeroize::Zeroizing;

use keyshim_crypto::{cbc, ctr, mac, random, sign};

use crate::abi::{
    CryptoCallbacks, CryptoFn, EngineApi, HashFn, HmacFn, RandomFn, RawBinary, RawEngine, RawStatus,
};
use crate::buffer::{BufferView, LengthSlot};
use crate::error::BridgeError;
use crate::guard::{guarded, HookError};
use crate::status::Status;

/// The full set of host crypto callbacks registered with an engine.
#[derive(Debug, Clone, Copy)]
pub struct CryptoHookSet {
    /// AES-256-CBC encryption, PKCS#7 padded.
    pub aes_256_cbc_encrypt: CryptoFn,
    /// AES-256-CBC decryption.
    pub aes_256_cbc_decrypt: CryptoFn,
    /// AES-256-CTR encryption.
    pub aes_256_ctr_encrypt: CryptoFn,
    /// AES-256-CTR decryption.
    pub aes_256_ctr_decrypt: CryptoFn,
    /// Secure random bytes.
    pub random: RandomFn,
    /// HMAC-SHA-512.
    pub hmac_sha_512: HmacFn,
    /// HMAC-SHA-256.
    pub hmac_sha_256: HmacFn,
    /// SHA-256.
    pub sha_256: HashFn,
    /// RSASSA-PKCS1-v1_5 over SHA-256.
    pub sign_rsaes_pkcs1_v1_5: HmacFn,
}

impl CryptoHookSet {
    /// Hooks backed by this crate's primitives.
    pub const fn host() -> Self {
        Self {
            aes_256_cbc_encrypt,
            aes_256_cbc_decrypt,
            aes_256_ctr_encrypt,
            aes_256_ctr_decrypt,
            random: random_bytes,
            hmac_sha_512,
            hmac_sha_256,
            sha_256,
            sign_rsaes_pkcs1_v1_5,
        }
    }

    /// The subset passed to the engine's `set_crypto_hooks` entry point.
    pub fn callbacks(&self) -> CryptoCallbacks {
        CryptoCallbacks {
            aes_256_cbc_encrypt: self.aes_256_cbc_encrypt,
            aes_256_cbc_decrypt: self.aes_256_cbc_decrypt,
            random: self.random,
            hmac_sha_512: self.hmac_sha_512,
            hmac_sha_256: self.hmac_sha_256,
            sha_256: self.sha_256,
        }
    }

    /// Registers every hook with `engine`.
    ///
    /// The CTR hooks are only offered to engines that expose the entry point.
    ///
    /// # Safety
    ///
    /// `engine` must be a live handle created by `api`.
    pub(crate) unsafe fn register(
        &self,
        api: &dyn EngineApi,
        engine: NonNull<RawEngine>,
    ) -> Result<(), BridgeError> {
        let ctx = ptr::null_mut();

        // SAFETY: engine is live per caller contract; hooks are 'static functions.
        if !unsafe { api.set_crypto_hooks(engine, &self.callbacks(), ctx) } {
            // SAFETY: as above.
            return Err(unsafe { rejected(api, engine, "crypto_hooks") });
        }

        if api.supports_aes_256_ctr() {
            // SAFETY: as above.
            let ok = unsafe {
                api.set_aes_256_ctr_hooks(engine, self.aes_256_ctr_encrypt, self.aes_256_ctr_decrypt, ctx)
            };
            if !ok {
                // SAFETY: as above.
                return Err(unsafe { rejected(api, engine, "aes_256_ctr_hooks") });
            }
        }

        // SAFETY: as above.
        if !unsafe { api.set_sign_hook(engine, self.sign_rsaes_pkcs1_v1_5, ctx) } {
            // SAFETY: as above.
            return Err(unsafe { rejected(api, engine, "sign_hook") });
        }

        debug!(aes_256_ctr = api.supports_aes_256_ctr(), "crypto hooks registered");
        Ok(())
    }
}

impl Default for CryptoHookSet {
    fn default() -> Self {
        Self::host()
    }
}

/// Builds an [`BridgeError::OptionRejected`] from the engine's current status.
///
/// # Safety
///
/// `engine` must be a live handle created by `api`.
pub(crate) unsafe fn rejected(api: &dyn EngineApi, engine: NonNull<RawEngine>, option: &'static str) -> BridgeError {
    let mut raw = RawStatus::default();
    // SAFETY: engine is live per caller contract; the message is copied before
    // any further engine call.
    let status = unsafe {
        api.status(engine, &mut raw);
        Status::from_engine(&raw)
    };
    BridgeError::OptionRejected {
        option,
        message: status.message,
    }
}

unsafe fn read(raw: *mut RawBinary, what: &'static str) -> Result<Vec<u8>, HookError> {
    // SAFETY: the engine passes live buffers for the duration of the hook.
    Ok(unsafe { BufferView::from_raw(raw, what) }?.read())
}

unsafe fn read_secret(raw: *mut RawBinary, what: &'static str) -> Result<Zeroizing<Vec<u8>>, HookError> {
    // SAFETY: forwarded.
    unsafe { read(raw, what) }.map(Zeroizing::new)
}

unsafe fn write(raw: *mut RawBinary, what: &'static str, bytes: &[u8]) -> Result<(), HookError> {
    // SAFETY: the engine passes live buffers for the duration of the hook.
    unsafe { BufferView::from_raw(raw, what) }?.write(bytes)?;
    Ok(())
}

unsafe fn write_variable(raw: *mut RawBinary, bytes_written: *mut u32, bytes: &[u8]) -> Result<(), HookError> {
    // SAFETY: the engine passes a live length slot for the duration of the hook.
    let mut slot = unsafe { LengthSlot::from_raw(bytes_written) }?;
    // SAFETY: forwarded.
    unsafe { write(raw, "output", bytes) }?;
    slot.set(bytes.len())?;
    Ok(())
}

unsafe extern "C" fn aes_256_cbc_encrypt(
    _ctx: *mut c_void,
    key: *mut RawBinary,
    iv: *mut RawBinary,
    input: *mut RawBinary,
    output: *mut RawBinary,
    bytes_written: *mut u32,
    status: *mut RawStatus,
) -> bool {
    // SAFETY: every pointer comes from the engine and is live for this call.
    unsafe {
        guarded("aes_256_cbc_encrypt", status, || {
            let key = read_secret(key, "key")?;
            let iv = read(iv, "iv")?;
            let plaintext = read_secret(input, "input")?;
            let ciphertext = cbc::encrypt(&key, &iv, &plaintext)?;
            write_variable(output, bytes_written, &ciphertext)
        })
    }
}

unsafe extern "C" fn aes_256_cbc_decrypt(
    _ctx: *mut c_void,
    key: *mut RawBinary,
    iv: *mut RawBinary,
    input: *mut RawBinary,
    output: *mut RawBinary,
    bytes_written: *mut u32,
    status: *mut RawStatus,
) -> bool {
    // SAFETY: every pointer comes from the engine and is live for this call.
    unsafe {
        guarded("aes_256_cbc_decrypt", status, || {
            let key = read_secret(key, "key")?;
            let iv = read(iv, "iv")?;
            let ciphertext = read(input, "input")?;
            let plaintext = cbc::decrypt(&key, &iv, &ciphertext)?;
            write_variable(output, bytes_written, &plaintext)
        })
    }
}

unsafe extern "C" fn aes_256_ctr_encrypt(
    _ctx: *mut c_void,
    key: *mut RawBinary,
    iv: *mut RawBinary,
    input: *mut RawBinary,
    output: *mut RawBinary,
    bytes_written: *mut u32,
    status: *mut RawStatus,
) -> bool {
    // SAFETY: every pointer comes from the engine and is live for this call.
    unsafe {
        guarded("aes_256_ctr_encrypt", status, || {
            let key = read_secret(key, "key")?;
            let iv = read(iv, "iv")?;
            let plaintext = read_secret(input, "input")?;
            let ciphertext = ctr::encrypt(&key, &iv, &plaintext)?;
            write_variable(output, bytes_written, &ciphertext)
        })
    }
}

unsafe extern "C" fn aes_256_ctr_decrypt(
    _ctx: *mut c_void,
    key: *mut RawBinary,
    iv: *mut RawBinary,
    input: *mut RawBinary,
    output: *mut RawBinary,
    bytes_written: *mut u32,
    status: *mut RawStatus,
) -> bool {
    // SAFETY: every pointer comes from the engine and is live for this call.
    unsafe {
        guarded("aes_256_ctr_decrypt", status, || {
            let key = read_secret(key, "key")?;
            let iv = read(iv, "iv")?;
            let ciphertext = read(input, "input")?;
            let plaintext = Zeroizing::new(ctr::decrypt(&key, &iv, &ciphertext)?);
            write_variable(output, bytes_written, &plaintext)
        })
    }
}

unsafe extern "C" fn random_bytes(
    _ctx: *mut c_void,
    output: *mut RawBinary,
    count: u32,
    status: *mut RawStatus,
) -> bool {
    // SAFETY: every pointer comes from the engine and is live for this call.
    unsafe {
        guarded("random", status, || {
            let bytes = Zeroizing::new(random::generate_bytes(count as usize)?);
            write(output, "output", &bytes)
        })
    }
}

unsafe extern "C" fn hmac_sha_512(
    _ctx: *mut c_void,
    key: *mut RawBinary,
    input: *mut RawBinary,
    output: *mut RawBinary,
    status: *mut RawStatus,
) -> bool {
    // SAFETY: every pointer comes from the engine and is live for this call.
    unsafe {
        guarded("hmac_sha_512", status, || {
            let key = read_secret(key, "key")?;
            let input = read(input, "input")?;
            write(output, "output", &mac::hmac_sha512(&key, &input)?)
        })
    }
}

unsafe extern "C" fn hmac_sha_256(
    _ctx: *mut c_void,
    key: *mut RawBinary,
    input: *mut RawBinary,
    output: *mut RawBinary,
    status: *mut RawStatus,
) -> bool {
    // SAFETY: every pointer comes from the engine and is live for this call.
    unsafe {
        guarded("hmac_sha_256", status, || {
            let key = read_secret(key, "key")?;
            let input = read(input, "input")?;
            write(output, "output", &mac::hmac_sha256(&key, &input)?)
        })
    }
}

unsafe extern "C" fn sha_256(
    _ctx: *mut c_void,
    input: *mut RawBinary,
    output: *mut RawBinary,
    status: *mut RawStatus,
) -> bool {
    // SAFETY: every pointer comes from the engine and is live for this call.
    unsafe {
        guarded("sha_256", status, || {
            let input = read(input, "input")?;
            write(output, "output", &mac::sha256(&input))
        })
    }
}

unsafe extern "C" fn sign_rsaes_pkcs1_v1_5(
    _ctx: *mut c_void,
    key: *mut RawBinary,
    input: *mut RawBinary,
    output: *mut RawBinary,
    status: *mut RawStatus,
) -> bool {
    // SAFETY: every pointer comes from the engine and is live for this call.
    unsafe {
        guarded("sign_rsaes_pkcs1_v1_5", status, || {
            let key = read_secret(key, "key")?;
            let input = read(input, "input")?;
            write(output, "output", &sign::sign_rsa_pkcs1v15_sha256(&key, &input)?)
        })
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;
    use crate::abi::{BUFFER_FIXED, BUFFER_HOST_OWNED};

    fn fixed(storage: &mut [u8]) -> RawBinary {
        RawBinary {
            data: storage.as_mut_ptr(),
            len: storage.len() as u32,
            mode: BUFFER_FIXED,
        }
    }

    #[test]
    fn test_cbc_encrypt_fixed_output_sets_length_slot() {
        let hooks = CryptoHookSet::host();
        let mut key = [1u8; 32];
        let mut iv = [2u8; 16];
        let mut input = *b"attack at dawn";
        let mut out = [0u8; 64];
        let mut raw_out = fixed(&mut out);
        let mut written = 0u32;
        let mut status = RawStatus::default();

        let ok = unsafe {
            (hooks.aes_256_cbc_encrypt)(
                ptr::null_mut(),
                &mut fixed(&mut key),
                &mut fixed(&mut iv),
                &mut fixed(&mut input),
                &mut raw_out,
                &mut written,
                &mut status,
            )
        };

        assert!(ok);
        assert_eq!(written, 16);
        assert_eq!(raw_out.len, 16);
        assert!(status.message.is_null());
        let expected = cbc::encrypt(&[1u8; 32], &[2u8; 16], b"attack at dawn").unwrap();
        assert_eq!(&out[..16], &expected[..]);
    }

    #[test]
    fn test_cbc_encrypt_short_key_reports_status() {
        let hooks = CryptoHookSet::host();
        let mut key = [1u8; 10];
        let mut iv = [2u8; 16];
        let mut input = *b"data";
        let mut out = RawBinary::growable();
        let mut written = 0u32;
        let mut status = RawStatus::default();

        let ok = unsafe {
            (hooks.aes_256_cbc_encrypt)(
                ptr::null_mut(),
                &mut fixed(&mut key),
                &mut fixed(&mut iv),
                &mut fixed(&mut input),
                &mut out,
                &mut written,
                &mut status,
            )
        };

        assert!(!ok);
        assert!(out.data.is_null());
        let status = unsafe { Status::take_from_hook(&mut status) };
        assert_eq!(status.code, 1);
        assert_eq!(status.message, "InvalidKey: invalid key: expected 32 bytes, got 10");
    }

    #[test]
    fn test_hmac_output_overflow_is_contained() {
        let hooks = CryptoHookSet::host();
        let mut key = [3u8; 32];
        let mut input = *b"input";
        let mut out = [0u8; 32];
        let mut status = RawStatus::default();

        let ok = unsafe {
            (hooks.hmac_sha_512)(
                ptr::null_mut(),
                &mut fixed(&mut key),
                &mut fixed(&mut input),
                &mut fixed(&mut out),
                &mut status,
            )
        };

        assert!(!ok);
        let status = unsafe { Status::take_from_hook(&mut status) };
        assert!(status.message.starts_with("BufferError: 64 bytes do not fit"));
    }

    #[test]
    fn test_random_growable_output() {
        let hooks = CryptoHookSet::host();
        let mut out = RawBinary::growable();
        let mut status = RawStatus::default();

        assert!(unsafe { (hooks.random)(ptr::null_mut(), &mut out, 32, &mut status) });
        assert_eq!(out.len, 32);
        assert_eq!(out.mode, BUFFER_HOST_OWNED);
        unsafe { crate::abi::keyshim_release(out.data, out.len) };
    }

    #[test]
    fn test_null_input_reported() {
        let hooks = CryptoHookSet::host();
        let mut out = [0u8; 32];
        let mut status = RawStatus::default();

        let ok = unsafe {
            (hooks.sha_256)(ptr::null_mut(), ptr::null_mut(), &mut fixed(&mut out), &mut status)
        };

        assert!(!ok);
        let status = unsafe { Status::take_from_hook(&mut status) };
        assert_eq!(status.message, "BufferError: null input pointer");
    }

    #[test]
    fn test_callbacks_subset() {
        let hooks = CryptoHookSet::host();
        let callbacks = hooks.callbacks();
        assert_eq!(callbacks.sha_256 as usize, hooks.sha_256 as usize);
        assert_eq!(callbacks.random as usize, hooks.random as usize);
    }
}
