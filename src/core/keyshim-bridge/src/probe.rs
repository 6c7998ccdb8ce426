//! Host-side driver that calls crypto hooks through their raw C signatures.
//!
//! Used by the self-test command and by tests to exercise exactly the code
//! path the engine takes, with buffers owned on the Rust side.

use std::ptr;

use keyshim_crypto::BLOCK_SIZE;

use crate::abi::{
    CryptoFn, HmacFn, RawBinary, RawStatus, BUFFER_FIXED, BUFFER_GROWABLE, BUFFER_HOST_OWNED,
};
use crate::buffer::release_host_allocation;
use crate::hooks::CryptoHookSet;
use crate::status::Status;

/// How output buffers are handed to hooks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Pointer+length buffers the hook fills with its own allocation.
    #[default]
    Growable,
    /// Preallocated buffers of fixed capacity.
    Fixed,
}

/// Calls the hooks of a [`CryptoHookSet`] the way an engine would.
#[derive(Debug, Clone, Copy)]
pub struct HookProbe {
    hooks: CryptoHookSet,
    mode: OutputMode,
}

impl HookProbe {
    /// Probes `hooks` with growable output buffers.
    pub fn new(hooks: CryptoHookSet) -> Self {
        Self {
            hooks,
            mode: OutputMode::default(),
        }
    }

    /// Selects the output buffer convention.
    pub fn with_output_mode(mut self, mode: OutputMode) -> Self {
        self.mode = mode;
        self
    }

    /// Runs the AES-256-CBC encryption hook.
    pub fn aes_256_cbc_encrypt(&self, key: &[u8], iv: &[u8], input: &[u8]) -> Result<Vec<u8>, Status> {
        self.cipher(self.hooks.aes_256_cbc_encrypt, key, iv, input, input.len() + BLOCK_SIZE)
    }

    /// Runs the AES-256-CBC decryption hook.
    pub fn aes_256_cbc_decrypt(&self, key: &[u8], iv: &[u8], input: &[u8]) -> Result<Vec<u8>, Status> {
        self.cipher(self.hooks.aes_256_cbc_decrypt, key, iv, input, input.len())
    }

    /// Runs the AES-256-CTR encryption hook.
    pub fn aes_256_ctr_encrypt(&self, key: &[u8], iv: &[u8], input: &[u8]) -> Result<Vec<u8>, Status> {
        self.cipher(self.hooks.aes_256_ctr_encrypt, key, iv, input, input.len())
    }

    /// Runs the AES-256-CTR decryption hook.
    pub fn aes_256_ctr_decrypt(&self, key: &[u8], iv: &[u8], input: &[u8]) -> Result<Vec<u8>, Status> {
        self.cipher(self.hooks.aes_256_ctr_decrypt, key, iv, input, input.len())
    }

    /// Runs the random hook for `count` bytes.
    pub fn random(&self, count: u32) -> Result<Vec<u8>, Status> {
        let mut output = Output::new(self.mode, count as usize);
        let mut status = RawStatus::default();
        // SAFETY: every pointer refers to a live local for the duration of the call.
        let ok = unsafe { (self.hooks.random)(ptr::null_mut(), output.raw(), count, &mut status) };
        finish(ok, output, None, status)
    }

    /// Runs the HMAC-SHA-512 hook.
    pub fn hmac_sha_512(&self, key: &[u8], input: &[u8]) -> Result<Vec<u8>, Status> {
        self.keyed(self.hooks.hmac_sha_512, key, input, 64)
    }

    /// Runs the HMAC-SHA-256 hook.
    pub fn hmac_sha_256(&self, key: &[u8], input: &[u8]) -> Result<Vec<u8>, Status> {
        self.keyed(self.hooks.hmac_sha_256, key, input, 32)
    }

    /// Runs the SHA-256 hook.
    pub fn sha_256(&self, input: &[u8]) -> Result<Vec<u8>, Status> {
        let mut input = Input::new(input);
        let mut output = Output::new(self.mode, 32);
        let mut status = RawStatus::default();
        // SAFETY: every pointer refers to a live local for the duration of the call.
        let ok = unsafe { (self.hooks.sha_256)(ptr::null_mut(), input.raw(), output.raw(), &mut status) };
        finish(ok, output, None, status)
    }

    /// Runs the RSASSA-PKCS1-v1_5 signing hook with a PKCS#8 DER key.
    ///
    /// Fixed output buffers are sized for keys up to 4096 bits.
    pub fn sign_rsaes_pkcs1_v1_5(&self, private_key: &[u8], input: &[u8]) -> Result<Vec<u8>, Status> {
        self.keyed(self.hooks.sign_rsaes_pkcs1_v1_5, private_key, input, 512)
    }

    fn cipher(
        &self,
        hook: CryptoFn,
        key: &[u8],
        iv: &[u8],
        input: &[u8],
        capacity: usize,
    ) -> Result<Vec<u8>, Status> {
        let mut key = Input::new(key);
        let mut iv = Input::new(iv);
        let mut input = Input::new(input);
        let mut output = Output::new(self.mode, capacity);
        let mut written = 0u32;
        let mut status = RawStatus::default();
        // SAFETY: every pointer refers to a live local for the duration of the call.
        let ok = unsafe {
            hook(
                ptr::null_mut(),
                key.raw(),
                iv.raw(),
                input.raw(),
                output.raw(),
                &mut written,
                &mut status,
            )
        };
        finish(ok, output, Some(written), status)
    }

    fn keyed(&self, hook: HmacFn, key: &[u8], input: &[u8], capacity: usize) -> Result<Vec<u8>, Status> {
        let mut key = Input::new(key);
        let mut input = Input::new(input);
        let mut output = Output::new(self.mode, capacity);
        let mut status = RawStatus::default();
        // SAFETY: every pointer refers to a live local for the duration of the call.
        let ok = unsafe { hook(ptr::null_mut(), key.raw(), input.raw(), output.raw(), &mut status) };
        finish(ok, output, None, status)
    }
}

struct Input {
    bytes: Vec<u8>,
    raw: RawBinary,
}

impl Input {
    fn new(bytes: &[u8]) -> Self {
        Self {
            bytes: bytes.to_vec(),
            raw: RawBinary::growable(),
        }
    }

    fn raw(&mut self) -> *mut RawBinary {
        self.raw = RawBinary {
            data: self.bytes.as_mut_ptr(),
            len: self.bytes.len() as u32,
            mode: BUFFER_FIXED,
        };
        &mut self.raw
    }
}

struct Output {
    storage: Vec<u8>,
    raw: RawBinary,
}

impl Output {
    fn new(mode: OutputMode, capacity: usize) -> Self {
        let mut storage = Vec::new();
        let raw = match mode {
            OutputMode::Growable => RawBinary::growable(),
            OutputMode::Fixed => {
                storage = vec![0u8; capacity];
                RawBinary {
                    data: storage.as_mut_ptr(),
                    len: capacity as u32,
                    mode: BUFFER_FIXED,
                }
            }
        };
        Self { storage, raw }
    }

    fn raw(&mut self) -> *mut RawBinary {
        &mut self.raw
    }

    /// Copies out the result, releasing any host allocation the hook made.
    fn take(mut self) -> Vec<u8> {
        match self.raw.mode {
            BUFFER_FIXED => {
                self.storage.truncate(self.raw.len as usize);
                std::mem::take(&mut self.storage)
            }
            BUFFER_HOST_OWNED => {
                let bytes = if self.raw.len == 0 {
                    Vec::new()
                } else {
                    // SAFETY: the hook left a host allocation of len bytes.
                    unsafe { std::slice::from_raw_parts(self.raw.data, self.raw.len as usize) }.to_vec()
                };
                // SAFETY: released once; raw is reset below.
                unsafe { release_host_allocation(self.raw.data, self.raw.len) };
                self.raw = RawBinary::growable();
                bytes
            }
            _ => Vec::new(),
        }
    }
}

impl Drop for Output {
    fn drop(&mut self) {
        if self.raw.mode == BUFFER_HOST_OWNED {
            // SAFETY: the hook left a host allocation that nobody else releases.
            unsafe { release_host_allocation(self.raw.data, self.raw.len) };
        }
    }
}

fn finish(ok: bool, output: Output, written: Option<u32>, mut status: RawStatus) -> Result<Vec<u8>, Status> {
    if !ok {
        // SAFETY: a failing hook writes its message through StatusChannel.
        return Err(unsafe { Status::take_from_hook(&mut status) });
    }
    let bytes = output.take();
    if let Some(written) = written {
        if written as usize != bytes.len() {
            return Err(Status::client_error(format!(
                "ProbeMismatch: hook reported {written} bytes written but produced {}",
                bytes.len()
            )));
        }
    }
    Ok(bytes)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    fn probes() -> [HookProbe; 2] {
        let probe = HookProbe::new(CryptoHookSet::host());
        [probe, probe.with_output_mode(OutputMode::Fixed)]
    }

    #[test]
    fn test_cbc_roundtrip_both_modes() {
        let key = [9u8; 32];
        let iv = [4u8; 16];
        for probe in probes() {
            for len in [0usize, 5, 16, 40] {
                let plaintext = vec![0xabu8; len];
                let ciphertext = probe.aes_256_cbc_encrypt(&key, &iv, &plaintext).unwrap();
                assert_eq!(ciphertext.len(), (len / 16 + 1) * 16);
                let decrypted = probe.aes_256_cbc_decrypt(&key, &iv, &ciphertext).unwrap();
                assert_eq!(decrypted, plaintext);
            }
        }
    }

    #[test]
    fn test_ctr_roundtrip() {
        let key = [9u8; 32];
        let iv = [0u8; 16];
        for probe in probes() {
            let ciphertext = probe.aes_256_ctr_encrypt(&key, &iv, b"counter mode").unwrap();
            assert_eq!(ciphertext.len(), 12);
            let plaintext = probe.aes_256_ctr_decrypt(&key, &iv, &ciphertext).unwrap();
            assert_eq!(plaintext, b"counter mode");
        }
    }

    #[test]
    fn test_random_sizes() {
        for probe in probes() {
            for count in [0u32, 16, 32, 256] {
                assert_eq!(probe.random(count).unwrap().len(), count as usize);
            }
            assert_ne!(probe.random(32).unwrap(), probe.random(32).unwrap());
        }
    }

    #[test]
    fn test_sha_256_empty() {
        for probe in probes() {
            assert_eq!(
                hex::encode(probe.sha_256(b"").unwrap()),
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
            );
        }
    }

    #[test]
    fn test_hmac_sizes() {
        for probe in probes() {
            let a = probe.hmac_sha_256(b"key", b"input").unwrap();
            assert_eq!(a.len(), 32);
            assert_eq!(a, probe.hmac_sha_256(b"key", b"input").unwrap());
            assert_eq!(probe.hmac_sha_512(b"key", b"input").unwrap().len(), 64);
        }
    }

    #[test]
    fn test_sign_malformed_key() {
        let status = HookProbe::new(CryptoHookSet::host())
            .sign_rsaes_pkcs1_v1_5(b"garbage", b"input")
            .unwrap_err();
        assert!(status.message.starts_with("InvalidKey: "));
    }

    #[test]
    fn test_malformed_inputs_return_status() {
        for probe in probes() {
            let status = probe.aes_256_cbc_encrypt(&[0u8; 10], &[0u8; 16], b"x").unwrap_err();
            assert_eq!(status.code, 1);
            assert!(!status.message.is_empty());

            let status = probe.aes_256_cbc_decrypt(&[0u8; 32], &[0u8; 16], &[0u8; 7]).unwrap_err();
            assert!(status.message.starts_with("InvalidInput: "));

            let status = probe.aes_256_ctr_encrypt(&[0u8; 32], &[0u8; 3], b"x").unwrap_err();
            assert!(status.message.starts_with("InvalidIv: "));
        }
    }
}
