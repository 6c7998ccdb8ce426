//! Safe views over engine byte regions.

use std::ptr;

use thiserror::Error;

use crate::abi::{RawBinary, BUFFER_FIXED, BUFFER_GROWABLE, BUFFER_HOST_OWNED};

/// Errors raised while reading or writing an engine buffer.
#[derive(Debug, Error)]
pub enum BufferError {
    /// The engine passed a null pointer where a buffer was required.
    #[error("null {0} pointer")]
    Null(&'static str),

    /// Output does not fit a fixed-capacity buffer.
    #[error("{needed} bytes do not fit the {capacity}-byte {what} buffer")]
    Overflow {
        /// Buffer name.
        what: &'static str,
        /// Bytes the hook produced.
        needed: usize,
        /// Capacity supplied by the engine.
        capacity: usize,
    },

    /// Length does not fit the engine's 32-bit length field.
    #[error("length {0} exceeds the engine's 32-bit limit")]
    TooLarge(usize),

    /// Buffer carries an unknown ownership mode.
    #[error("unknown mode {mode} on {what} buffer")]
    UnknownMode {
        /// Buffer name.
        what: &'static str,
        /// Raw mode value.
        mode: u32,
    },
}

/// Read/write view over a [`RawBinary`] shared with the engine.
pub struct BufferView<'a> {
    raw: &'a mut RawBinary,
    what: &'static str,
}

impl<'a> BufferView<'a> {
    /// Wraps a raw buffer pointer. `what` names the buffer in error messages.
    ///
    /// # Safety
    ///
    /// `raw` must be null or point to a live `RawBinary` for `'a`, whose
    /// `data` is readable for `len` bytes, writable as well when the mode is
    /// [`BUFFER_FIXED`], and a bridge allocation when the mode is
    /// [`BUFFER_HOST_OWNED`].
    pub unsafe fn from_raw(raw: *mut RawBinary, what: &'static str) -> Result<Self, BufferError> {
        // SAFETY: null or valid for 'a per caller contract.
        let raw = unsafe { raw.as_mut() }.ok_or(BufferError::Null(what))?;
        Ok(Self { raw, what })
    }

    /// Current length in bytes.
    pub fn len(&self) -> usize {
        self.raw.len as usize
    }

    /// Whether the region is empty.
    pub fn is_empty(&self) -> bool {
        self.raw.len == 0
    }

    /// Copies out the current bytes. Never mutates the region.
    pub fn read(&self) -> Vec<u8> {
        if self.raw.data.is_null() || self.raw.len == 0 {
            return Vec::new();
        }
        // SAFETY: data is readable for len bytes per from_raw contract.
        unsafe { std::slice::from_raw_parts(self.raw.data, self.raw.len as usize) }.to_vec()
    }

    /// Replaces the contents with `bytes`.
    ///
    /// Fixed buffers are filled in place and their length shrinks to the
    /// bytes written. Growable and host-owned buffers receive a fresh host
    /// allocation that stays valid until the engine passes it to
    /// [`crate::abi::keyshim_release`].
    pub fn write(&mut self, bytes: &[u8]) -> Result<(), BufferError> {
        let len = u32::try_from(bytes.len()).map_err(|_| BufferError::TooLarge(bytes.len()))?;

        match self.raw.mode {
            BUFFER_FIXED => {
                let capacity = self.raw.len as usize;
                if bytes.len() > capacity {
                    return Err(BufferError::Overflow {
                        what: self.what,
                        needed: bytes.len(),
                        capacity,
                    });
                }
                if !bytes.is_empty() {
                    // SAFETY: data is writable for capacity >= bytes.len() bytes and
                    // cannot overlap a slice the hook owns.
                    unsafe { ptr::copy_nonoverlapping(bytes.as_ptr(), self.raw.data, bytes.len()) };
                }
                self.raw.len = len;
            }
            BUFFER_GROWABLE | BUFFER_HOST_OWNED => {
                let (data, len) = host_alloc(bytes);
                if self.raw.mode == BUFFER_HOST_OWNED {
                    // SAFETY: the previous region is a bridge allocation per from_raw contract.
                    unsafe { release_host_allocation(self.raw.data, self.raw.len) };
                }
                self.raw.data = data;
                self.raw.len = len;
                self.raw.mode = BUFFER_HOST_OWNED;
            }
            mode => {
                return Err(BufferError::UnknownMode {
                    what: self.what,
                    mode,
                })
            }
        }
        Ok(())
    }
}

/// Out-parameter receiving the number of bytes a variable-length hook wrote.
pub struct LengthSlot<'a> {
    slot: &'a mut u32,
}

impl<'a> LengthSlot<'a> {
    /// Wraps a raw length pointer.
    ///
    /// # Safety
    ///
    /// `raw` must be null or valid for writes for `'a`.
    pub unsafe fn from_raw(raw: *mut u32) -> Result<Self, BufferError> {
        // SAFETY: null or valid per caller contract.
        let slot = unsafe { raw.as_mut() }.ok_or(BufferError::Null("bytes_written"))?;
        Ok(Self { slot })
    }

    /// Stores `len`.
    pub fn set(&mut self, len: usize) -> Result<(), BufferError> {
        *self.slot = u32::try_from(len).map_err(|_| BufferError::TooLarge(len))?;
        Ok(())
    }
}

/// Copies `bytes` into a fresh host allocation whose length equals its capacity.
pub(crate) fn host_alloc(bytes: &[u8]) -> (*mut u8, u32) {
    let boxed: Box<[u8]> = bytes.into();
    let len = boxed.len() as u32;
    (Box::into_raw(boxed).cast::<u8>(), len)
}

/// Frees a region produced by [`host_alloc`].
///
/// # Safety
///
/// `data` must be null or come from [`host_alloc`] with the same `len`, and
/// must not be released twice.
pub(crate) unsafe fn release_host_allocation(data: *mut u8, len: u32) {
    if data.is_null() {
        return;
    }
    // SAFETY: reconstructs the exact Box<[u8]> leaked by host_alloc.
    drop(unsafe { Box::from_raw(ptr::slice_from_raw_parts_mut(data, len as usize)) });
}
