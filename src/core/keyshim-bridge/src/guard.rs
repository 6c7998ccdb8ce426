//! Failure containment at the callback boundary.
//!
//! Every hook body runs inside [`run_guarded`]: errors and panics alike are
//! turned into a [`Status`], and [`guarded`] reports them to the engine as a
//! status record plus `false`. Nothing unwinds into the engine.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};

use thiserror::Error;
use tracing::debug;

use keyshim_crypto::CryptoError;

use crate::abi::RawStatus;
use crate::buffer::BufferError;
use crate::status::{Status, StatusChannel};

/// Failure inside a hook. Only ever reaches the engine through a status record.
#[derive(Debug, Error)]
pub enum HookError {
    /// The primitive rejected its input.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// An engine buffer could not be read or written.
    #[error(transparent)]
    Buffer(#[from] BufferError),

    /// The hook body panicked.
    #[error("{0}")]
    Panic(String),
}

impl HookError {
    /// Short identifier of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Crypto(e) => e.kind(),
            Self::Buffer(_) => "BufferError",
            Self::Panic(_) => "Panic",
        }
    }

    /// Status reported to the engine: `"<kind>: <description>"`.
    pub fn to_status(&self) -> Status {
        Status::client_error(format!("{}: {}", self.kind(), self))
    }
}

/// Runs `f`, translating any error or panic into a [`Status`].
pub fn run_guarded<T, F>(f: F) -> Result<T, Status>
where
    F: FnOnce() -> Result<T, HookError>,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(e.to_status()),
        Err(payload) => Err(HookError::Panic(panic_message(payload.as_ref())).to_status()),
    }
}

/// Runs a hook body and reports the outcome the way the engine expects.
///
/// Returns `true` and leaves `status` untouched on success. On failure,
/// writes the status record once and returns `false`.
///
/// # Safety
///
/// `status` must satisfy the contract of [`StatusChannel::from_raw`].
pub unsafe fn guarded<F>(hook: &'static str, status: *mut RawStatus, f: F) -> bool
where
    F: FnOnce() -> Result<(), HookError>,
{
    match run_guarded(f) {
        Ok(()) => true,
        Err(failure) => {
            debug!(hook, message = %failure.message, "crypto hook failed");
            // SAFETY: forwarded caller contract.
            if let Some(mut channel) = unsafe { StatusChannel::from_raw(status) } {
                channel.update(&failure);
            }
            false
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "hook panicked".to_string()
    }
}
