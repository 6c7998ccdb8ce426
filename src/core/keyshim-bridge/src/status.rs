//! Status records exchanged with the engine.

use std::fmt;

use crate::abi::{RawStatus, StatusCategory};
use crate::buffer::{host_alloc, release_host_allocation};

/// Error code reported with every hook failure.
pub const HOOK_FAILURE_CODE: u32 = 1;

/// Owned copy of a status record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    /// Failure category.
    pub category: StatusCategory,
    /// Category specific code.
    pub code: u32,
    /// Human readable description.
    pub message: String,
}

impl Status {
    /// The status every failing hook reports: client error, code 1.
    pub fn client_error(message: impl Into<String>) -> Self {
        Self {
            category: StatusCategory::Client,
            code: HOOK_FAILURE_CODE,
            message: message.into(),
        }
    }

    /// Whether this status reports success.
    pub fn is_ok(&self) -> bool {
        self.category == StatusCategory::Ok
    }

    /// Copies a status the engine filled in. The message stays engine-owned.
    ///
    /// # Safety
    ///
    /// `raw.message` must be null or readable for `raw.message_len` bytes.
    pub unsafe fn from_engine(raw: &RawStatus) -> Self {
        Self {
            // Unknown categories come from newer engines; report them as client errors.
            category: StatusCategory::from_raw(raw.category).unwrap_or(StatusCategory::Client),
            code: raw.code,
            // SAFETY: forwarded caller contract.
            message: unsafe { read_message(raw) },
        }
    }

    /// Takes a status written by a hook, releasing its host-allocated message
    /// and resetting `raw` to an empty record.
    ///
    /// # Safety
    ///
    /// `raw` must have been written by [`StatusChannel::update`] or carry a
    /// null message.
    pub unsafe fn take_from_hook(raw: &mut RawStatus) -> Self {
        // SAFETY: message was produced by host_alloc per caller contract.
        let status = unsafe { Self::from_engine(raw) };
        // SAFETY: as above; released exactly once since raw is reset below.
        unsafe { release_host_allocation(raw.message, raw.message_len) };
        *raw = RawStatus::default();
        status
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} error {}: {}", self.category, self.code, self.message)
    }
}

unsafe fn read_message(raw: &RawStatus) -> String {
    if raw.message.is_null() || raw.message_len == 0 {
        return String::new();
    }
    // SAFETY: readable for message_len bytes per caller contract.
    let bytes = unsafe { std::slice::from_raw_parts(raw.message, raw.message_len as usize) };
    String::from_utf8_lossy(bytes).into_owned()
}

/// Engine-visible status record a hook reports its failure through.
pub struct StatusChannel<'a> {
    raw: &'a mut RawStatus,
}

impl<'a> StatusChannel<'a> {
    /// Wraps a raw status pointer, `None` when the engine passed null.
    ///
    /// # Safety
    ///
    /// `raw` must be null or point to a live `RawStatus` for `'a` whose
    /// message is null or a host allocation.
    pub unsafe fn from_raw(raw: *mut RawStatus) -> Option<Self> {
        // SAFETY: null or valid per caller contract.
        unsafe { raw.as_mut() }.map(|raw| Self { raw })
    }

    /// Sets category, code and message together.
    pub fn update(&mut self, status: &Status) {
        let (message, message_len) = host_alloc(status.message.as_bytes());
        let previous = std::mem::replace(
            self.raw,
            RawStatus {
                category: status.category.as_raw(),
                code: status.code,
                message,
                message_len,
            },
        );
        // SAFETY: a non-null previous message is a host allocation per from_raw contract.
        unsafe { release_host_allocation(previous.message, previous.message_len) };
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)]
mod tests {
    use super::*;

    #[test]
    fn test_update_then_take() {
        let mut raw = RawStatus::default();
        {
            let mut channel = unsafe { StatusChannel::from_raw(&mut raw) }.unwrap();
            channel.update(&Status::client_error("InvalidKey: bad key"));
        }
        assert_eq!(raw.category, StatusCategory::Client.as_raw());
        assert_eq!(raw.code, HOOK_FAILURE_CODE);
        assert_eq!(raw.message_len, 19);

        let status = unsafe { Status::take_from_hook(&mut raw) };
        assert_eq!(status.message, "InvalidKey: bad key");
        assert!(raw.message.is_null());
        assert!(unsafe { Status::from_engine(&raw) }.is_ok());
    }

    #[test]
    fn test_update_replaces_previous_message() {
        let mut raw = RawStatus::default();
        let mut channel = unsafe { StatusChannel::from_raw(&mut raw) }.unwrap();
        channel.update(&Status::client_error("first"));
        channel.update(&Status::client_error("second"));

        let status = unsafe { Status::take_from_hook(&mut raw) };
        assert_eq!(status.message, "second");
    }

    #[test]
    fn test_null_channel() {
        assert!(unsafe { StatusChannel::from_raw(std::ptr::null_mut()) }.is_none());
    }

    #[test]
    fn test_unknown_engine_category() {
        let raw = RawStatus {
            category: 42,
            code: 7,
            ..RawStatus::default()
        };
        let status = unsafe { Status::from_engine(&raw) };
        assert_eq!(status.category, StatusCategory::Client);
        assert_eq!(status.code, 7);
        assert_eq!(status.message, "");
    }
}
