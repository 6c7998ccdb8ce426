//! Forwarding of engine log records to a host logger.

use std::ffi::c_void;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::Level;

use crate::abi::LogLevel;

/// Leveled sink for engine log records.
///
/// Called from whatever thread the engine is running on, possibly
/// concurrently, until the owning handle is released.
pub trait EngineLogger: Send + Sync {
    /// Receives one record, verbatim.
    fn log(&self, level: Level, message: &str);
}

impl<F> EngineLogger for F
where
    F: Fn(Level, &str) + Send + Sync,
{
    fn log(&self, level: Level, message: &str) {
        self(level, message)
    }
}

/// Logger forwarding engine records to `tracing` under the `keyshim::engine` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl EngineLogger for TracingLogger {
    fn log(&self, level: Level, message: &str) {
        match level {
            Level::ERROR => tracing::error!(target: "keyshim::engine", "{message}"),
            Level::WARN => tracing::warn!(target: "keyshim::engine", "{message}"),
            Level::INFO => tracing::info!(target: "keyshim::engine", "{message}"),
            Level::DEBUG => tracing::debug!(target: "keyshim::engine", "{message}"),
            _ => tracing::trace!(target: "keyshim::engine", "{message}"),
        }
    }
}

/// Maps an engine level onto the host's leveled sink.
pub fn host_level(level: LogLevel) -> Level {
    match level {
        LogLevel::Fatal | LogLevel::Error => Level::ERROR,
        LogLevel::Warning => Level::WARN,
        LogLevel::Info => Level::INFO,
        LogLevel::Trace => Level::DEBUG,
    }
}

/// Context handed to the engine alongside [`log_trampoline`].
///
/// Boxed and owned by the engine handle, so its address is stable and it is
/// dropped only after the native handle is destroyed.
pub(crate) struct LogSink {
    logger: Arc<dyn EngineLogger>,
}

impl LogSink {
    pub(crate) fn new(logger: Arc<dyn EngineLogger>) -> Box<Self> {
        Box::new(Self { logger })
    }

    pub(crate) fn as_ctx(&self) -> *mut c_void {
        (self as *const Self).cast_mut().cast()
    }
}

impl fmt::Debug for LogSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LogSink").finish_non_exhaustive()
    }
}

/// Log callback registered with the engine. Never unwinds.
pub(crate) unsafe extern "C" fn log_trampoline(
    level: u32,
    message: *const u8,
    message_len: u32,
    ctx: *mut c_void,
) {
    if ctx.is_null() {
        return;
    }
    // SAFETY: ctx is the LogSink registered with the engine, alive until the
    // handle is destroyed.
    let sink = unsafe { &*ctx.cast::<LogSink>() };
    let text = if message.is_null() || message_len == 0 {
        String::new()
    } else {
        // SAFETY: the engine passes message_len readable bytes.
        let bytes = unsafe { std::slice::from_raw_parts(message, message_len as usize) };
        String::from_utf8_lossy(bytes).into_owned()
    };
    let level = LogLevel::from_raw(level).map_or(Level::DEBUG, host_level);

    let _ = panic::catch_unwind(AssertUnwindSafe(|| sink.logger.log(level, &text)));
}
