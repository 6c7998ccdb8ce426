//! # Keyshim Bridge
//!
//! Host side of the client-side field level encryption engine.
//!
//! The engine is an opaque native library that performs no cryptography of
//! its own. This crate owns its lifecycle and answers its callbacks:
//! - [`EngineHandle`] creates, configures, initializes and destroys a handle
//! - [`CryptoHookSet`] implements every crypto callback on top of `keyshim-crypto`
//! - [`buffer`] and [`status`] wrap the raw byte regions and status records
//! - [`guard`] keeps hook failures and panics from crossing the boundary
//! - [`logger`] routes engine log records into `tracing`

#![deny(unsafe_op_in_unsafe_fn)]
#![warn(missing_docs)]

pub mod abi;
pub mod buffer;
pub mod config;
pub mod error;
pub mod guard;
pub mod handle;
pub mod hooks;
pub mod logger;
pub mod options;
pub mod probe;
pub mod status;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use abi::{EngineApi, LogLevel, RawEngine, StatusCategory};
pub use config::{ConfigFile, EngineConfig, KmsCredentials, KmsTlsOptions, TlsOptions};
pub use error::BridgeError;
pub use guard::HookError;
pub use handle::{EngineHandle, EngineRef};
pub use hooks::CryptoHookSet;
pub use logger::{EngineLogger, TracingLogger};
pub use options::OptionConfigurator;
pub use probe::{HookProbe, OutputMode};
pub use status::Status;
