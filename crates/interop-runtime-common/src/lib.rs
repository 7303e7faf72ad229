//! Common types, errors, and configuration for interop-runtime.
//!
//! This crate provides shared functionality used across the interop-runtime workspace:
//! - Error types using `thiserror` for the whole host/guest failure vocabulary
//! - Configuration structures for engine and linking settings
//! - TOML configuration file loading

pub mod config;
pub mod config_file;
pub mod error;

pub use config::{EngineConfig, LinkConfig, RuntimeConfig};
pub use config_file::{ConfigFile, ConfigFileError, LoggingConfig};
pub use error::{HostFunctionError, MemoryError, RuntimeError};
