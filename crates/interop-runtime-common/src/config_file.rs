//! TOML configuration file for the interop-runtime CLI.
//!
//! A file has two optional tables, `[runtime]` (engine and linking settings,
//! see [`RuntimeConfig`]) and `[logging]` (see [`LoggingConfig`]). Missing
//! keys fall back to their defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::RuntimeConfig;

/// Parsed configuration file.
///
/// ```toml
/// [runtime.engine]
/// optimize = true
/// max_wasm_stack_kb = 1024
///
/// [runtime.linking]
/// allow_shadowing = false
/// memory_export = "memory"
///
/// [logging]
/// filter = "info,interop_runtime_core=debug"
/// json = false
/// ```
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ConfigFile {
    /// Settings for the runtime context.
    #[serde(default)]
    pub runtime: RuntimeConfig,

    /// Settings for the CLI's log output.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl ConfigFile {
    /// Read and parse the file at `path`.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigFileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self, ConfigFileError> {
        Ok(toml::from_str(text)?)
    }
}

/// `[logging]` table.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default `tracing` filter directive, used when `RUST_LOG` is unset.
    #[serde(default = "defaults::filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: defaults::filter(),
            json: false,
        }
    }
}

/// Errors loading a [`ConfigFile`].
#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    /// The file could not be read.
    #[error("Cannot read config file '{path}': {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The contents are not valid TOML or do not match the schema.
    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
}

mod defaults {
    pub fn filter() -> String {
        "info".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_file() {
        let config = ConfigFile::default();

        assert_eq!(config.logging.filter, "info");
        assert!(!config.logging.json);
        assert!(!config.runtime.linking.allow_shadowing);
    }

    #[test]
    fn test_parse_minimal_config() {
        let text = r#"
            [logging]
            json = true
        "#;

        let config = ConfigFile::from_toml(text).unwrap();

        assert!(config.logging.json);
        assert_eq!(config.logging.filter, "info");
        assert_eq!(config.runtime.engine.max_wasm_stack_kb, 512);
    }

    #[test]
    fn test_parse_full_config() {
        let text = r#"
            [runtime.engine]
            pooling_allocator = true
            max_instances = 8
            instance_memory_mb = 16
            optimize = false
            max_wasm_stack_kb = 1024

            [runtime.linking]
            allow_shadowing = true
            memory_export = "mem"

            [logging]
            filter = "debug"
            json = true
        "#;

        let config = ConfigFile::from_toml(text).unwrap();

        assert!(config.runtime.engine.pooling_allocator);
        assert_eq!(config.runtime.engine.max_instances, 8);
        assert_eq!(config.runtime.engine.instance_memory_mb, 16);
        assert!(!config.runtime.engine.optimize);
        assert_eq!(config.runtime.engine.max_wasm_stack_kb, 1024);
        assert!(config.runtime.linking.allow_shadowing);
        assert_eq!(config.runtime.linking.memory_export, "mem");
        assert_eq!(config.logging.filter, "debug");
        assert!(config.logging.json);
    }

    #[test]
    fn test_rejects_malformed_toml() {
        let result = ConfigFile::from_toml("[runtime.engine");
        assert!(matches!(result, Err(ConfigFileError::Parse(_))));
    }

    #[test]
    fn test_rejects_wrong_value_type() {
        let result = ConfigFile::from_toml("[runtime.linking]\nallow_shadowing = \"yes\"\n");
        assert!(matches!(result, Err(ConfigFileError::Parse(_))));
    }

    #[test]
    fn test_missing_file() {
        let result = ConfigFile::from_file("/definitely/not/here.toml");
        assert!(matches!(result, Err(ConfigFileError::Io { .. })));
    }
}
