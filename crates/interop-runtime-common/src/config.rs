//! Configuration structures for the interop-runtime.
//!
//! This module defines configuration options for the runtime context:
//! - [`RuntimeConfig`]: Top-level configuration containing all settings
//! - [`EngineConfig`]: Wasmtime engine settings (allocation, optimization, stack)
//! - [`LinkConfig`]: Import binding behavior

use serde::{Deserialize, Serialize};

/// Top-level runtime configuration.
///
/// One `RuntimeConfig` configures one runtime context. It can be built in
/// code or loaded from a TOML file through [`crate::ConfigFile`].
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RuntimeConfig {
    /// Wasmtime engine configuration.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Import binding configuration.
    #[serde(default)]
    pub linking: LinkConfig,
}

/// Wasmtime engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Enable the pooling allocator.
    ///
    /// Pre-allocates slots for instances and memories. Only worth enabling
    /// when a context instantiates many modules.
    #[serde(default = "defaults::pooling_allocator")]
    pub pooling_allocator: bool,

    /// Maximum instances in the pool.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::max_instances")]
    pub max_instances: u32,

    /// Memory per instance slot in megabytes.
    ///
    /// Only effective when `pooling_allocator` is enabled.
    #[serde(default = "defaults::instance_memory_mb")]
    pub instance_memory_mb: u32,

    /// Compile with Cranelift speed optimizations.
    #[serde(default = "defaults::optimize")]
    pub optimize: bool,

    /// Maximum guest stack size in kilobytes before a stack overflow trap.
    #[serde(default = "defaults::max_wasm_stack_kb")]
    pub max_wasm_stack_kb: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            pooling_allocator: defaults::pooling_allocator(),
            max_instances: defaults::max_instances(),
            instance_memory_mb: defaults::instance_memory_mb(),
            optimize: defaults::optimize(),
            max_wasm_stack_kb: defaults::max_wasm_stack_kb(),
        }
    }
}

impl EngineConfig {
    /// Get the maximum guest stack size in bytes.
    pub fn max_wasm_stack_bytes(&self) -> usize {
        self.max_wasm_stack_kb.saturating_mul(1024)
    }
}

/// Import binding configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    /// Allow redefining an already bound (namespace, name) pair.
    ///
    /// When disabled, a second definition is rejected as a configuration
    /// error. When enabled, the most recent definition wins.
    #[serde(default = "defaults::allow_shadowing")]
    pub allow_shadowing: bool,

    /// Name of the calling instance's memory export handed to
    /// memory-access callbacks.
    #[serde(default = "defaults::memory_export")]
    pub memory_export: String,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            allow_shadowing: defaults::allow_shadowing(),
            memory_export: defaults::memory_export(),
        }
    }
}

/// Default value functions for serde.
mod defaults {
    pub const fn pooling_allocator() -> bool {
        false
    }

    pub const fn max_instances() -> u32 {
        100
    }

    pub const fn instance_memory_mb() -> u32 {
        64
    }

    pub const fn optimize() -> bool {
        true
    }

    pub const fn max_wasm_stack_kb() -> usize {
        512
    }

    pub const fn allow_shadowing() -> bool {
        false
    }

    pub fn memory_export() -> String {
        "memory".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RuntimeConfig::default();

        assert!(!config.engine.pooling_allocator);
        assert_eq!(config.engine.max_instances, 100);
        assert_eq!(config.engine.instance_memory_mb, 64);
        assert!(config.engine.optimize);
        assert_eq!(config.engine.max_wasm_stack_kb, 512);

        assert!(!config.linking.allow_shadowing);
        assert_eq!(config.linking.memory_export, "memory");
    }

    #[test]
    fn test_config_serialization() {
        let config = RuntimeConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: RuntimeConfig = serde_json::from_str(&json).unwrap();

        assert_eq!(
            config.engine.max_instances,
            deserialized.engine.max_instances
        );
        assert_eq!(
            config.linking.memory_export,
            deserialized.linking.memory_export
        );
    }

    #[test]
    fn test_max_wasm_stack_bytes() {
        let config = EngineConfig {
            max_wasm_stack_kb: 256,
            ..Default::default()
        };

        assert_eq!(config.max_wasm_stack_bytes(), 256 * 1024);
    }

    #[test]
    fn test_partial_deserialization() {
        let json = r#"{"linking": {"allow_shadowing": true}}"#;
        let config: RuntimeConfig = serde_json::from_str(json).unwrap();

        // Explicitly set value
        assert!(config.linking.allow_shadowing);
        // Default values for unspecified fields
        assert_eq!(config.linking.memory_export, "memory");
        assert!(config.engine.optimize);
    }
}
