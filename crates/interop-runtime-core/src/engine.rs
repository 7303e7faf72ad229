//! Compilation engine shared by one runtime context.
//!
//! Guest code runs synchronously and to completion on the calling thread.
//! There is no fuel metering or epoch interruption; a runaway guest is only
//! stopped by a trap (stack exhaustion, out-of-bounds access, ...).

use std::sync::Arc;

use tracing::{debug, info};
use wasmtime::{Config, Engine, InstanceAllocationStrategy, OptLevel, PoolingAllocationConfig};

use interop_runtime_common::{EngineConfig, RuntimeError};

/// A wasmtime [`Engine`] plus the settings it was built with.
///
/// Cloning is cheap and yields a handle to the same engine, so modules
/// compiled through either clone are interchangeable.
#[derive(Clone)]
pub struct WasmEngine {
    engine: Arc<Engine>,
    settings: EngineConfig,
}

impl WasmEngine {
    /// Build an engine from `settings`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] if wasmtime rejects the
    /// resulting configuration (e.g. pooling limits the platform cannot
    /// reserve).
    pub fn new(settings: &EngineConfig) -> Result<Self, RuntimeError> {
        let engine = Engine::new(&wasmtime_config(settings))
            .map_err(|e| RuntimeError::invalid_config(format!("Engine setup rejected: {e:#}")))?;

        debug!(
            optimize = settings.optimize,
            max_wasm_stack_kb = settings.max_wasm_stack_kb,
            pooling = settings.pooling_allocator,
            "Engine ready"
        );

        Ok(Self {
            engine: Arc::new(engine),
            settings: settings.clone(),
        })
    }

    /// The wrapped wasmtime engine.
    pub fn inner(&self) -> &Engine {
        &self.engine
    }

    /// Settings this engine was built with.
    pub fn config(&self) -> &EngineConfig {
        &self.settings
    }

    /// Whether instances come from pre-reserved pool slots.
    pub fn is_pooling_enabled(&self) -> bool {
        self.settings.pooling_allocator
    }
}

impl std::fmt::Debug for WasmEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WasmEngine")
            .field("optimize", &self.settings.optimize)
            .field("pooling", &self.settings.pooling_allocator)
            .field("max_wasm_stack_kb", &self.settings.max_wasm_stack_kb)
            .finish_non_exhaustive()
    }
}

fn wasmtime_config(settings: &EngineConfig) -> Config {
    let mut config = Config::new();

    let level = if settings.optimize {
        OptLevel::Speed
    } else {
        OptLevel::None
    };
    config.cranelift_opt_level(level);
    config.max_wasm_stack(settings.max_wasm_stack_bytes());

    if settings.pooling_allocator {
        config.allocation_strategy(InstanceAllocationStrategy::Pooling(pool_limits(settings)));
        info!(
            slots = settings.max_instances,
            memory_mb = settings.instance_memory_mb,
            "Using pooling instance allocator"
        );
    }

    config
}

/// One memory and one table per instance slot.
fn pool_limits(settings: &EngineConfig) -> PoolingAllocationConfig {
    let slots = settings.max_instances;
    let mut pool = PoolingAllocationConfig::default();
    pool.total_core_instances(slots)
        .total_memories(slots)
        .total_tables(slots)
        .max_memory_size(settings.instance_memory_mb as usize * 1024 * 1024);
    pool
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_engine_is_on_demand() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();

        assert!(!engine.is_pooling_enabled());
        assert!(engine.config().optimize);
    }

    #[test]
    fn test_pooling_engine() {
        let settings = EngineConfig {
            pooling_allocator: true,
            max_instances: 4,
            instance_memory_mb: 16,
            ..Default::default()
        };
        let engine = WasmEngine::new(&settings).unwrap();

        assert!(engine.is_pooling_enabled());
        assert_eq!(engine.config().max_instances, 4);
    }

    #[test]
    fn test_unoptimized_engine() {
        let settings = EngineConfig {
            optimize: false,
            ..Default::default()
        };

        assert!(WasmEngine::new(&settings).is_ok());
    }

    #[test]
    fn test_clones_share_engine() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let clone = engine.clone();

        assert!(Engine::same(engine.inner(), clone.inner()));
    }

    #[test]
    fn test_debug_output() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();

        let rendered = format!("{engine:?}");
        assert!(rendered.starts_with("WasmEngine"));
        assert!(rendered.contains("max_wasm_stack_kb"));
    }
}
