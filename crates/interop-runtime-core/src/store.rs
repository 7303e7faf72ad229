//! Execution state shared by every instance of one runtime context.
//!
//! This module provides:
//! - [`HostState`]: Store data visible to host callbacks through [`wasmtime::Caller`]
//! - [`create_store`]: Store construction for a context

use uuid::Uuid;
use wasmtime::Store;

use crate::WasmEngine;

/// Per-context execution state.
///
/// One `HostState` lives inside the single [`Store`] owned by a runtime
/// context. Host callbacks reach it through the [`wasmtime::Caller`].
#[derive(Debug)]
pub struct HostState {
    /// Identifier of the owning runtime context.
    context_id: Uuid,

    /// Memory export name handed to memory-access callbacks.
    memory_export: String,

    /// Number of host callback invocations served so far.
    host_calls: u64,
}

impl HostState {
    /// Create a new host state for the given context.
    pub fn new(context_id: Uuid, memory_export: impl Into<String>) -> Self {
        Self {
            context_id,
            memory_export: memory_export.into(),
            host_calls: 0,
        }
    }

    /// Identifier of the owning runtime context.
    pub fn context_id(&self) -> Uuid {
        self.context_id
    }

    /// Memory export name handed to memory-access callbacks.
    pub fn memory_export(&self) -> &str {
        &self.memory_export
    }

    /// Number of host callback invocations served so far.
    pub fn host_calls(&self) -> u64 {
        self.host_calls
    }

    /// Count one host callback invocation.
    pub(crate) fn record_host_call(&mut self) {
        self.host_calls = self.host_calls.saturating_add(1);
    }
}

/// Create a new Wasmtime store for a runtime context.
pub fn create_store(engine: &WasmEngine, state: HostState) -> Store<HostState> {
    Store::new(engine.inner(), state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use interop_runtime_common::EngineConfig;

    #[test]
    fn test_host_state_creation() {
        let id = Uuid::new_v4();
        let state = HostState::new(id, "memory");

        assert_eq!(state.context_id(), id);
        assert_eq!(state.memory_export(), "memory");
        assert_eq!(state.host_calls(), 0);
    }

    #[test]
    fn test_record_host_call() {
        let mut state = HostState::new(Uuid::new_v4(), "memory");

        state.record_host_call();
        state.record_host_call();

        assert_eq!(state.host_calls(), 2);
    }

    #[test]
    fn test_store_creation() {
        let engine = WasmEngine::new(&EngineConfig::default()).unwrap();
        let id = Uuid::new_v4();

        let store = create_store(&engine, HostState::new(id, "mem"));
        assert_eq!(store.data().context_id(), id);
        assert_eq!(store.data().memory_export(), "mem");
    }
}
