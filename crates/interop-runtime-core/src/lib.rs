//! Core Wasmtime interop runtime for interop-runtime.
//!
//! This crate lets a host call guest exports and lets guests call host
//! callbacks through statically typed handles:
//! - [`RuntimeContext`]: owns the engine, store, and import linker
//! - [`HostFunction`] / [`HostFunctionWithMemory`] / [`HostFunctionWithCaller`]:
//!   typed import binding
//! - [`HostCaller`]: a callback's view of the calling store, for nested
//!   export calls
//! - [`ModuleHandle`]: typed lookup of exported functions and memories
//! - [`MemoryView`] / [`MemoryAccess`]: linear memory marshaling helpers
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │                    RuntimeContext                       │
//! │  - WasmEngine (compilation settings)                    │
//! │  - Linker<HostState> (namespace.name → host callback)   │
//! │  - Store<HostState> (memories, instances)               │
//! └─────────────────────────────────────────────────────────┘
//!                            │ load_from_text / load_from_binary
//!                            ▼
//! ┌─────────────────────────────────────────────────────────┐
//! │                     ModuleHandle                        │
//! │  - CompiledModule export metadata                       │
//! │  - TypedExport callables, MemoryView                    │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! Only the numeric value kinds `i32`, `i64`, `f32` and `f64` cross the
//! boundary. Strings and arrays travel through linear memory as
//! (pointer, length) pairs.

pub mod binder;
pub mod caller;
pub mod context;
pub mod engine;
pub mod instance;
pub mod memory;
pub mod module;
pub mod store;
pub mod value;

pub use binder::{
    HostFunction, HostFunctionWithCaller, HostFunctionWithMemory, HostReturn, ImportBinding,
};
pub use caller::{CallContext, HostCaller};
pub use context::RuntimeContext;
pub use engine::WasmEngine;
pub use instance::{
    Action0, Action1, Action2, Function0, Function1, Function2, Function3, ModuleHandle,
    TypedExport,
};
pub use memory::{MemoryAccess, MemoryView, PAGE_SIZE};
pub use module::{CompiledModule, ExportInfo, ExportKind};
pub use store::HostState;
pub use value::{Signature, Value, ValueKind, WasmNum};

pub use interop_runtime_common::{HostFunctionError, MemoryError, RuntimeError};
