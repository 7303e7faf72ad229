//! Runtime context: engine, store, and import namespace for guest modules.
//!
//! A [`RuntimeContext`] walks a guest module through its whole lifecycle:
//!
//! 1. Register host callbacks with [`RuntimeContext::define_function`]
//! 2. Compile the guest source (text or binary)
//! 3. Link declared imports against the registered bindings
//! 4. Instantiate, yielding a [`ModuleHandle`]
//!
//! Defining imports and loading modules may be interleaved, but every import
//! a module declares must be bound before that module is loaded.
//!
//! # Threading
//!
//! Guest code runs synchronously on the calling thread. A context can move
//! between threads but must not be shared; every mutating operation takes
//! `&mut self`.

use std::collections::HashMap;
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, instrument};
use uuid::Uuid;
use wasmtime::{Engine, ExternType, Linker, Store, Trap};

use interop_runtime_common::{HostFunctionError, RuntimeConfig, RuntimeError};

use crate::binder::{
    BindingTable, HostFunction, HostFunctionWithCaller, HostFunctionWithMemory, ImportBinding,
};
use crate::instance::ModuleHandle;
use crate::module::CompiledModule;
use crate::store::{HostState, create_store};
use crate::value::{Signature, describe_func_type};
use crate::WasmEngine;

/// Owner of one engine, one store, and one import linker.
///
/// # Example
///
/// ```ignore
/// use interop_runtime_core::RuntimeContext;
///
/// let mut ctx = RuntimeContext::new()?;
/// ctx.define_function("env", "double", |x: i32| x * 2)?;
///
/// let module = ctx.load_from_text("calc", WAT)?;
/// let add = module.get_function2::<i32, i32, i32>(&ctx, "add")?;
/// assert_eq!(add.call(&mut ctx, 10, 3)?, 13);
///
/// ctx.dispose();
/// ```
pub struct RuntimeContext {
    id: Uuid,
    config: RuntimeConfig,
    inner: Option<ContextInner>,
}

/// Resources released by [`RuntimeContext::dispose`].
///
/// Field order documents acquisition order; release runs in reverse.
struct ContextInner {
    engine: WasmEngine,
    linker: Linker<HostState>,
    store: Store<HostState>,
    bindings: BindingTable,
}

impl RuntimeContext {
    /// Create a context with the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be created.
    pub fn new() -> Result<Self, RuntimeError> {
        Self::with_config(RuntimeConfig::default())
    }

    /// Create a context with the given configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the engine cannot be created.
    pub fn with_config(config: RuntimeConfig) -> Result<Self, RuntimeError> {
        let id = Uuid::new_v4();
        let engine = WasmEngine::new(&config.engine)?;

        let mut linker = Linker::new(engine.inner());
        linker.allow_shadowing(config.linking.allow_shadowing);

        let store = create_store(
            &engine,
            HostState::new(id, config.linking.memory_export.clone()),
        );

        info!(context_id = %id, "Runtime context created");

        Ok(Self {
            id,
            config,
            inner: Some(ContextInner {
                engine,
                linker,
                store,
                bindings: BindingTable::default(),
            }),
        })
    }

    /// Unique identifier of this context.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Configuration this context was created with.
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Returns `true` once [`RuntimeContext::dispose`] has run.
    pub fn is_disposed(&self) -> bool {
        self.inner.is_none()
    }

    fn inner(&self) -> Result<&ContextInner, RuntimeError> {
        self.inner.as_ref().ok_or(RuntimeError::Disposed)
    }

    fn inner_mut(&mut self) -> Result<&mut ContextInner, RuntimeError> {
        self.inner.as_mut().ok_or(RuntimeError::Disposed)
    }

    /// The engine, for compiling modules outside of a load call.
    pub fn engine(&self) -> Result<&WasmEngine, RuntimeError> {
        Ok(&self.inner()?.engine)
    }

    /// Borrow the store on behalf of a handle created by context `owner`.
    pub(crate) fn store(&self, owner: Uuid) -> Result<&Store<HostState>, RuntimeError> {
        if owner != self.id {
            return Err(RuntimeError::ContextMismatch);
        }
        Ok(&self.inner()?.store)
    }

    /// Mutably borrow the store on behalf of a handle created by context `owner`.
    pub(crate) fn store_mut(&mut self, owner: Uuid) -> Result<&mut Store<HostState>, RuntimeError> {
        if owner != self.id {
            return Err(RuntimeError::ContextMismatch);
        }
        Ok(&mut self.inner_mut()?.store)
    }

    /// Number of host callback invocations served by this context's store.
    pub fn host_calls(&self) -> Result<u64, RuntimeError> {
        Ok(self.inner()?.store.data().host_calls())
    }

    /// Registered imports in registration order.
    pub fn imports(&self) -> Result<&[ImportBinding], RuntimeError> {
        Ok(self.inner()?.bindings.as_slice())
    }

    /// Bind a host callback as the import `namespace.name`.
    ///
    /// The callback's parameter and result types determine the import
    /// signature; each must be `i32`, `i64`, `f32` or `f64`.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::InvalidConfig`] if the pair is already bound
    /// and shadowing is disabled, or if the linker rejects the definition.
    #[instrument(skip(self, callback), fields(context_id = %self.id))]
    pub fn define_function<P, R, F>(
        &mut self,
        namespace: &str,
        name: &str,
        callback: F,
    ) -> Result<(), RuntimeError>
    where
        F: HostFunction<P, R>,
    {
        let binding = ImportBinding {
            namespace: namespace.to_string(),
            name: name.to_string(),
            signature: F::signature(),
            memory_access: false,
            caller_access: false,
        };
        self.bind(binding, |linker| callback.register(linker, namespace, name))
    }

    /// Bind a host callback that also receives the calling instance's memory.
    ///
    /// The [`crate::MemoryAccess`] argument is valid for one invocation only.
    /// The memory is looked up under [`interop_runtime_common::LinkConfig::memory_export`].
    ///
    /// # Errors
    ///
    /// Same as [`RuntimeContext::define_function`].
    #[instrument(skip(self, callback), fields(context_id = %self.id))]
    pub fn define_function_with_memory_access<P, R, F>(
        &mut self,
        namespace: &str,
        name: &str,
        callback: F,
    ) -> Result<(), RuntimeError>
    where
        F: HostFunctionWithMemory<P, R>,
    {
        let binding = ImportBinding {
            namespace: namespace.to_string(),
            name: name.to_string(),
            signature: F::signature(),
            memory_access: true,
            caller_access: false,
        };
        self.bind(binding, |linker| callback.register(linker, namespace, name))
    }

    /// Bind a host callback that receives a [`crate::HostCaller`] for the calling
    /// guest's store.
    ///
    /// Through the caller the callback can call exports of modules loaded
    /// in this context while the guest call is still running. Those exports
    /// may call back into the host again; nesting is limited only by the
    /// engine's stack limit.
    ///
    /// # Errors
    ///
    /// Same as [`RuntimeContext::define_function`].
    #[instrument(skip(self, callback), fields(context_id = %self.id))]
    pub fn define_function_with_caller<P, R, F>(
        &mut self,
        namespace: &str,
        name: &str,
        callback: F,
    ) -> Result<(), RuntimeError>
    where
        F: HostFunctionWithCaller<P, R>,
    {
        let binding = ImportBinding {
            namespace: namespace.to_string(),
            name: name.to_string(),
            signature: F::signature(),
            memory_access: false,
            caller_access: true,
        };
        self.bind(binding, |linker| callback.register(linker, namespace, name))
    }

    fn bind(
        &mut self,
        binding: ImportBinding,
        register: impl FnOnce(&mut Linker<HostState>) -> wasmtime::Result<()>,
    ) -> Result<(), RuntimeError> {
        let allow_shadowing = self.config.linking.allow_shadowing;
        let inner = self.inner_mut()?;
        inner
            .bindings
            .check_available(&binding.namespace, &binding.name, allow_shadowing)?;

        register(&mut inner.linker).map_err(|e| {
            RuntimeError::invalid_config(format!(
                "Failed to define '{}.{}': {e}",
                binding.namespace, binding.name
            ))
        })?;

        debug!(import = %binding, "Host function defined");
        inner.bindings.insert(binding);
        Ok(())
    }

    /// Compile a text (WAT) module without instantiating it.
    pub fn compile_text(&self, name: &str, text: &str) -> Result<CompiledModule, RuntimeError> {
        CompiledModule::from_text(self.inner()?.engine.inner(), name, text)
    }

    /// Compile a binary module without instantiating it.
    pub fn compile_binary(&self, name: &str, bytes: &[u8]) -> Result<CompiledModule, RuntimeError> {
        CompiledModule::from_binary(self.inner()?.engine.inner(), name, bytes)
    }

    /// Link and instantiate a compiled module against the registered imports.
    ///
    /// # Errors
    ///
    /// - [`RuntimeError::LinkFailed`] if an import is unbound or its
    ///   declared signature differs from the binding
    /// - [`RuntimeError::InstantiationFailed`] if start-up code traps
    /// - [`RuntimeError::InvalidConfig`] if `module` was compiled by
    ///   another context's engine
    #[instrument(skip(self, module), fields(context_id = %self.id, module = %module.name()))]
    pub fn instantiate(&mut self, module: &CompiledModule) -> Result<ModuleHandle, RuntimeError> {
        let start = Instant::now();
        let id = self.id;
        let inner = self.inner_mut()?;

        if !Engine::same(module.inner().engine(), inner.engine.inner()) {
            return Err(RuntimeError::invalid_config(format!(
                "Module '{}' was compiled by a different engine",
                module.name()
            )));
        }

        check_imports(module, &inner.bindings)?;

        let pre = inner
            .linker
            .instantiate_pre(module.inner())
            .map_err(|e| RuntimeError::link_failed(module.name(), format!("{e:#}")))?;

        debug!("Imports resolved, instantiating");

        let instance = pre
            .instantiate(&mut inner.store)
            .map_err(|e| RuntimeError::instantiation_failed(module.name(), instantiation_reason(&e)))?;

        let mut externs = HashMap::new();
        for name in module.export_names() {
            if let Some(ext) = instance.get_export(&mut inner.store, &name) {
                externs.insert(name, ext);
            }
        }

        info!(
            duration_us = start.elapsed().as_micros(),
            exports = externs.len(),
            "Module instantiated"
        );

        Ok(ModuleHandle::new(module.clone(), id, instance, externs))
    }

    /// Compile and instantiate a text (WAT) module.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::CompilationFailed`] for malformed source, plus the
    /// errors of [`RuntimeContext::instantiate`].
    pub fn load_from_text(&mut self, name: &str, text: &str) -> Result<ModuleHandle, RuntimeError> {
        let module = self.compile_text(name, text)?;
        self.instantiate(&module)
    }

    /// Compile and instantiate a binary module.
    ///
    /// # Errors
    ///
    /// Same as [`RuntimeContext::load_from_text`].
    pub fn load_from_binary(
        &mut self,
        name: &str,
        bytes: &[u8],
    ) -> Result<ModuleHandle, RuntimeError> {
        let module = self.compile_binary(name, bytes)?;
        self.instantiate(&module)
    }

    /// Read a text module from disk and load it under the file's stem.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Io`] if the file cannot be read, plus the errors of
    /// [`RuntimeContext::load_from_text`].
    pub fn load_from_file(&mut self, path: impl AsRef<Path>) -> Result<ModuleHandle, RuntimeError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| io_error(path, e))?;
        self.load_from_text(&module_name(path), &text)
    }

    /// Read a binary module from disk and load it under the file's stem.
    ///
    /// # Errors
    ///
    /// [`RuntimeError::Io`] if the file cannot be read, plus the errors of
    /// [`RuntimeContext::load_from_binary`].
    pub fn load_from_binary_file(
        &mut self,
        path: impl AsRef<Path>,
    ) -> Result<ModuleHandle, RuntimeError> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| io_error(path, e))?;
        self.load_from_binary(&module_name(path), &bytes)
    }

    /// Release the store, then the linker, then the engine.
    ///
    /// Handles created by this context become unusable. Calling `dispose`
    /// again does nothing.
    pub fn dispose(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };

        let ContextInner {
            engine,
            linker,
            store,
            bindings,
        } = inner;

        drop(store);
        drop(linker);
        drop(bindings);
        drop(engine);

        info!(context_id = %self.id, "Runtime context disposed");
    }
}

impl Drop for RuntimeContext {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for RuntimeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("id", &self.id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// Describe why instantiation failed. Only engine traps are labelled as such.
fn instantiation_reason(error: &wasmtime::Error) -> String {
    if let Some(host) = error.downcast_ref::<HostFunctionError>() {
        format!("start function host call failed: {host}")
    } else if let Some(trap) = error.downcast_ref::<Trap>() {
        format!("start function trapped ({trap:?}): {error:#}")
    } else {
        format!("{error:#}")
    }
}

/// Check every declared import against the binding table.
///
/// Reports all problems at once so a single load shows every missing import.
fn check_imports(module: &CompiledModule, bindings: &BindingTable) -> Result<(), RuntimeError> {
    let mut problems = Vec::new();

    for import in module.inner().imports() {
        let (namespace, name) = (import.module(), import.name());
        match (import.ty(), bindings.get(namespace, name)) {
            (ExternType::Func(ty), Some(binding)) => {
                if Signature::from_func_type(&ty).as_ref() != Some(&binding.signature) {
                    problems.push(format!(
                        "import '{namespace}.{name}' declared as {} but bound as {}",
                        describe_func_type(&ty),
                        binding.signature
                    ));
                }
            }
            (ExternType::Func(ty), None) => problems.push(format!(
                "unbound import '{namespace}.{name}' {}",
                describe_func_type(&ty)
            )),
            (_, _) => problems.push(format!(
                "unsupported non-function import '{namespace}.{name}'"
            )),
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(RuntimeError::link_failed(module.name(), problems.join("; ")))
    }
}

fn module_name(path: &Path) -> String {
    path.file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("module")
        .to_string()
}

fn io_error(path: &Path, source: std::io::Error) -> RuntimeError {
    RuntimeError::Io {
        path: path.display().to_string(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caller::HostCaller;

    #[test]
    fn test_module_name_strips_extension() {
        assert_eq!(module_name(Path::new("/tmp/calculator.wat")), "calculator");
        assert_eq!(module_name(Path::new("strings.v2.wasm")), "strings.v2");
        assert_eq!(module_name(Path::new("noext")), "noext");
    }

    #[test]
    fn test_context_ids_are_unique() {
        let a = RuntimeContext::new().unwrap();
        let b = RuntimeContext::new().unwrap();

        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_dispose_is_idempotent() {
        let mut ctx = RuntimeContext::new().unwrap();
        assert!(!ctx.is_disposed());

        ctx.dispose();
        ctx.dispose();

        assert!(ctx.is_disposed());
        assert!(matches!(ctx.host_calls(), Err(RuntimeError::Disposed)));
    }

    #[test]
    fn test_store_rejects_foreign_owner() {
        let ctx = RuntimeContext::new().unwrap();

        assert!(ctx.store(ctx.id()).is_ok());
        assert!(matches!(
            ctx.store(Uuid::new_v4()),
            Err(RuntimeError::ContextMismatch)
        ));
    }

    #[test]
    fn test_duplicate_definition_rejected() {
        let mut ctx = RuntimeContext::new().unwrap();

        ctx.define_function("env", "f", |x: i32| x).unwrap();
        let result = ctx.define_function("env", "f", |x: i32| x + 1);

        assert!(matches!(result, Err(RuntimeError::InvalidConfig { .. })));
        assert_eq!(ctx.imports().unwrap().len(), 1);
    }

    #[test]
    fn test_module_from_other_engine_rejected() {
        let a = RuntimeContext::new().unwrap();
        let mut b = RuntimeContext::new().unwrap();
        let module = a.compile_text("answer", "(module (func (export \"f\")))").unwrap();

        let err = b.instantiate(&module).unwrap_err();

        match err {
            RuntimeError::InvalidConfig { reason } => {
                assert!(reason.contains("different engine"));
                assert!(!reason.contains("trap"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_instantiation_reason_labels() {
        let trap = wasmtime::Error::new(Trap::UnreachableCodeReached);
        assert!(instantiation_reason(&trap).contains("UnreachableCodeReached"));

        let host = wasmtime::Error::new(HostFunctionError::failed("boom"));
        assert_eq!(instantiation_reason(&host), "start function host call failed: boom");

        let other = wasmtime::Error::msg("out of slots");
        assert_eq!(instantiation_reason(&other), "out of slots");
    }

    #[test]
    fn test_caller_binding_recorded() {
        let mut ctx = RuntimeContext::new().unwrap();

        ctx.define_function_with_caller("env", "relay", |_caller: &mut HostCaller<'_>, x: i32| x)
            .unwrap();

        let binding = &ctx.imports().unwrap()[0];
        assert!(binding.caller_access);
        assert!(!binding.memory_access);
        assert_eq!(binding.to_string(), "env.relay (i32) -> i32 [caller]");
    }

    #[test]
    fn test_define_after_dispose() {
        let mut ctx = RuntimeContext::new().unwrap();
        ctx.dispose();

        let result = ctx.define_function("env", "f", || {});
        assert!(matches!(result, Err(RuntimeError::Disposed)));
    }
}
