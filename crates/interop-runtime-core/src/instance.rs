//! Instantiated modules and typed access to their exports.
//!
//! This module provides:
//! - [`ModuleHandle`]: host-side wrapper over one live instance
//! - [`TypedExport`]: a callable export with a statically known signature,
//!   aliased per shape as [`Action0`]..[`Action2`] and
//!   [`Function0`]..[`Function3`]
//!
//! Handles do not own the store. They keep store indices and the id of the
//! context that created them, and take a [`CallContext`] on every call:
//! the [`RuntimeContext`] itself, or the [`crate::HostCaller`] of a callback
//! running inside a guest call on that context's store.

use std::collections::HashMap;

use tracing::{debug, instrument};
use uuid::Uuid;
use wasmtime::{Extern, Func, Instance, Trap, TypedFunc, WasmParams, WasmResults};

use interop_runtime_common::{HostFunctionError, RuntimeError};

use crate::RuntimeContext;
use crate::caller::CallContext;
use crate::memory::MemoryView;
use crate::module::{CompiledModule, ExportInfo, ExportKind};
use crate::value::{Signature, Value, ValueKind, WasmNum, describe_func_type};

/// Default name of a module's memory export.
pub const DEFAULT_MEMORY_EXPORT: &str = "memory";

/// Void export taking no arguments.
pub type Action0 = TypedExport<(), ()>;
/// Void export taking one argument.
pub type Action1<A> = TypedExport<(A,), ()>;
/// Void export taking two arguments.
pub type Action2<A, B> = TypedExport<(A, B), ()>;
/// Value-returning export taking no arguments.
pub type Function0<R> = TypedExport<(), R>;
/// Value-returning export taking one argument.
pub type Function1<A, R> = TypedExport<(A,), R>;
/// Value-returning export taking two arguments.
pub type Function2<A, B, R> = TypedExport<(A, B), R>;
/// Value-returning export taking three arguments.
pub type Function3<A, B, C, R> = TypedExport<(A, B, C), R>;

/// Host-side handle over one instantiated guest module.
pub struct ModuleHandle {
    name: String,
    context_id: Uuid,
    instance: Instance,
    state: Option<HandleState>,
}

/// Export metadata owned by a live handle.
struct HandleState {
    module: CompiledModule,
    externs: HashMap<String, Extern>,
}

impl ModuleHandle {
    pub(crate) fn new(
        module: CompiledModule,
        context_id: Uuid,
        instance: Instance,
        externs: HashMap<String, Extern>,
    ) -> Self {
        Self {
            name: module.name().to_string(),
            context_id,
            instance,
            state: Some(HandleState { module, externs }),
        }
    }

    /// Module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The underlying Wasmtime instance.
    pub fn instance(&self) -> Instance {
        self.instance
    }

    /// Returns `true` once [`ModuleHandle::dispose`] has been called.
    pub fn is_disposed(&self) -> bool {
        self.state.is_none()
    }

    fn state(&self) -> Result<&HandleState, RuntimeError> {
        self.state.as_ref().ok_or(RuntimeError::Disposed)
    }

    /// Export names in declaration order, recomputed on every call.
    pub fn list_exports(&self) -> Result<Vec<String>, RuntimeError> {
        Ok(self.state()?.module.export_names())
    }

    /// Export table with kinds and signatures, in declaration order.
    pub fn exports(&self) -> Result<Vec<ExportInfo>, RuntimeError> {
        Ok(self.state()?.module.exports())
    }

    /// Release this handle's export metadata.
    ///
    /// The owning context and its store are unaffected. Safe to call more
    /// than once.
    pub fn dispose(&mut self) {
        if self.state.take().is_some() {
            debug!(module = %self.name, "Module handle disposed");
        }
    }

    /// Look up an export function and check it against `expected`.
    fn lookup_func(&self, name: &str, expected: &Signature) -> Result<Func, RuntimeError> {
        let state = self.state()?;

        let info = state
            .module
            .export(name)
            .ok_or_else(|| RuntimeError::export_not_found(name))?;

        let mismatch = || RuntimeError::ExportTypeMismatch {
            name: name.to_string(),
            expected: format!("func {expected}"),
            actual: info.kind.to_string(),
        };

        match state.externs.get(name) {
            Some(Extern::Func(func)) => match &info.kind {
                ExportKind::Function {
                    signature: Some(actual),
                    ..
                } if actual == expected => Ok(*func),
                _ => Err(mismatch()),
            },
            _ => Err(mismatch()),
        }
    }

    fn typed<P, R>(
        &self,
        ctx: &RuntimeContext,
        name: &str,
        expected: Signature,
    ) -> Result<TypedExport<P, R>, RuntimeError>
    where
        P: WasmParams,
        R: WasmResults,
    {
        let func = self.lookup_func(name, &expected)?;
        let store = ctx.store(self.context_id)?;
        let typed = func.typed::<P, R>(store).map_err(|e| RuntimeError::ExportTypeMismatch {
            name: name.to_string(),
            expected: expected.to_string(),
            actual: e.to_string(),
        })?;

        Ok(TypedExport {
            name: name.to_string(),
            context_id: self.context_id,
            func: typed,
        })
    }

    /// Get a void export taking no arguments.
    pub fn get_action0(&self, ctx: &RuntimeContext, name: &str) -> Result<Action0, RuntimeError> {
        self.typed(ctx, name, Signature::new(vec![], None))
    }

    /// Get a void export taking one argument.
    pub fn get_action1<A: WasmNum>(
        &self,
        ctx: &RuntimeContext,
        name: &str,
    ) -> Result<Action1<A>, RuntimeError> {
        self.typed(ctx, name, Signature::new(vec![A::KIND], None))
    }

    /// Get a void export taking two arguments.
    pub fn get_action2<A: WasmNum, B: WasmNum>(
        &self,
        ctx: &RuntimeContext,
        name: &str,
    ) -> Result<Action2<A, B>, RuntimeError> {
        self.typed(ctx, name, Signature::new(vec![A::KIND, B::KIND], None))
    }

    /// Get a value-returning export taking no arguments.
    pub fn get_function0<R: WasmNum>(
        &self,
        ctx: &RuntimeContext,
        name: &str,
    ) -> Result<Function0<R>, RuntimeError> {
        self.typed(ctx, name, Signature::new(vec![], Some(R::KIND)))
    }

    /// Get a value-returning export taking one argument.
    pub fn get_function1<A: WasmNum, R: WasmNum>(
        &self,
        ctx: &RuntimeContext,
        name: &str,
    ) -> Result<Function1<A, R>, RuntimeError> {
        self.typed(ctx, name, Signature::new(vec![A::KIND], Some(R::KIND)))
    }

    /// Get a value-returning export taking two arguments.
    pub fn get_function2<A: WasmNum, B: WasmNum, R: WasmNum>(
        &self,
        ctx: &RuntimeContext,
        name: &str,
    ) -> Result<Function2<A, B, R>, RuntimeError> {
        self.typed(
            ctx,
            name,
            Signature::new(vec![A::KIND, B::KIND], Some(R::KIND)),
        )
    }

    /// Get a value-returning export taking three arguments.
    pub fn get_function3<A: WasmNum, B: WasmNum, C: WasmNum, R: WasmNum>(
        &self,
        ctx: &RuntimeContext,
        name: &str,
    ) -> Result<Function3<A, B, C, R>, RuntimeError> {
        self.typed(
            ctx,
            name,
            Signature::new(vec![A::KIND, B::KIND, C::KIND], Some(R::KIND)),
        )
    }

    /// Get a memory export by name.
    pub fn get_memory(&self, name: &str) -> Result<MemoryView, RuntimeError> {
        match self.state()?.externs.get(name) {
            Some(Extern::Memory(memory)) => Ok(MemoryView::new(name, *memory, self.context_id)),
            _ => Err(RuntimeError::memory_not_found(name)),
        }
    }

    /// Get the memory exported as `"memory"`.
    pub fn get_default_memory(&self) -> Result<MemoryView, RuntimeError> {
        self.get_memory(DEFAULT_MEMORY_EXPORT)
    }

    /// Get a memory export for exchanging strings and byte buffers.
    ///
    /// Same view as [`ModuleHandle::get_memory`]; the string and byte
    /// helpers live on [`MemoryView`].
    pub fn get_shared_memory(&self, name: &str) -> Result<MemoryView, RuntimeError> {
        self.get_memory(name)
    }

    /// Get the memory exported as `"memory"` for string and byte exchange.
    pub fn get_default_shared_memory(&self) -> Result<MemoryView, RuntimeError> {
        self.get_shared_memory(DEFAULT_MEMORY_EXPORT)
    }

    /// Call an export with dynamically typed arguments.
    ///
    /// The arguments must match the export's numeric signature exactly.
    /// Returns the result value, or `None` for void exports.
    #[instrument(skip(self, ctx, args), fields(module = %self.name))]
    pub fn call_dynamic(
        &self,
        ctx: &mut impl CallContext,
        name: &str,
        args: &[Value],
    ) -> Result<Option<Value>, RuntimeError> {
        let state = self.state()?;
        let func = match state.externs.get(name) {
            Some(Extern::Func(func)) => *func,
            Some(_) => {
                return Err(RuntimeError::ExportTypeMismatch {
                    name: name.to_string(),
                    expected: "func".to_string(),
                    actual: state
                        .module
                        .export(name)
                        .map_or_else(|| "unknown".to_string(), |info| info.kind.to_string()),
                });
            }
            None => return Err(RuntimeError::export_not_found(name)),
        };

        let mut store = ctx.store_for(self.context_id)?;
        let ty = func.ty(&store);
        let signature = Signature::from_func_type(&ty).ok_or_else(|| {
            RuntimeError::ExportTypeMismatch {
                name: name.to_string(),
                expected: "numeric signature".to_string(),
                actual: describe_func_type(&ty),
            }
        })?;

        let arg_kinds: Vec<ValueKind> = args.iter().map(Value::kind).collect();
        if arg_kinds != signature.params() {
            return Err(RuntimeError::ExportTypeMismatch {
                name: name.to_string(),
                expected: Signature::new(arg_kinds, signature.result()).to_string(),
                actual: signature.to_string(),
            });
        }

        let params: Vec<wasmtime::Val> = args.iter().map(|v| v.to_val()).collect();
        let mut results: Vec<wasmtime::Val> =
            signature.result().map(ValueKind::zero).into_iter().collect();

        func.call(&mut store, &params, &mut results)
            .map_err(classify_call_error)?;

        Ok(results.first().and_then(Value::from_val))
    }
}

impl std::fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("name", &self.name)
            .field("context_id", &self.context_id)
            .field("disposed", &self.is_disposed())
            .finish_non_exhaustive()
    }
}

/// A guest export with a statically checked signature.
///
/// Obtained from one of the `get_action*` / `get_function*` lookups on a
/// [`ModuleHandle`]. Calls take the owning [`RuntimeContext`], or the
/// [`crate::HostCaller`] of a callback running on its store.
pub struct TypedExport<P, R> {
    name: String,
    context_id: Uuid,
    func: TypedFunc<P, R>,
}

impl<P, R> TypedExport<P, R>
where
    P: WasmParams,
    R: WasmResults,
{
    /// Export name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn invoke(&self, ctx: &mut impl CallContext, params: P) -> Result<R, RuntimeError> {
        let store = ctx.store_for(self.context_id)?;
        self.func.call(store, params).map_err(classify_call_error)
    }
}

impl<R: WasmResults> TypedExport<(), R> {
    /// Call the export.
    pub fn call(&self, ctx: &mut impl CallContext) -> Result<R, RuntimeError> {
        self.invoke(ctx, ())
    }
}

impl<A: WasmNum, R: WasmResults> TypedExport<(A,), R> {
    /// Call the export.
    pub fn call(&self, ctx: &mut impl CallContext, a: A) -> Result<R, RuntimeError> {
        self.invoke(ctx, (a,))
    }
}

impl<A: WasmNum, B: WasmNum, R: WasmResults> TypedExport<(A, B), R> {
    /// Call the export.
    pub fn call(&self, ctx: &mut impl CallContext, a: A, b: B) -> Result<R, RuntimeError> {
        self.invoke(ctx, (a, b))
    }
}

impl<A: WasmNum, B: WasmNum, C: WasmNum, R: WasmResults> TypedExport<(A, B, C), R> {
    /// Call the export.
    pub fn call(&self, ctx: &mut impl CallContext, a: A, b: B, c: C) -> Result<R, RuntimeError> {
        self.invoke(ctx, (a, b, c))
    }
}

impl<P, R> Clone for TypedExport<P, R> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            context_id: self.context_id,
            func: self.func.clone(),
        }
    }
}

impl<P, R> std::fmt::Debug for TypedExport<P, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypedExport")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Map an error from a guest call onto the runtime taxonomy.
///
/// Host callback failures are returned unchanged; everything else is a
/// guest trap, tagged with the trap code when the engine reports one.
pub(crate) fn classify_call_error(error: wasmtime::Error) -> RuntimeError {
    match error.downcast::<HostFunctionError>() {
        Ok(host) => RuntimeError::HostFunction(host),
        Err(error) => {
            let code = error.downcast_ref::<Trap>().map(|trap| format!("{trap:?}"));
            RuntimeError::trap(format!("{error:#}"), code)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_host_error() {
        let error = wasmtime::Error::new(HostFunctionError::failed("boom"));
        let classified = classify_call_error(error);

        assert!(matches!(
            classified,
            RuntimeError::HostFunction(HostFunctionError::Failed { .. })
        ));
    }

    #[test]
    fn test_classify_trap() {
        let error = wasmtime::Error::new(Trap::IntegerDivisionByZero);
        let classified = classify_call_error(error);

        assert!(classified.is_trap());
        assert_eq!(classified.trap_code(), Some("IntegerDivisionByZero"));
    }

    #[test]
    fn test_classify_other_error() {
        let classified = classify_call_error(wasmtime::Error::msg("something else"));

        assert!(classified.is_trap());
        assert_eq!(classified.trap_code(), None);
    }
}
