//! Typed registration of host callbacks as guest-visible imports.
//!
//! Host callbacks come in a closed set of shapes:
//! - arity 0 to 3, every parameter one of `i32`, `i64`, `f32`, `f64`
//! - no result, a numeric result, or a `Result` of either
//! - with a [`MemoryAccess`] or a [`HostCaller`] first argument, or neither
//!
//! The shape is picked once, when the callback is bound, through the
//! [`HostFunction`], [`HostFunctionWithMemory`] and [`HostFunctionWithCaller`]
//! impls generated below.
//! A callback with any other parameter or result type does not satisfy
//! either trait and is rejected by the compiler.

use std::collections::HashMap;
use std::fmt;

use wasmtime::{Caller, Extern, Linker};

use interop_runtime_common::{HostFunctionError, RuntimeError};

use crate::caller::HostCaller;
use crate::memory::MemoryAccess;
use crate::store::HostState;
use crate::value::{Signature, ValueKind, WasmNum};

mod sealed {
    pub trait Sealed {}
}

/// Values a host callback may return.
///
/// Implemented for `()`, the four numeric types, and
/// `Result<_, HostFunctionError>` of each. Returning `Err` aborts the guest
/// call; the error reaches the host call site as
/// [`RuntimeError::HostFunction`].
pub trait HostReturn: sealed::Sealed + Send + 'static {
    /// The value handed back to the guest.
    type Value: wasmtime::WasmRet;

    /// The result kind, or `None` for void callbacks.
    const KIND: Option<ValueKind>;

    /// Convert into the engine-level return value.
    fn into_abi(self) -> wasmtime::Result<Self::Value>;
}

impl sealed::Sealed for () {}

impl HostReturn for () {
    type Value = ();
    const KIND: Option<ValueKind> = None;

    fn into_abi(self) -> wasmtime::Result<()> {
        Ok(())
    }
}

impl sealed::Sealed for Result<(), HostFunctionError> {}

impl HostReturn for Result<(), HostFunctionError> {
    type Value = ();
    const KIND: Option<ValueKind> = None;

    fn into_abi(self) -> wasmtime::Result<()> {
        Ok(self?)
    }
}

macro_rules! impl_host_return {
    ($($ty:ty),*) => {
        $(
            impl sealed::Sealed for $ty {}

            impl HostReturn for $ty {
                type Value = $ty;
                const KIND: Option<ValueKind> = Some(<$ty as WasmNum>::KIND);

                fn into_abi(self) -> wasmtime::Result<$ty> {
                    Ok(self)
                }
            }

            impl sealed::Sealed for Result<$ty, HostFunctionError> {}

            impl HostReturn for Result<$ty, HostFunctionError> {
                type Value = $ty;
                const KIND: Option<ValueKind> = Some(<$ty as WasmNum>::KIND);

                fn into_abi(self) -> wasmtime::Result<$ty> {
                    Ok(self?)
                }
            }
        )*
    };
}

impl_host_return!(i32, i64, f32, f64);

/// A host callback taking only numeric arguments.
///
/// `Params` is the tuple of argument types and `R` the return type; both
/// are inferred from the closure.
pub trait HostFunction<Params, R>: Send + Sync + 'static {
    /// The numeric signature the guest must import this callback with.
    fn signature() -> Signature;

    /// Define this callback on `linker` under `namespace.name`.
    #[doc(hidden)]
    fn register(
        self,
        linker: &mut Linker<HostState>,
        namespace: &str,
        name: &str,
    ) -> wasmtime::Result<()>;
}

/// A host callback taking a [`MemoryAccess`] over the calling instance's
/// memory followed by numeric arguments.
pub trait HostFunctionWithMemory<Params, R>: Send + Sync + 'static {
    /// The numeric signature the guest must import this callback with.
    fn signature() -> Signature;

    /// Define this callback on `linker` under `namespace.name`.
    #[doc(hidden)]
    fn register(
        self,
        linker: &mut Linker<HostState>,
        namespace: &str,
        name: &str,
    ) -> wasmtime::Result<()>;
}

/// A host callback taking a [`HostCaller`] followed by numeric arguments.
///
/// The caller gives access to the calling instance's memory and lets the
/// callback call exports on the same store.
pub trait HostFunctionWithCaller<Params, R>: Send + Sync + 'static {
    /// The numeric signature the guest must import this callback with.
    fn signature() -> Signature;

    /// Define this callback on `linker` under `namespace.name`.
    #[doc(hidden)]
    fn register(
        self,
        linker: &mut Linker<HostState>,
        namespace: &str,
        name: &str,
    ) -> wasmtime::Result<()>;
}

macro_rules! impl_host_function {
    ($($arg:ident $val:ident),*) => {
        impl<F, $($arg,)* R> HostFunction<($($arg,)*), R> for F
        where
            F: Fn($($arg),*) -> R + Send + Sync + 'static,
            $($arg: WasmNum,)*
            R: HostReturn,
        {
            fn signature() -> Signature {
                Signature::new(vec![$(<$arg as WasmNum>::KIND),*], R::KIND)
            }

            fn register(
                self,
                linker: &mut Linker<HostState>,
                namespace: &str,
                name: &str,
            ) -> wasmtime::Result<()> {
                let callback = self;
                linker.func_wrap(
                    namespace,
                    name,
                    move |mut caller: Caller<'_, HostState>, $($val: $arg),*| -> wasmtime::Result<R::Value> {
                        caller.data_mut().record_host_call();
                        callback($($val),*).into_abi()
                    },
                )?;
                Ok(())
            }
        }

        impl<F, $($arg,)* R> HostFunctionWithMemory<($($arg,)*), R> for F
        where
            F: Fn(&mut MemoryAccess<'_>, $($arg),*) -> R + Send + Sync + 'static,
            $($arg: WasmNum,)*
            R: HostReturn,
        {
            fn signature() -> Signature {
                Signature::new(vec![$(<$arg as WasmNum>::KIND),*], R::KIND)
            }

            fn register(
                self,
                linker: &mut Linker<HostState>,
                namespace: &str,
                name: &str,
            ) -> wasmtime::Result<()> {
                let callback = self;
                linker.func_wrap(
                    namespace,
                    name,
                    move |mut caller: Caller<'_, HostState>, $($val: $arg),*| -> wasmtime::Result<R::Value> {
                        caller.data_mut().record_host_call();
                        let export = caller.data().memory_export().to_string();
                        let memory = caller
                            .get_export(&export)
                            .and_then(Extern::into_memory)
                            .ok_or(HostFunctionError::MemoryUnavailable { export })?;
                        let mut access = MemoryAccess::new(memory.data_mut(&mut caller));
                        callback(&mut access, $($val),*).into_abi()
                    },
                )?;
                Ok(())
            }
        }

        impl<F, $($arg,)* R> HostFunctionWithCaller<($($arg,)*), R> for F
        where
            F: Fn(&mut HostCaller<'_>, $($arg),*) -> R + Send + Sync + 'static,
            $($arg: WasmNum,)*
            R: HostReturn,
        {
            fn signature() -> Signature {
                Signature::new(vec![$(<$arg as WasmNum>::KIND),*], R::KIND)
            }

            fn register(
                self,
                linker: &mut Linker<HostState>,
                namespace: &str,
                name: &str,
            ) -> wasmtime::Result<()> {
                let callback = self;
                linker.func_wrap(
                    namespace,
                    name,
                    move |mut caller: Caller<'_, HostState>, $($val: $arg),*| -> wasmtime::Result<R::Value> {
                        caller.data_mut().record_host_call();
                        let mut host = HostCaller::new(caller);
                        callback(&mut host, $($val),*).into_abi()
                    },
                )?;
                Ok(())
            }
        }
    };
}

impl_host_function!();
impl_host_function!(A a);
impl_host_function!(A a, B b);
impl_host_function!(A a, B b, C c);

/// Metadata of one registered import.
///
/// The callback itself lives in the context's linker; the binding records
/// what the guest has to declare to link against it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportBinding {
    /// Import module namespace, e.g. `env`.
    pub namespace: String,
    /// Import field name.
    pub name: String,
    /// Numeric signature of the callback.
    pub signature: Signature,
    /// Whether the callback receives a [`MemoryAccess`].
    pub memory_access: bool,
    /// Whether the callback receives a [`HostCaller`].
    pub caller_access: bool,
}

impl fmt::Display for ImportBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{} {}", self.namespace, self.name, self.signature)?;
        if self.memory_access {
            write!(f, " [memory]")?;
        }
        if self.caller_access {
            write!(f, " [caller]")?;
        }
        Ok(())
    }
}

/// Registered imports of one runtime context, in registration order.
#[derive(Debug, Default)]
pub(crate) struct BindingTable {
    bindings: Vec<ImportBinding>,
    index: HashMap<(String, String), usize>,
}

impl BindingTable {
    /// Check whether `namespace.name` may be (re)bound.
    pub(crate) fn check_available(
        &self,
        namespace: &str,
        name: &str,
        allow_shadowing: bool,
    ) -> Result<(), RuntimeError> {
        if !allow_shadowing && self.get(namespace, name).is_some() {
            return Err(RuntimeError::invalid_config(format!(
                "Import '{namespace}.{name}' is already defined"
            )));
        }
        Ok(())
    }

    /// Record a binding, replacing any previous one with the same key.
    pub(crate) fn insert(&mut self, binding: ImportBinding) {
        let key = (binding.namespace.clone(), binding.name.clone());
        match self.index.get(&key) {
            Some(&i) => self.bindings[i] = binding,
            None => {
                self.index.insert(key, self.bindings.len());
                self.bindings.push(binding);
            }
        }
    }

    pub(crate) fn get(&self, namespace: &str, name: &str) -> Option<&ImportBinding> {
        self.index
            .get(&(namespace.to_string(), name.to_string()))
            .map(|&i| &self.bindings[i])
    }

    pub(crate) fn as_slice(&self) -> &[ImportBinding] {
        &self.bindings
    }
}
