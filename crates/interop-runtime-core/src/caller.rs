//! Store access for export calls, from the host or from inside a callback.
//!
//! Export calls and memory access need the store that owns the instance.
//! Outside of a guest call the [`RuntimeContext`] holds it; while a guest
//! is calling a host callback the store is only reachable through that
//! callback's [`HostCaller`]. Both implement [`CallContext`], so a
//! [`crate::TypedExport`] can be called from either place, including
//! host → guest → host → guest chains on the same store.

use uuid::Uuid;
use wasmtime::{AsContextMut, Caller, Extern, StoreContextMut};

use interop_runtime_common::{HostFunctionError, RuntimeError};

use crate::RuntimeContext;
use crate::memory::MemoryAccess;
use crate::store::HostState;

mod sealed {
    pub trait Sealed {}
}

/// Something an export can be called through.
///
/// Implemented for [`RuntimeContext`] and [`HostCaller`]. Either one
/// refuses handles created by a different context with
/// [`RuntimeError::ContextMismatch`].
pub trait CallContext: sealed::Sealed {
    /// Borrow the store on behalf of a handle created by context `owner`.
    #[doc(hidden)]
    fn store_for(&mut self, owner: Uuid) -> Result<StoreContextMut<'_, HostState>, RuntimeError>;
}

impl sealed::Sealed for RuntimeContext {}

impl CallContext for RuntimeContext {
    fn store_for(&mut self, owner: Uuid) -> Result<StoreContextMut<'_, HostState>, RuntimeError> {
        Ok(self.store_mut(owner)?.as_context_mut())
    }
}

/// The calling guest's store, handed to callbacks bound with
/// [`RuntimeContext::define_function_with_caller`].
///
/// Valid for one invocation. Through it a callback can read and write the
/// caller's memory and call exports of any module loaded in the same
/// context, which may in turn call back into the host.
pub struct HostCaller<'a> {
    caller: Caller<'a, HostState>,
}

impl<'a> HostCaller<'a> {
    pub(crate) fn new(caller: Caller<'a, HostState>) -> Self {
        Self { caller }
    }

    /// Identifier of the context whose store is executing.
    pub fn context_id(&self) -> Uuid {
        self.caller.data().context_id()
    }

    /// Host callback invocations served so far, this one included.
    pub fn host_calls(&self) -> u64 {
        self.caller.data().host_calls()
    }

    /// The calling instance's memory export.
    ///
    /// # Errors
    ///
    /// [`HostFunctionError::MemoryUnavailable`] if the caller exports no
    /// memory under the configured name.
    pub fn memory(&mut self) -> Result<MemoryAccess<'_>, HostFunctionError> {
        let export = self.caller.data().memory_export().to_string();
        let memory = self
            .caller
            .get_export(&export)
            .and_then(Extern::into_memory)
            .ok_or(HostFunctionError::MemoryUnavailable { export })?;
        Ok(MemoryAccess::new(memory.data_mut(&mut self.caller)))
    }
}

impl sealed::Sealed for HostCaller<'_> {}

impl CallContext for HostCaller<'_> {
    fn store_for(&mut self, owner: Uuid) -> Result<StoreContextMut<'_, HostState>, RuntimeError> {
        if owner != self.context_id() {
            return Err(RuntimeError::ContextMismatch);
        }
        Ok(self.caller.as_context_mut())
    }
}

impl std::fmt::Debug for HostCaller<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCaller")
            .field("context_id", &self.context_id())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_rejects_foreign_owner() {
        let mut ctx = RuntimeContext::new().unwrap();
        let id = ctx.id();

        assert!(ctx.store_for(id).is_ok());
        assert!(matches!(
            ctx.store_for(Uuid::new_v4()),
            Err(RuntimeError::ContextMismatch)
        ));
    }

    #[test]
    fn test_disposed_context_has_no_store() {
        let mut ctx = RuntimeContext::new().unwrap();
        let id = ctx.id();
        ctx.dispose();

        assert!(matches!(ctx.store_for(id), Err(RuntimeError::Disposed)));
    }
}
