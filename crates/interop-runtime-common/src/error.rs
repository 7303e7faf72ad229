//! Error types for the interop-runtime.
//!
//! This module defines a hierarchy of error types using `thiserror`:
//! - [`RuntimeError`]: Top-level errors for loading modules and calling exports
//! - [`HostFunctionError`]: Errors raised by host callbacks
//! - [`MemoryError`]: Linear memory marshaling faults

use std::io;

use thiserror::Error;

/// Top-level runtime errors.
///
/// These errors represent failures that can occur anywhere between
/// compiling a guest module and calling into its exports.
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// The guest source could not be parsed, validated, or compiled.
    #[error("Compilation of '{module}' failed: {reason}")]
    CompilationFailed {
        /// Name of the module being compiled.
        module: String,
        /// Description of the compilation failure.
        reason: String,
    },

    /// A declared import has no matching host binding.
    #[error("Linking '{module}' failed: {reason}")]
    LinkFailed {
        /// Name of the module being linked.
        module: String,
        /// Description of the unresolved or incompatible imports.
        reason: String,
    },

    /// The guest start-up code trapped during instantiation.
    #[error("Instantiation of '{module}' failed: {reason}")]
    InstantiationFailed {
        /// Name of the module being instantiated.
        module: String,
        /// Description of the instantiation failure.
        reason: String,
    },

    /// No export with the requested name exists.
    #[error("Export not found: {name}")]
    ExportNotFound {
        /// The requested export name.
        name: String,
    },

    /// An export exists but its kind or signature differs from the request.
    #[error("Export '{name}' has type {actual}, expected {expected}")]
    ExportTypeMismatch {
        /// The requested export name.
        name: String,
        /// The signature the caller asked for.
        expected: String,
        /// The type the module actually exports.
        actual: String,
    },

    /// No memory export with the requested name exists.
    #[error("Memory export not found: {name}")]
    MemoryNotFound {
        /// The requested memory export name.
        name: String,
    },

    /// A guest source file could not be read.
    #[error("IO error reading '{path}': {source}")]
    Io {
        /// The file that failed to load.
        path: String,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// A WebAssembly trap occurred during an export call.
    #[error("Wasm trap: {message}")]
    Trap {
        /// Description of the trap.
        message: String,
        /// Trap code if available.
        code: Option<String>,
    },

    /// A host callback failed while the guest was calling it.
    #[error("Host function error: {0}")]
    HostFunction(#[from] HostFunctionError),

    /// A linear memory access failed.
    #[error("Memory error: {0}")]
    Memory(#[from] MemoryError),

    /// Invalid configuration was provided.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// Description of the configuration error.
        reason: String,
    },

    /// The runtime context (or module handle) has already been disposed.
    #[error("Runtime context has been disposed")]
    Disposed,

    /// A handle was used with a runtime context other than the one that created it.
    #[error("Handle belongs to a different runtime context")]
    ContextMismatch,
}

/// Errors from host callback implementations.
///
/// Returning one of these from a callback aborts the guest call that
/// invoked it; the error surfaces unchanged at the host call site as
/// [`RuntimeError::HostFunction`].
#[derive(Error, Debug)]
pub enum HostFunctionError {
    /// Invalid argument was passed to a host function.
    #[error("Invalid argument: {reason}")]
    InvalidArgument {
        /// Description of why the argument was invalid.
        reason: String,
    },

    /// The calling instance does not export the memory the callback needs.
    #[error("Calling instance exports no memory named '{export}'")]
    MemoryUnavailable {
        /// The memory export name that was looked up.
        export: String,
    },

    /// Reading or writing guest memory failed.
    #[error(transparent)]
    Memory(#[from] MemoryError),

    /// A guest export called back from inside the callback failed.
    #[error("Nested guest call failed: {0}")]
    GuestCall(#[source] Box<RuntimeError>),

    /// The callback failed for an application-specific reason.
    #[error("{message}")]
    Failed {
        /// Description of the failure.
        message: String,
    },
}

/// Lets a callback forward a failed nested export call with `?`.
///
/// A host error raised further down the call chain is passed through
/// unchanged; anything else is wrapped in [`HostFunctionError::GuestCall`].
impl From<RuntimeError> for HostFunctionError {
    fn from(error: RuntimeError) -> Self {
        match error {
            RuntimeError::HostFunction(inner) => inner,
            other => Self::GuestCall(Box::new(other)),
        }
    }
}

/// Linear memory marshaling errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MemoryError {
    /// The accessed range extends past the current memory size.
    #[error("Access of {len} bytes at offset {offset} exceeds memory size {size}")]
    OutOfBounds {
        /// Start offset of the access.
        offset: usize,
        /// Number of bytes accessed.
        len: usize,
        /// Memory size in bytes at the time of the access.
        size: usize,
    },

    /// The bytes at the given range are not valid UTF-8.
    #[error("Invalid UTF-8 at offset {offset}: {reason}")]
    InvalidUtf8 {
        /// Start offset of the string.
        offset: usize,
        /// Decoder error description.
        reason: String,
    },

    /// No zero byte was found between the offset and the end of memory.
    #[error("No string terminator between offset {offset} and end of memory ({size} bytes)")]
    Unterminated {
        /// Start offset of the scan.
        offset: usize,
        /// Memory size in bytes at the time of the scan.
        size: usize,
    },

    /// The memory could not grow by the requested number of pages.
    #[error("Failed to grow memory by {pages} pages: {reason}")]
    GrowFailed {
        /// Requested page delta.
        pages: u64,
        /// Engine-reported reason.
        reason: String,
    },
}

impl RuntimeError {
    /// Create a new `CompilationFailed` error.
    pub fn compilation_failed(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CompilationFailed {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `LinkFailed` error.
    pub fn link_failed(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LinkFailed {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `InstantiationFailed` error.
    pub fn instantiation_failed(module: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InstantiationFailed {
            module: module.into(),
            reason: reason.into(),
        }
    }

    /// Create a new `ExportNotFound` error.
    pub fn export_not_found(name: impl Into<String>) -> Self {
        Self::ExportNotFound { name: name.into() }
    }

    /// Create a new `MemoryNotFound` error.
    pub fn memory_not_found(name: impl Into<String>) -> Self {
        Self::MemoryNotFound { name: name.into() }
    }

    /// Create a new `Trap` error.
    pub fn trap(message: impl Into<String>, code: Option<String>) -> Self {
        Self::Trap {
            message: message.into(),
            code,
        }
    }

    /// Create a new `InvalidConfig` error.
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns `true` if a requested export or memory does not exist.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ExportNotFound { .. } | Self::MemoryNotFound { .. }
        )
    }

    /// Returns `true` for any failed typed export lookup, whether the export
    /// is absent or present with a different signature.
    pub fn is_export_lookup_failure(&self) -> bool {
        matches!(
            self,
            Self::ExportNotFound { .. } | Self::ExportTypeMismatch { .. }
        )
    }

    /// Returns `true` if the guest trapped.
    pub fn is_trap(&self) -> bool {
        matches!(self, Self::Trap { .. })
    }

    /// Returns the trap code if this is a guest trap with a known code.
    pub fn trap_code(&self) -> Option<&str> {
        match self {
            Self::Trap { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl HostFunctionError {
    /// Create a new `InvalidArgument` error.
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument {
            reason: reason.into(),
        }
    }

    /// Create a new `Failed` error.
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RuntimeError::export_not_found("add");
        assert_eq!(err.to_string(), "Export not found: add");

        let err = RuntimeError::Disposed;
        assert_eq!(err.to_string(), "Runtime context has been disposed");

        let err = RuntimeError::link_failed("calc", "missing import env.log");
        assert_eq!(
            err.to_string(),
            "Linking 'calc' failed: missing import env.log"
        );
    }

    #[test]
    fn test_error_from_host_function() {
        let host_err = HostFunctionError::invalid_argument("negative length");
        let runtime_err: RuntimeError = host_err.into();

        assert!(matches!(runtime_err, RuntimeError::HostFunction(_)));
        assert_eq!(
            runtime_err.to_string(),
            "Host function error: Invalid argument: negative length"
        );
    }

    #[test]
    fn test_host_error_from_nested_call() {
        let passthrough: HostFunctionError =
            RuntimeError::HostFunction(HostFunctionError::failed("inner")).into();
        assert!(matches!(passthrough, HostFunctionError::Failed { ref message } if message == "inner"));

        let wrapped: HostFunctionError =
            RuntimeError::trap("unreachable", Some("UnreachableCodeReached".into())).into();
        match wrapped {
            HostFunctionError::GuestCall(inner) => {
                assert_eq!(inner.trap_code(), Some("UnreachableCodeReached"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_error_from_memory() {
        let mem_err = MemoryError::OutOfBounds {
            offset: 65_530,
            len: 10,
            size: 65_536,
        };
        let runtime_err: RuntimeError = mem_err.clone().into();
        assert!(matches!(runtime_err, RuntimeError::Memory(ref e) if *e == mem_err));

        let host_err: HostFunctionError = mem_err.into();
        assert!(host_err.to_string().contains("exceeds memory size 65536"));
    }

    #[test]
    fn test_is_not_found() {
        assert!(RuntimeError::export_not_found("f").is_not_found());
        assert!(RuntimeError::memory_not_found("memory").is_not_found());
        assert!(!RuntimeError::Disposed.is_not_found());
    }

    #[test]
    fn test_is_export_lookup_failure() {
        let mismatch = RuntimeError::ExportTypeMismatch {
            name: "add".into(),
            expected: "(i32) -> i32".into(),
            actual: "(i32, i32) -> i32".into(),
        };
        assert!(mismatch.is_export_lookup_failure());
        assert!(!mismatch.is_not_found());
        assert!(RuntimeError::export_not_found("add").is_export_lookup_failure());
        assert!(!RuntimeError::memory_not_found("memory").is_export_lookup_failure());
    }

    #[test]
    fn test_trap_code() {
        let err = RuntimeError::trap("integer divide by zero", Some("IntegerDivisionByZero".into()));
        assert!(err.is_trap());
        assert_eq!(err.trap_code(), Some("IntegerDivisionByZero"));
        assert_eq!(RuntimeError::Disposed.trap_code(), None);
    }
}
