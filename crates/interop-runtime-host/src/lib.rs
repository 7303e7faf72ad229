//! Standard host callback bundles for interop-runtime.
//!
//! Each bundle registers a group of imports on a
//! [`RuntimeContext`](interop_runtime_core::RuntimeContext). Guests exchange
//! strings with these callbacks as `(ptr, len)` pairs into their exported
//! linear memory.
//!
//! # Bundles
//!
//! - [`logging`]: `env.log`, captured in a [`LogSink`] and emitted via `tracing`
//! - [`text`]: in-place ASCII transforms under the `text` namespace

pub mod logging;
pub mod text;

use interop_runtime_common::{HostFunctionError, RuntimeError};
use interop_runtime_core::RuntimeContext;

pub use logging::{LogEntry, LogLevel, LogSink, level_from_i32, level_to_i32, register_logging};
pub use text::register_text;

/// Register every standard bundle on `ctx`.
///
/// # Errors
///
/// Returns an error if any import is already defined on `ctx`.
pub fn register_all(ctx: &mut RuntimeContext, sink: &LogSink) -> Result<(), RuntimeError> {
    register_logging(ctx, sink)?;
    register_text(ctx)?;
    Ok(())
}

/// Convert a guest `(ptr, len)` pair to a byte range.
pub(crate) fn guest_range(ptr: i32, len: i32) -> Result<(usize, usize), HostFunctionError> {
    let offset = usize::try_from(ptr)
        .map_err(|_| HostFunctionError::invalid_argument(format!("negative pointer {ptr}")))?;
    let len = usize::try_from(len)
        .map_err(|_| HostFunctionError::invalid_argument(format!("negative length {len}")))?;
    Ok((offset, len))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guest_range() {
        assert_eq!(guest_range(16, 19).unwrap(), (16, 19));
        assert!(matches!(
            guest_range(-1, 4),
            Err(HostFunctionError::InvalidArgument { .. })
        ));
        assert!(guest_range(0, -4).is_err());
    }

    #[test]
    fn test_register_all() {
        let mut ctx = RuntimeContext::new().unwrap();
        let sink = LogSink::new();
        register_all(&mut ctx, &sink).unwrap();

        let names: Vec<String> = ctx
            .imports()
            .unwrap()
            .iter()
            .map(|b| format!("{}.{}", b.namespace, b.name))
            .collect();
        assert_eq!(names, ["env.log", "text.to_upper", "text.to_lower", "text.rot13"]);
    }

    #[test]
    fn test_register_all_twice_fails() {
        let mut ctx = RuntimeContext::new().unwrap();
        let sink = LogSink::new();
        register_all(&mut ctx, &sink).unwrap();

        assert!(matches!(
            register_all(&mut ctx, &sink),
            Err(RuntimeError::InvalidConfig { .. })
        ));
    }
}
