//! Logging host function implementation.
//!
//! Guests call `env.log(level, ptr, len)` with a UTF-8 message in their own
//! linear memory. Each message is captured in a [`LogSink`] and also emitted
//! through `tracing`.

use std::sync::Arc;
use std::time::Instant;

use parking_lot::Mutex;
use tracing::{debug, error, info, warn};

use interop_runtime_common::{HostFunctionError, RuntimeError};
use interop_runtime_core::{MemoryAccess, RuntimeContext};

use crate::guest_range;

/// Log level for guest log messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    /// Debug level.
    Debug,
    /// Info level.
    Info,
    /// Warning level.
    Warn,
    /// Error level.
    Error,
}

/// A captured log entry from guest code.
#[derive(Debug, Clone)]
pub struct LogEntry {
    /// Log level.
    pub level: LogLevel,
    /// Log message.
    pub message: String,
    /// When the message was received.
    pub timestamp: Instant,
}

/// Shared, thread-safe buffer of guest log entries.
///
/// Cloning yields another handle to the same buffer, so the callback
/// registered on a context and the host code reading the logs can each
/// hold one.
#[derive(Debug, Clone, Default)]
pub struct LogSink {
    entries: Arc<Mutex<Vec<LogEntry>>>,
}

impl LogSink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a message and emit it via `tracing`.
    pub fn log(&self, module: &str, level: LogLevel, message: &str) {
        match level {
            LogLevel::Debug => debug!(module, guest_log = true, "{}", message),
            LogLevel::Info => info!(module, guest_log = true, "{}", message),
            LogLevel::Warn => warn!(module, guest_log = true, "{}", message),
            LogLevel::Error => error!(module, guest_log = true, "{}", message),
        }

        self.entries.lock().push(LogEntry {
            level,
            message: message.to_string(),
            timestamp: Instant::now(),
        });
    }

    /// Snapshot of all entries captured so far.
    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().clone()
    }

    /// Remove and return all captured entries.
    pub fn drain(&self) -> Vec<LogEntry> {
        std::mem::take(&mut *self.entries.lock())
    }

    /// Number of captured entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns `true` if nothing has been logged.
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

/// Convert a numeric log level to [`LogLevel`].
///
/// Guests pass 0=debug, 1=info, 2=warn, 3=error. Unknown values map to
/// [`LogLevel::Info`].
pub fn level_from_i32(level: i32) -> LogLevel {
    match level {
        0 => LogLevel::Debug,
        2 => LogLevel::Warn,
        3 => LogLevel::Error,
        _ => LogLevel::Info,
    }
}

/// Convert a [`LogLevel`] to a numeric value.
pub fn level_to_i32(level: LogLevel) -> i32 {
    match level {
        LogLevel::Debug => 0,
        LogLevel::Info => 1,
        LogLevel::Warn => 2,
        LogLevel::Error => 3,
    }
}

/// Read a log message out of guest memory.
///
/// Invalid UTF-8 is replaced rather than rejected so a malformed message
/// still shows up in the log.
fn read_message(mem: &MemoryAccess<'_>, ptr: i32, len: i32) -> Result<String, HostFunctionError> {
    let (offset, len) = guest_range(ptr, len)?;
    let bytes = mem.read_bytes(offset, len)?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Register `env.log(level: i32, ptr: i32, len: i32)` on `ctx`.
///
/// # Memory Protocol
///
/// The guest passes:
/// - `level`: Log level (0=debug, 1=info, 2=warn, 3=error)
/// - `ptr`: Offset of the message in the guest's exported memory
/// - `len`: Length of the message in bytes
///
/// A negative or out-of-range `(ptr, len)` pair fails the guest call.
pub fn register_logging(ctx: &mut RuntimeContext, sink: &LogSink) -> Result<(), RuntimeError> {
    let sink = sink.clone();
    ctx.define_function_with_memory_access(
        "env",
        "log",
        move |mem: &mut MemoryAccess<'_>,
              level: i32,
              ptr: i32,
              len: i32|
              -> Result<(), HostFunctionError> {
            let message = read_message(mem, ptr, len)?;
            sink.log("guest", level_from_i32(level), &message);
            Ok(())
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use interop_runtime_core::{ModuleHandle, Value};

    const LOGGER: &str = r#"
        (module
            (import "env" "log" (func $log (param i32 i32 i32)))
            (memory (export "memory") 1)
            (data (i32.const 0) "hello")
            (data (i32.const 8) "\ff\fe")
            (func (export "log") (param i32 i32 i32)
                (call $log (local.get 0) (local.get 1) (local.get 2))))
    "#;

    #[test]
    fn test_sink_stores_entries() {
        let sink = LogSink::new();

        sink.log("test", LogLevel::Info, "Hello");
        sink.log("test", LogLevel::Error, "World");

        let entries = sink.entries();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].message, "Hello");
        assert_eq!(entries[0].level, LogLevel::Info);
        assert_eq!(entries[1].message, "World");
        assert_eq!(entries[1].level, LogLevel::Error);
    }

    #[test]
    fn test_sink_clones_share_buffer() {
        let sink = LogSink::new();
        let other = sink.clone();

        other.log("test", LogLevel::Debug, "shared");
        assert_eq!(sink.len(), 1);

        let drained = sink.drain();
        assert_eq!(drained.len(), 1);
        assert!(other.is_empty());
    }

    #[test]
    fn test_level_from_i32() {
        assert_eq!(level_from_i32(0), LogLevel::Debug);
        assert_eq!(level_from_i32(1), LogLevel::Info);
        assert_eq!(level_from_i32(2), LogLevel::Warn);
        assert_eq!(level_from_i32(3), LogLevel::Error);
        assert_eq!(level_from_i32(99), LogLevel::Info);
    }

    #[test]
    fn test_level_to_i32() {
        assert_eq!(level_to_i32(LogLevel::Debug), 0);
        assert_eq!(level_to_i32(LogLevel::Info), 1);
        assert_eq!(level_to_i32(LogLevel::Warn), 2);
        assert_eq!(level_to_i32(LogLevel::Error), 3);
    }

    fn call_log(
        ctx: &mut RuntimeContext,
        module: &ModuleHandle,
        level: i32,
        ptr: i32,
        len: i32,
    ) -> Result<Option<Value>, RuntimeError> {
        module.call_dynamic(
            ctx,
            "log",
            &[Value::I32(level), Value::I32(ptr), Value::I32(len)],
        )
    }

    fn setup() -> (RuntimeContext, ModuleHandle, LogSink) {
        let mut ctx = RuntimeContext::new().unwrap();
        let sink = LogSink::new();
        register_logging(&mut ctx, &sink).unwrap();
        let module = ctx.load_from_text("logger", LOGGER).unwrap();
        (ctx, module, sink)
    }

    #[test]
    fn test_guest_log_is_captured() {
        let (mut ctx, module, sink) = setup();

        call_log(&mut ctx, &module, 2, 0, 5).unwrap();

        let entries = sink.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].level, LogLevel::Warn);
        assert_eq!(entries[0].message, "hello");
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let (mut ctx, module, sink) = setup();

        call_log(&mut ctx, &module, 1, 8, 2).unwrap();

        assert_eq!(sink.entries()[0].message, "\u{fffd}\u{fffd}");
    }

    #[test]
    fn test_out_of_bounds_message_fails_call() {
        let (mut ctx, module, sink) = setup();

        let err = call_log(&mut ctx, &module, 1, 65_530, 100).unwrap_err();

        assert!(matches!(err, RuntimeError::HostFunction(_)));
        assert!(sink.is_empty());
    }

    #[test]
    fn test_negative_length_fails_call() {
        let (mut ctx, module, _sink) = setup();

        let err = call_log(&mut ctx, &module, 1, 0, -1).unwrap_err();

        assert!(matches!(
            err,
            RuntimeError::HostFunction(HostFunctionError::InvalidArgument { .. })
        ));
    }
}
