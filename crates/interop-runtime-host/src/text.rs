//! In-place text transforms over guest memory.
//!
//! Registers the `text` namespace:
//! - `text.to_upper(ptr: i32, len: i32) -> i32`
//! - `text.to_lower(ptr: i32, len: i32) -> i32`
//! - `text.rot13(ptr: i32, len: i32) -> i32`
//!
//! Each rewrites the `len` bytes at `ptr` and returns the number of bytes
//! processed. Only ASCII letters change, so the byte length and any
//! multi-byte UTF-8 sequences are preserved.

use interop_runtime_common::{HostFunctionError, RuntimeError};
use interop_runtime_core::{MemoryAccess, RuntimeContext};

use crate::guest_range;

/// Rotate ASCII letters by 13 places.
pub fn rot13_byte(byte: u8) -> u8 {
    match byte {
        b'a'..=b'z' => b'a' + (byte - b'a' + 13) % 26,
        b'A'..=b'Z' => b'A' + (byte - b'A' + 13) % 26,
        _ => byte,
    }
}

/// Apply rot13 to every byte of `bytes`.
pub fn rot13_in_place(bytes: &mut [u8]) {
    for byte in bytes {
        *byte = rot13_byte(*byte);
    }
}

/// Run `op` over the guest range `(ptr, len)`.
fn transform(
    mem: &mut MemoryAccess<'_>,
    ptr: i32,
    len: i32,
    op: fn(&mut [u8]),
) -> Result<i32, HostFunctionError> {
    let (offset, count) = guest_range(ptr, len)?;
    op(mem.slice_mut(offset, count)?);
    Ok(len)
}

/// Register the `text` namespace on `ctx`.
pub fn register_text(ctx: &mut RuntimeContext) -> Result<(), RuntimeError> {
    ctx.define_function_with_memory_access(
        "text",
        "to_upper",
        |mem: &mut MemoryAccess<'_>, ptr: i32, len: i32| {
            transform(mem, ptr, len, <[u8]>::make_ascii_uppercase)
        },
    )?;
    ctx.define_function_with_memory_access(
        "text",
        "to_lower",
        |mem: &mut MemoryAccess<'_>, ptr: i32, len: i32| {
            transform(mem, ptr, len, <[u8]>::make_ascii_lowercase)
        },
    )?;
    ctx.define_function_with_memory_access(
        "text",
        "rot13",
        |mem: &mut MemoryAccess<'_>, ptr: i32, len: i32| transform(mem, ptr, len, rot13_in_place),
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEXT_GUEST: &str = r#"
        (module
            (import "text" "to_upper" (func $upper (param i32 i32) (result i32)))
            (import "text" "to_lower" (func $lower (param i32 i32) (result i32)))
            (import "text" "rot13" (func $rot13 (param i32 i32) (result i32)))
            (memory (export "memory") 1)
            (func (export "upper") (param i32 i32) (result i32)
                (call $upper (local.get 0) (local.get 1)))
            (func (export "lower") (param i32 i32) (result i32)
                (call $lower (local.get 0) (local.get 1)))
            (func (export "rot13") (param i32 i32) (result i32)
                (call $rot13 (local.get 0) (local.get 1))))
    "#;

    #[test]
    fn test_rot13_byte() {
        assert_eq!(rot13_byte(b'a'), b'n');
        assert_eq!(rot13_byte(b'N'), b'A');
        assert_eq!(rot13_byte(b'!'), b'!');

        let mut bytes = *b"Hello, World!";
        rot13_in_place(&mut bytes);
        assert_eq!(&bytes, b"Uryyb, Jbeyq!");
        rot13_in_place(&mut bytes);
        assert_eq!(&bytes, b"Hello, World!");
    }

    #[test]
    fn test_guest_transforms() {
        let mut ctx = RuntimeContext::new().unwrap();
        register_text(&mut ctx).unwrap();
        assert_eq!(ctx.imports().unwrap().len(), 3);

        let module = ctx.load_from_text("text_guest", TEXT_GUEST).unwrap();
        let memory = module.get_default_memory().unwrap();
        let upper = module.get_function2::<i32, i32, i32>(&ctx, "upper").unwrap();
        let lower = module.get_function2::<i32, i32, i32>(&ctx, "lower").unwrap();
        let rot13 = module.get_function2::<i32, i32, i32>(&ctx, "rot13").unwrap();

        let len = memory.write_string(&mut ctx, 64, "Hello, WebAssembly!").unwrap();
        let len_i32 = i32::try_from(len).unwrap();

        assert_eq!(upper.call(&mut ctx, 64, len_i32).unwrap(), len_i32);
        assert_eq!(
            memory.read_string(&ctx, 64, len).unwrap(),
            "HELLO, WEBASSEMBLY!"
        );

        lower.call(&mut ctx, 64, len_i32).unwrap();
        assert_eq!(
            memory.read_string(&ctx, 64, len).unwrap(),
            "hello, webassembly!"
        );

        rot13.call(&mut ctx, 64, len_i32).unwrap();
        rot13.call(&mut ctx, 64, len_i32).unwrap();
        assert_eq!(
            memory.read_string(&ctx, 64, len).unwrap(),
            "hello, webassembly!"
        );
    }

    #[test]
    fn test_multibyte_text_is_preserved() {
        let mut ctx = RuntimeContext::new().unwrap();
        register_text(&mut ctx).unwrap();

        let module = ctx.load_from_text("text_guest", TEXT_GUEST).unwrap();
        let memory = module.get_default_memory().unwrap();
        let upper = module.get_function2::<i32, i32, i32>(&ctx, "upper").unwrap();

        let len = memory.write_string(&mut ctx, 0, "café").unwrap();
        upper.call(&mut ctx, 0, i32::try_from(len).unwrap()).unwrap();

        assert_eq!(memory.read_string(&ctx, 0, len).unwrap(), "CAFé");
    }

    #[test]
    fn test_out_of_range_fails_call() {
        let mut ctx = RuntimeContext::new().unwrap();
        register_text(&mut ctx).unwrap();

        let module = ctx.load_from_text("text_guest", TEXT_GUEST).unwrap();
        let upper = module.get_function2::<i32, i32, i32>(&ctx, "upper").unwrap();

        let err = upper.call(&mut ctx, 65_536, 1).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::HostFunction(HostFunctionError::Memory(_))
        ));

        let err = upper.call(&mut ctx, -4, 1).unwrap_err();
        assert!(matches!(
            err,
            RuntimeError::HostFunction(HostFunctionError::InvalidArgument { .. })
        ));
    }
}
