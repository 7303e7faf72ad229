//! Linear memory marshaling helpers.
//!
//! Two handles expose the same byte, string, and integer helpers:
//! - [`MemoryView`]: a long-lived handle to an exported memory, used from the
//!   host together with the owning [`RuntimeContext`]
//! - [`MemoryAccess`]: a transient capability handed to memory-access host
//!   callbacks, valid for a single invocation
//!
//! Sizes are never cached. Guest code may grow memory between calls, so
//! every operation checks its range against the current size.
//!
//! Strings are UTF-8. [`MemoryView::write_string`] writes no terminator;
//! callers pass the returned length back to [`MemoryView::read_string`].

use std::ops::Range;

use uuid::Uuid;
use wasmtime::Memory;

use interop_runtime_common::{MemoryError, RuntimeError};

use crate::RuntimeContext;
use crate::caller::CallContext;

/// Size of one WebAssembly page in bytes.
pub const PAGE_SIZE: usize = 65_536;

/// Handle to one exported linear memory.
///
/// A `MemoryView` does not borrow the context; it records which context
/// created it and takes that context as an argument on every operation.
#[derive(Debug, Clone)]
pub struct MemoryView {
    name: String,
    memory: Memory,
    context_id: Uuid,
}

impl MemoryView {
    pub(crate) fn new(name: impl Into<String>, memory: Memory, context_id: Uuid) -> Self {
        Self {
            name: name.into(),
            memory,
            context_id,
        }
    }

    /// Export name this view was obtained under.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn data<'a>(&self, ctx: &'a RuntimeContext) -> Result<&'a [u8], RuntimeError> {
        let store = ctx.store(self.context_id)?;
        Ok(self.memory.data(store))
    }

    fn data_mut<'a>(&self, ctx: &'a mut RuntimeContext) -> Result<&'a mut [u8], RuntimeError> {
        let store = ctx.store_mut(self.context_id)?;
        Ok(self.memory.data_mut(store))
    }

    /// Borrow the memory as a [`MemoryAccess`] for a batch of operations.
    ///
    /// Works from the host through the [`RuntimeContext`] and from inside a
    /// callback through its [`crate::HostCaller`], for any module loaded in
    /// the same context.
    pub fn access<'a>(
        &self,
        ctx: &'a mut impl CallContext,
    ) -> Result<MemoryAccess<'a>, RuntimeError> {
        let store = ctx.store_for(self.context_id)?;
        Ok(MemoryAccess::new(self.memory.data_mut(store)))
    }

    /// Current size in bytes (page count × 65 536).
    pub fn size_in_bytes(&self, ctx: &RuntimeContext) -> Result<usize, RuntimeError> {
        Ok(self.data(ctx)?.len())
    }

    /// Current size in pages.
    pub fn page_count(&self, ctx: &RuntimeContext) -> Result<u64, RuntimeError> {
        let store = ctx.store(self.context_id)?;
        Ok(self.memory.size(store))
    }

    /// Grow the memory by `pages`, returning the previous page count.
    pub fn grow(&self, ctx: &mut RuntimeContext, pages: u64) -> Result<u64, RuntimeError> {
        let store = ctx.store_mut(self.context_id)?;
        self.memory.grow(store, pages).map_err(|e| {
            MemoryError::GrowFailed {
                pages,
                reason: e.to_string(),
            }
            .into()
        })
    }

    /// Copy `bytes` into memory at `offset`.
    pub fn write_bytes(
        &self,
        ctx: &mut RuntimeContext,
        offset: usize,
        bytes: &[u8],
    ) -> Result<(), RuntimeError> {
        Ok(write_bytes(self.data_mut(ctx)?, offset, bytes)?)
    }

    /// Copy `len` bytes out of memory starting at `offset`.
    pub fn read_bytes(
        &self,
        ctx: &RuntimeContext,
        offset: usize,
        len: usize,
    ) -> Result<Vec<u8>, RuntimeError> {
        Ok(read_bytes(self.data(ctx)?, offset, len)?)
    }

    /// Write `text` as UTF-8 without a terminator. Returns the byte count.
    pub fn write_string(
        &self,
        ctx: &mut RuntimeContext,
        offset: usize,
        text: &str,
    ) -> Result<usize, RuntimeError> {
        Ok(write_string(self.data_mut(ctx)?, offset, text)?)
    }

    /// Write `text` as UTF-8 followed by a zero byte. Returns the byte
    /// count including the terminator.
    pub fn write_null_terminated_string(
        &self,
        ctx: &mut RuntimeContext,
        offset: usize,
        text: &str,
    ) -> Result<usize, RuntimeError> {
        Ok(write_null_terminated_string(
            self.data_mut(ctx)?,
            offset,
            text,
        )?)
    }

    /// Decode exactly `len` bytes at `offset` as UTF-8.
    pub fn read_string(
        &self,
        ctx: &RuntimeContext,
        offset: usize,
        len: usize,
    ) -> Result<String, RuntimeError> {
        Ok(read_string(self.data(ctx)?, offset, len)?)
    }

    /// Decode the bytes from `offset` up to the first zero byte as UTF-8.
    pub fn read_null_terminated_string(
        &self,
        ctx: &RuntimeContext,
        offset: usize,
    ) -> Result<String, RuntimeError> {
        Ok(read_null_terminated_string(self.data(ctx)?, offset)?)
    }

    /// Write a little-endian `i32` at `offset`.
    pub fn write_i32(
        &self,
        ctx: &mut RuntimeContext,
        offset: usize,
        value: i32,
    ) -> Result<(), RuntimeError> {
        Ok(write_bytes(self.data_mut(ctx)?, offset, &value.to_le_bytes())?)
    }

    /// Read a little-endian `i32` at `offset`.
    pub fn read_i32(&self, ctx: &RuntimeContext, offset: usize) -> Result<i32, RuntimeError> {
        Ok(i32::from_le_bytes(read_array(self.data(ctx)?, offset)?))
    }

    /// Write a little-endian `i64` at `offset`.
    pub fn write_i64(
        &self,
        ctx: &mut RuntimeContext,
        offset: usize,
        value: i64,
    ) -> Result<(), RuntimeError> {
        Ok(write_bytes(self.data_mut(ctx)?, offset, &value.to_le_bytes())?)
    }

    /// Read a little-endian `i64` at `offset`.
    pub fn read_i64(&self, ctx: &RuntimeContext, offset: usize) -> Result<i64, RuntimeError> {
        Ok(i64::from_le_bytes(read_array(self.data(ctx)?, offset)?))
    }

    /// Write a little-endian `f32` at `offset`.
    pub fn write_f32(
        &self,
        ctx: &mut RuntimeContext,
        offset: usize,
        value: f32,
    ) -> Result<(), RuntimeError> {
        Ok(write_bytes(self.data_mut(ctx)?, offset, &value.to_le_bytes())?)
    }

    /// Read a little-endian `f32` at `offset`.
    pub fn read_f32(&self, ctx: &RuntimeContext, offset: usize) -> Result<f32, RuntimeError> {
        Ok(f32::from_le_bytes(read_array(self.data(ctx)?, offset)?))
    }

    /// Write a little-endian `f64` at `offset`.
    pub fn write_f64(
        &self,
        ctx: &mut RuntimeContext,
        offset: usize,
        value: f64,
    ) -> Result<(), RuntimeError> {
        Ok(write_bytes(self.data_mut(ctx)?, offset, &value.to_le_bytes())?)
    }

    /// Read a little-endian `f64` at `offset`.
    pub fn read_f64(&self, ctx: &RuntimeContext, offset: usize) -> Result<f64, RuntimeError> {
        Ok(f64::from_le_bytes(read_array(self.data(ctx)?, offset)?))
    }
}

/// Transient read/write access to a guest's linear memory.
///
/// Handed to memory-access host callbacks for the duration of one call,
/// or obtained from [`MemoryView::access`]. The borrow makes it impossible
/// to keep past the call or to run guest code while it is alive.
#[derive(Debug)]
pub struct MemoryAccess<'a> {
    data: &'a mut [u8],
}

impl<'a> MemoryAccess<'a> {
    pub(crate) fn new(data: &'a mut [u8]) -> Self {
        Self { data }
    }

    /// Current size in bytes.
    pub fn size_in_bytes(&self) -> usize {
        self.data.len()
    }

    /// Raw view of the whole memory.
    pub fn as_slice(&self) -> &[u8] {
        &*self.data
    }

    /// Mutable view of `len` bytes at `offset`, for in-place transforms.
    pub fn slice_mut(&mut self, offset: usize, len: usize) -> Result<&mut [u8], MemoryError> {
        let range = check_range(self.data.len(), offset, len)?;
        Ok(&mut self.data[range])
    }

    /// Copy `bytes` into memory at `offset`.
    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) -> Result<(), MemoryError> {
        write_bytes(&mut *self.data, offset, bytes)
    }

    /// Copy `len` bytes out of memory starting at `offset`.
    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<Vec<u8>, MemoryError> {
        read_bytes(&*self.data, offset, len)
    }

    /// Write `text` as UTF-8 without a terminator. Returns the byte count.
    pub fn write_string(&mut self, offset: usize, text: &str) -> Result<usize, MemoryError> {
        write_string(&mut *self.data, offset, text)
    }

    /// Write `text` as UTF-8 followed by a zero byte.
    pub fn write_null_terminated_string(
        &mut self,
        offset: usize,
        text: &str,
    ) -> Result<usize, MemoryError> {
        write_null_terminated_string(&mut *self.data, offset, text)
    }

    /// Decode exactly `len` bytes at `offset` as UTF-8.
    pub fn read_string(&self, offset: usize, len: usize) -> Result<String, MemoryError> {
        read_string(&*self.data, offset, len)
    }

    /// Decode the bytes from `offset` up to the first zero byte as UTF-8.
    pub fn read_null_terminated_string(&self, offset: usize) -> Result<String, MemoryError> {
        read_null_terminated_string(&*self.data, offset)
    }

    /// Write a little-endian `i32` at `offset`.
    pub fn write_i32(&mut self, offset: usize, value: i32) -> Result<(), MemoryError> {
        write_bytes(&mut *self.data, offset, &value.to_le_bytes())
    }

    /// Read a little-endian `i32` at `offset`.
    pub fn read_i32(&self, offset: usize) -> Result<i32, MemoryError> {
        Ok(i32::from_le_bytes(read_array(&*self.data, offset)?))
    }

    /// Write a little-endian `i64` at `offset`.
    pub fn write_i64(&mut self, offset: usize, value: i64) -> Result<(), MemoryError> {
        write_bytes(&mut *self.data, offset, &value.to_le_bytes())
    }

    /// Read a little-endian `i64` at `offset`.
    pub fn read_i64(&self, offset: usize) -> Result<i64, MemoryError> {
        Ok(i64::from_le_bytes(read_array(&*self.data, offset)?))
    }
}

fn check_range(size: usize, offset: usize, len: usize) -> Result<Range<usize>, MemoryError> {
    match offset.checked_add(len) {
        Some(end) if end <= size => Ok(offset..end),
        _ => Err(MemoryError::OutOfBounds { offset, len, size }),
    }
}

fn write_bytes(data: &mut [u8], offset: usize, bytes: &[u8]) -> Result<(), MemoryError> {
    let range = check_range(data.len(), offset, bytes.len())?;
    data[range].copy_from_slice(bytes);
    Ok(())
}

fn read_bytes(data: &[u8], offset: usize, len: usize) -> Result<Vec<u8>, MemoryError> {
    let range = check_range(data.len(), offset, len)?;
    Ok(data[range].to_vec())
}

fn read_array<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], MemoryError> {
    let range = check_range(data.len(), offset, N)?;
    let mut out = [0u8; N];
    out.copy_from_slice(&data[range]);
    Ok(out)
}

fn write_string(data: &mut [u8], offset: usize, text: &str) -> Result<usize, MemoryError> {
    write_bytes(data, offset, text.as_bytes())?;
    Ok(text.len())
}

fn write_null_terminated_string(
    data: &mut [u8],
    offset: usize,
    text: &str,
) -> Result<usize, MemoryError> {
    let bytes = text.as_bytes();
    let range = check_range(data.len(), offset, bytes.len() + 1)?;
    let (body, terminator) = data[range].split_at_mut(bytes.len());
    body.copy_from_slice(bytes);
    terminator[0] = 0;
    Ok(bytes.len() + 1)
}

fn decode(bytes: &[u8], offset: usize) -> Result<String, MemoryError> {
    std::str::from_utf8(bytes)
        .map(str::to_owned)
        .map_err(|e| MemoryError::InvalidUtf8 {
            offset,
            reason: e.to_string(),
        })
}

fn read_string(data: &[u8], offset: usize, len: usize) -> Result<String, MemoryError> {
    let range = check_range(data.len(), offset, len)?;
    decode(&data[range], offset)
}

fn read_null_terminated_string(data: &[u8], offset: usize) -> Result<String, MemoryError> {
    let size = data.len();
    let tail = data
        .get(offset..)
        .ok_or(MemoryError::OutOfBounds { offset, len: 1, size })?;
    let len = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(MemoryError::Unterminated { offset, size })?;
    decode(&tail[..len], offset)
}
