//! Numeric value kinds and signatures crossing the host/guest boundary.
//!
//! Only four WebAssembly value kinds are supported: `i32`, `i64`, `f32` and
//! `f64`. The sealed [`WasmNum`] trait is implemented for exactly the
//! matching Rust types, so a host callback or export lookup using any other
//! type does not compile.

use std::fmt;

use wasmtime::{FuncType, Val, ValType};

/// One of the four numeric WebAssembly value kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// 32-bit integer.
    I32,
    /// 64-bit integer.
    I64,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl ValueKind {
    /// Map a wasmtime value type onto a numeric kind.
    ///
    /// Returns `None` for vectors and references.
    pub fn from_val_type(ty: &ValType) -> Option<Self> {
        match ty {
            ValType::I32 => Some(Self::I32),
            ValType::I64 => Some(Self::I64),
            ValType::F32 => Some(Self::F32),
            ValType::F64 => Some(Self::F64),
            _ => None,
        }
    }

    /// Zero value of this kind, used to size result buffers.
    pub(crate) fn zero(self) -> Val {
        match self {
            Self::I32 => Val::I32(0),
            Self::I64 => Val::I64(0),
            Self::F32 => Val::F32(0),
            Self::F64 => Val::F64(0),
        }
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32 => write!(f, "i32"),
            Self::I64 => write!(f, "i64"),
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
        }
    }
}

mod sealed {
    pub trait Sealed {}

    impl Sealed for i32 {}
    impl Sealed for i64 {}
    impl Sealed for f32 {}
    impl Sealed for f64 {}
}

/// Rust types that map one-to-one onto a [`ValueKind`].
pub trait WasmNum: wasmtime::WasmTy + Copy + Send + Sync + sealed::Sealed + 'static {
    /// The value kind this type is passed as.
    const KIND: ValueKind;
}

impl WasmNum for i32 {
    const KIND: ValueKind = ValueKind::I32;
}

impl WasmNum for i64 {
    const KIND: ValueKind = ValueKind::I64;
}

impl WasmNum for f32 {
    const KIND: ValueKind = ValueKind::F32;
}

impl WasmNum for f64 {
    const KIND: ValueKind = ValueKind::F64;
}

/// A numeric function signature: parameter kinds and at most one result.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Signature {
    params: Vec<ValueKind>,
    result: Option<ValueKind>,
}

impl Signature {
    /// Create a signature from parameter kinds and an optional result kind.
    pub fn new(params: Vec<ValueKind>, result: Option<ValueKind>) -> Self {
        Self { params, result }
    }

    /// Derive a numeric signature from a wasmtime function type.
    ///
    /// Returns `None` if any parameter or result is not numeric, or if the
    /// function returns more than one value.
    pub fn from_func_type(ty: &FuncType) -> Option<Self> {
        let params = ty
            .params()
            .map(|p| ValueKind::from_val_type(&p))
            .collect::<Option<Vec<_>>>()?;

        let mut results = ty.results();
        let result = match (results.next(), results.next()) {
            (None, _) => None,
            (Some(r), None) => Some(ValueKind::from_val_type(&r)?),
            (Some(_), Some(_)) => return None,
        };

        Some(Self { params, result })
    }

    /// Parameter kinds in order.
    pub fn params(&self) -> &[ValueKind] {
        &self.params
    }

    /// Result kind, or `None` for void functions.
    pub fn result(&self) -> Option<ValueKind> {
        self.result
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, ")")?;
        match self.result {
            Some(result) => write!(f, " -> {result}"),
            None => Ok(()),
        }
    }
}

/// Render a wasmtime function type for error messages, including the
/// non-numeric shapes [`Signature`] cannot describe.
pub(crate) fn describe_func_type(ty: &FuncType) -> String {
    match Signature::from_func_type(ty) {
        Some(sig) => sig.to_string(),
        None => {
            let params: Vec<String> = ty.params().map(|p| p.to_string()).collect();
            let results: Vec<String> = ty.results().map(|r| r.to_string()).collect();
            format!("({}) -> ({})", params.join(", "), results.join(", "))
        }
    }
}

/// A single numeric value for the dynamic call path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Value {
    /// 32-bit integer.
    I32(i32),
    /// 64-bit integer.
    I64(i64),
    /// 32-bit float.
    F32(f32),
    /// 64-bit float.
    F64(f64),
}

impl Value {
    /// The kind of this value.
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::I32(_) => ValueKind::I32,
            Self::I64(_) => ValueKind::I64,
            Self::F32(_) => ValueKind::F32,
            Self::F64(_) => ValueKind::F64,
        }
    }

    /// Parse a textual argument as a value of the given kind.
    pub fn parse(kind: ValueKind, text: &str) -> Option<Self> {
        match kind {
            ValueKind::I32 => text.parse().ok().map(Self::I32),
            ValueKind::I64 => text.parse().ok().map(Self::I64),
            ValueKind::F32 => text.parse().ok().map(Self::F32),
            ValueKind::F64 => text.parse().ok().map(Self::F64),
        }
    }

    pub(crate) fn to_val(self) -> Val {
        match self {
            Self::I32(v) => Val::I32(v),
            Self::I64(v) => Val::I64(v),
            Self::F32(v) => Val::F32(v.to_bits()),
            Self::F64(v) => Val::F64(v.to_bits()),
        }
    }

    pub(crate) fn from_val(val: &Val) -> Option<Self> {
        match val {
            Val::I32(v) => Some(Self::I32(*v)),
            Val::I64(v) => Some(Self::I64(*v)),
            Val::F32(bits) => Some(Self::F32(f32::from_bits(*bits))),
            Val::F64(bits) => Some(Self::F64(f64::from_bits(*bits))),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::I32(v) => write!(f, "{v}"),
            Self::I64(v) => write!(f, "{v}"),
            Self::F32(v) => write!(f, "{v}"),
            Self::F64(v) => write!(f, "{v}"),
        }
    }
}
