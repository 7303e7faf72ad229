//! WebAssembly module compilation and export metadata.
//!
//! This module provides [`CompiledModule`], a wrapper around Wasmtime's
//! [`Module`] that records the module name, a content hash, and the export
//! table in declaration order.
//!
//! # Encodings
//!
//! - **Text**: WAT source, parsed and compiled in one step
//! - **Binary**: `.wasm` bytes, checked for the magic header first

use std::hash::{DefaultHasher, Hash, Hasher};
use std::time::Instant;

use tracing::{debug, instrument};
use wasmtime::{Engine, ExternType, Module};

use interop_runtime_common::RuntimeError;

use crate::value::{Signature, describe_func_type};

/// A compiled, validated WebAssembly module.
///
/// A `CompiledModule` is tied to the engine that compiled it and can be
/// instantiated any number of times against stores of that engine.
#[derive(Clone)]
pub struct CompiledModule {
    /// The compiled Wasmtime module.
    inner: Module,

    /// Module name used in diagnostics.
    name: String,

    /// Hash of the original source bytes.
    content_hash: String,
}

/// What kind of item an export is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExportKind {
    /// A function. `signature` is `None` when the function uses
    /// non-numeric types or returns several values.
    Function {
        /// The numeric signature, if representable.
        signature: Option<Signature>,
        /// Human-readable type, always present.
        description: String,
    },
    /// A linear memory.
    Memory {
        /// Initial size in pages.
        minimum_pages: u64,
        /// Maximum size in pages, if bounded.
        maximum_pages: Option<u64>,
    },
    /// A table.
    Table,
    /// A global.
    Global,
    /// Any other extern kind (tags, ...).
    Other,
}

impl std::fmt::Display for ExportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Function { description, .. } => write!(f, "func {description}"),
            Self::Memory {
                minimum_pages,
                maximum_pages: Some(max),
            } => write!(f, "memory {minimum_pages}..{max} pages"),
            Self::Memory { minimum_pages, .. } => write!(f, "memory {minimum_pages}.. pages"),
            Self::Table => write!(f, "table"),
            Self::Global => write!(f, "global"),
            Self::Other => write!(f, "other"),
        }
    }
}

/// One entry of a module's export table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportInfo {
    /// Export name.
    pub name: String,
    /// Export kind and type.
    pub kind: ExportKind,
}

impl CompiledModule {
    /// Compile a module from WAT (WebAssembly Text Format).
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::CompilationFailed`] if the text is malformed
    /// or the module fails validation.
    #[instrument(skip(engine, wat), fields(bytes_len = wat.len()))]
    pub fn from_text(engine: &Engine, name: &str, wat: &str) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        let module = Module::new(engine, wat.as_bytes())
            .map_err(|e| RuntimeError::compilation_failed(name, format!("{e:#}")))?;

        let compiled = Self::wrap(module, name, wat.as_bytes());

        debug!(
            content_hash = %compiled.content_hash,
            duration_us = start.elapsed().as_micros(),
            "Text module compiled"
        );

        Ok(compiled)
    }

    /// Compile a module from the binary encoding.
    ///
    /// # Errors
    ///
    /// Returns [`RuntimeError::CompilationFailed`] if the bytes are not a
    /// valid WebAssembly module.
    #[instrument(skip(engine, bytes), fields(bytes_len = bytes.len()))]
    pub fn from_binary(engine: &Engine, name: &str, bytes: &[u8]) -> Result<Self, RuntimeError> {
        let start = Instant::now();

        Self::validate_wasm_header(name, bytes)?;

        let module = Module::from_binary(engine, bytes)
            .map_err(|e| RuntimeError::compilation_failed(name, format!("{e:#}")))?;

        let compiled = Self::wrap(module, name, bytes);

        debug!(
            content_hash = %compiled.content_hash,
            duration_us = start.elapsed().as_micros(),
            "Binary module compiled"
        );

        Ok(compiled)
    }

    fn wrap(module: Module, name: &str, source: &[u8]) -> Self {
        Self {
            inner: module,
            name: name.to_string(),
            content_hash: compute_hash(source),
        }
    }

    /// Get the module name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Get the content hash of the original source.
    pub fn content_hash(&self) -> &str {
        &self.content_hash
    }

    /// Get the inner Wasmtime module.
    pub fn inner(&self) -> &Module {
        &self.inner
    }

    /// Export names in declaration order.
    pub fn export_names(&self) -> Vec<String> {
        self.inner
            .exports()
            .map(|export| export.name().to_string())
            .collect()
    }

    /// Export table in declaration order.
    pub fn exports(&self) -> Vec<ExportInfo> {
        self.inner
            .exports()
            .map(|export| ExportInfo {
                name: export.name().to_string(),
                kind: export_kind(&export.ty()),
            })
            .collect()
    }

    /// Look up one export by name.
    pub fn export(&self, name: &str) -> Option<ExportInfo> {
        self.inner.get_export(name).map(|ty| ExportInfo {
            name: name.to_string(),
            kind: export_kind(&ty),
        })
    }

    /// Validate WebAssembly header (magic number).
    fn validate_wasm_header(name: &str, bytes: &[u8]) -> Result<(), RuntimeError> {
        if bytes.len() < 8 {
            return Err(RuntimeError::compilation_failed(
                name,
                "Invalid Wasm: file too small",
            ));
        }

        // Check magic number: \0asm
        if &bytes[0..4] != b"\0asm" {
            return Err(RuntimeError::compilation_failed(
                name,
                "Invalid Wasm: bad magic number",
            ));
        }

        Ok(())
    }
}

fn export_kind(ty: &ExternType) -> ExportKind {
    match ty {
        ExternType::Func(func) => ExportKind::Function {
            signature: Signature::from_func_type(func),
            description: describe_func_type(func),
        },
        ExternType::Memory(memory) => ExportKind::Memory {
            minimum_pages: memory.minimum(),
            maximum_pages: memory.maximum(),
        },
        ExternType::Table(_) => ExportKind::Table,
        ExternType::Global(_) => ExportKind::Global,
        #[allow(unreachable_patterns)]
        _ => ExportKind::Other,
    }
}

impl std::fmt::Debug for CompiledModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledModule")
            .field("name", &self.name)
            .field("content_hash", &self.content_hash)
            .finish_non_exhaustive()
    }
}

/// Compute a hash of the given bytes.
fn compute_hash(bytes: &[u8]) -> String {
    let mut hasher = DefaultHasher::new();
    bytes.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::ValueKind;

    // Minimal valid Wasm module (empty module)
    const MINIMAL_WASM: &[u8] = &[
        0x00, 0x61, 0x73, 0x6d, // magic: \0asm
        0x01, 0x00, 0x00, 0x00, // version: 1
    ];

    const EXPORTS_WAT: &str = r#"
        (module
            (memory (export "memory") 1 4)
            (func (export "add") (param i32 i32) (result i32)
                (i32.add (local.get 0) (local.get 1)))
            (func (export "pair") (result i32 i32)
                (i32.const 1) (i32.const 2))
            (global (export "counter") i32 (i32.const 0))
            (func (export "tick"))
        )
    "#;

    fn engine() -> Engine {
        Engine::default()
    }

    #[test]
    fn test_validate_wasm_header_valid() {
        assert!(CompiledModule::validate_wasm_header("m", MINIMAL_WASM).is_ok());
    }

    #[test]
    fn test_validate_wasm_header_too_small() {
        let result = CompiledModule::validate_wasm_header("m", &[0x00, 0x61]);
        assert!(matches!(
            result,
            Err(RuntimeError::CompilationFailed { .. })
        ));
    }

    #[test]
    fn test_validate_wasm_header_bad_magic() {
        let bad_wasm = &[0x00, 0x00, 0x00, 0x00, 0x01, 0x00, 0x00, 0x00];
        let result = CompiledModule::validate_wasm_header("m", bad_wasm);
        assert!(result.is_err());
    }

    #[test]
    fn test_compute_hash() {
        let hash1 = compute_hash(b"hello");
        let hash2 = compute_hash(b"hello");
        let hash3 = compute_hash(b"world");

        assert_eq!(hash1, hash2);
        assert_ne!(hash1, hash3);
        assert_eq!(hash1.len(), 16);
    }

    #[test]
    fn test_binary_compilation() {
        let module = CompiledModule::from_binary(&engine(), "empty", MINIMAL_WASM).unwrap();

        assert_eq!(module.name(), "empty");
        assert!(module.export_names().is_empty());
    }

    #[test]
    fn test_text_compilation_error() {
        let result = CompiledModule::from_text(&engine(), "broken", "(module (func");
        match result {
            Err(RuntimeError::CompilationFailed { module, .. }) => assert_eq!(module, "broken"),
            other => panic!("expected compilation failure, got {other:?}"),
        }
    }

    #[test]
    fn test_exports_in_declaration_order() {
        let module = CompiledModule::from_text(&engine(), "exports", EXPORTS_WAT).unwrap();

        assert_eq!(
            module.export_names(),
            vec!["memory", "add", "pair", "counter", "tick"]
        );
    }

    #[test]
    fn test_export_kinds() {
        let module = CompiledModule::from_text(&engine(), "exports", EXPORTS_WAT).unwrap();

        let add = module.export("add").unwrap();
        match add.kind {
            ExportKind::Function { signature, .. } => {
                let sig = signature.unwrap();
                assert_eq!(sig.params(), &[ValueKind::I32, ValueKind::I32]);
                assert_eq!(sig.result(), Some(ValueKind::I32));
            }
            other => panic!("expected function, got {other:?}"),
        }

        let pair = module.export("pair").unwrap();
        assert!(matches!(
            pair.kind,
            ExportKind::Function {
                signature: None,
                ..
            }
        ));

        let memory = module.export("memory").unwrap();
        assert_eq!(
            memory.kind,
            ExportKind::Memory {
                minimum_pages: 1,
                maximum_pages: Some(4)
            }
        );
        assert_eq!(memory.kind.to_string(), "memory 1..4 pages");

        assert_eq!(module.export("counter").unwrap().kind, ExportKind::Global);
        assert!(module.export("missing").is_none());
    }

    #[test]
    fn test_module_debug() {
        let module = CompiledModule::from_binary(&engine(), "empty", MINIMAL_WASM).unwrap();

        let debug_str = format!("{module:?}");
        assert!(debug_str.contains("CompiledModule"));
        assert!(debug_str.contains("content_hash"));
    }
}
