//! Compile context: backend ownership and per-function records.
//!
//! The context owns the backend and the table of compilation outcomes.
//! `compile` is the single choke point where a successful artifact becomes
//! observable: the dispatch slot install and the record insert happen
//! together, inside the threaded-compile serialization scope, so batch
//! workers never expose a half-registered function.

use std::sync::Arc;

use onyx_core::{JitError, JitResult};
use onyx_runtime::{FuncId, FuncRef, TypeRef};
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::debug;

use crate::backend::{BackendError, CompilerBackend, NativeEntry, TypeSlots};
use crate::config::JitConfig;
use crate::threaded_compile::ThreadedCompileContext;

// =============================================================================
// Compile results
// =============================================================================

/// Outcome of a compilation request, as reported to the embedder.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompileResult {
    /// The function is compiled (now, or already was).
    Ok,
    /// Transient failure; re-attempt later in single-threaded context.
    Retry,
    /// The function cannot be specialized.
    CannotSpecialize,
    /// The controller is not initialized.
    NotInitialized,
    /// Unclassified failure, including the recursion guard tripping.
    UnknownError,
}

impl CompileResult {
    /// Did the request leave the function compiled?
    #[inline]
    pub fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl From<BackendError> for CompileResult {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Retry => Self::Retry,
            BackendError::CannotSpecialize => Self::CannotSpecialize,
            BackendError::Unknown => Self::UnknownError,
        }
    }
}

// =============================================================================
// Compilation records
// =============================================================================

/// Everything recorded about one compiled function.
#[derive(Debug, Clone)]
pub struct CompilationRecord {
    /// The compiled function.
    pub func: FuncRef,
    /// Entry point of the emitted code.
    pub entry: NativeEntry,
    /// Bytes of emitted code.
    pub code_size: usize,
    /// Stack frame size.
    pub stack_size: usize,
    /// Bytes reserved for register spills.
    pub spill_stack_size: usize,
    /// Textual HIR, if kept.
    pub hir_dump: Option<String>,
    /// Disassembly, if kept.
    pub disassembly: Option<String>,
}

// =============================================================================
// Compile context
// =============================================================================

/// Owns the backend and the record map.
pub struct CompileContext {
    backend: Box<dyn CompilerBackend>,
    records: RwLock<FxHashMap<FuncId, CompilationRecord>>,
    serial: Arc<ThreadedCompileContext>,
    dump_hir: bool,
    disas_funcs: bool,
}

impl CompileContext {
    /// Build a context over the given backend.
    pub fn new(
        backend: Box<dyn CompilerBackend>,
        serial: Arc<ThreadedCompileContext>,
        config: &JitConfig,
    ) -> Self {
        Self {
            backend,
            records: RwLock::new(FxHashMap::default()),
            serial,
            dump_hir: config.dump_hir || config.dump_final_hir,
            disas_funcs: config.disas_funcs,
        }
    }

    /// Compile `func`, installing native dispatch on success.
    ///
    /// Callable from batch workers; the install-and-record step runs under
    /// the threaded-compile serialization scope.
    pub fn compile(&self, func: &FuncRef) -> CompileResult {
        let artifact = match self.backend.compile(func) {
            Ok(artifact) => artifact,
            Err(err) => return err.into(),
        };

        let _serialized = self.serial.serialize();
        if self.dump_hir {
            if let Some(hir) = &artifact.hir_dump {
                debug!(func = %func.full_name(), "HIR:\n{}", hir);
            }
        }
        if self.disas_funcs {
            if let Some(disas) = &artifact.disassembly {
                debug!(func = %func.full_name(), "disassembly:\n{}", disas);
            }
        }

        func.install_entry(artifact.entry.as_ptr());
        self.records.write().insert(
            FuncId::of(func),
            CompilationRecord {
                func: Arc::clone(func),
                entry: artifact.entry,
                code_size: artifact.code_size,
                stack_size: artifact.stack_size,
                spill_stack_size: artifact.spill_stack_size,
                hir_dump: artifact.hir_dump,
                disassembly: artifact.disassembly,
            },
        );
        CompileResult::Ok
    }

    /// Has this context compiled `func`?
    pub fn did_compile(&self, func: &FuncRef) -> bool {
        self.records.read().contains_key(&FuncId::of(func))
    }

    /// Textual HIR for a compiled function.
    pub fn print_hir(&self, func: &FuncRef) -> JitResult<String> {
        self.with_record(func, |record| {
            record
                .hir_dump
                .clone()
                .unwrap_or_else(|| "<hir unavailable>".to_owned())
        })
    }

    /// Disassembly of a compiled function.
    pub fn disassemble(&self, func: &FuncRef) -> JitResult<String> {
        self.with_record(func, |record| {
            record
                .disassembly
                .clone()
                .unwrap_or_else(|| "<disassembly unavailable>".to_owned())
        })
    }

    /// Code size in bytes, if compiled.
    pub fn code_size(&self, func: &FuncRef) -> Option<usize> {
        self.records
            .read()
            .get(&FuncId::of(func))
            .map(|r| r.code_size)
    }

    /// Stack frame size in bytes, if compiled.
    pub fn stack_size(&self, func: &FuncRef) -> Option<usize> {
        self.records
            .read()
            .get(&FuncId::of(func))
            .map(|r| r.stack_size)
    }

    /// Spill area size in bytes, if compiled.
    pub fn spill_stack_size(&self, func: &FuncRef) -> Option<usize> {
        self.records
            .read()
            .get(&FuncId::of(func))
            .map(|r| r.spill_stack_size)
    }

    /// Every function this context has compiled.
    pub fn compiled_functions(&self) -> Vec<FuncRef> {
        self.records
            .read()
            .values()
            .map(|r| Arc::clone(&r.func))
            .collect()
    }

    /// Number of compiled functions.
    pub fn compiled_count(&self) -> usize {
        self.records.read().len()
    }

    /// Install specialized dispatch slots on a type.
    pub fn specialize_type(&self, ty: &TypeRef, slots: &mut TypeSlots) -> CompileResult {
        match self.backend.specialize_type(ty, slots) {
            Ok(()) => CompileResult::Ok,
            Err(err) => err.into(),
        }
    }

    /// Opcodes the backend can lower.
    pub fn supported_opcodes(&self) -> Vec<u32> {
        self.backend.supported_opcodes()
    }

    /// Release backend-held references ahead of teardown.
    pub fn release_references(&self) {
        self.backend.release_references();
    }

    fn with_record<T>(&self, func: &FuncRef, f: impl FnOnce(&CompilationRecord) -> T) -> JitResult<T> {
        let records = self.records.read();
        match records.get(&FuncId::of(func)) {
            Some(record) => Ok(f(record)),
            None => Err(JitError::NotCompiled),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
