//! Compiler backend interface and the default template backend.
//!
//! The controller drives compilation through the narrow
//! [`CompilerBackend`] trait: hand it a function, get back a
//! [`CompiledArtifact`] describing the emitted code, or a failure the
//! controller maps into its result taxonomy. The HIR builder, lowering,
//! register allocation and encoding all live behind this seam.
//!
//! [`TemplateBackend`] is the in-tree implementation: it carves entry
//! stubs out of a fixed code area allocated at startup and derives frame
//! metadata directly from the code object. It exists so the control plane
//! is fully exercisable without a native encoder in the build.

use onyx_runtime::{FuncRef, TypeRef};
use parking_lot::Mutex;
use tracing::warn;

// =============================================================================
// Native entries
// =============================================================================

/// Address of JIT-emitted code.
///
/// The control plane moves these between the backend, dispatch slots and
/// compilation records but never dereferences them itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct NativeEntry(*const u8);

impl NativeEntry {
    /// Wrap a raw code address.
    #[inline]
    pub fn new(ptr: *const u8) -> Self {
        Self(ptr)
    }

    /// The raw code address.
    #[inline]
    pub fn as_ptr(self) -> *const u8 {
        self.0
    }

    /// The address as an integer, for logging.
    #[inline]
    pub fn addr(self) -> usize {
        self.0 as usize
    }
}

// SAFETY: a NativeEntry is an address into code memory owned by the
// backend. It is only stored, compared and formatted by this crate; only
// the host's call path ever jumps through it, and the backend keeps the
// memory alive until its own teardown.
unsafe impl Send for NativeEntry {}
unsafe impl Sync for NativeEntry {}

// =============================================================================
// Backend results
// =============================================================================

/// Failure modes a backend may report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendError {
    /// Transient, thread-context-dependent failure; re-attempt later in
    /// single-threaded context.
    Retry,
    /// The function cannot be specialized.
    CannotSpecialize,
    /// Unclassified failure.
    Unknown,
}

/// Everything a successful compilation produces.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledArtifact {
    /// Entry point of the emitted code.
    pub entry: NativeEntry,
    /// Bytes of emitted code.
    pub code_size: usize,
    /// Stack frame size of the emitted code.
    pub stack_size: usize,
    /// Bytes of the frame reserved for register spills.
    pub spill_stack_size: usize,
    /// Textual HIR, if the pipeline kept it.
    pub hir_dump: Option<String>,
    /// Disassembly of the emitted code, if available.
    pub disassembly: Option<String>,
}

/// Dispatch slots a type specialization may install.
#[derive(Debug, Default, Clone, Copy)]
pub struct TypeSlots {
    /// Specialized call slot.
    pub call: Option<NativeEntry>,
    /// Specialized attribute-load slot.
    pub get_attr: Option<NativeEntry>,
    /// Specialized attribute-store slot.
    pub set_attr: Option<NativeEntry>,
}

// =============================================================================
// Backend trait
// =============================================================================

/// The compiler backend, as seen by the controller.
///
/// Implementations must be callable from multiple batch workers at once;
/// the controller serializes dispatch-slot installation and record keeping
/// itself, so `compile` only has to protect its own state.
pub trait CompilerBackend: Send + Sync {
    /// Compile one function to native code.
    fn compile(&self, func: &FuncRef) -> Result<CompiledArtifact, BackendError>;

    /// Install specialized dispatch slots for a type.
    fn specialize_type(&self, ty: &TypeRef, slots: &mut TypeSlots) -> Result<(), BackendError>;

    /// The set of bytecode opcodes this backend can lower.
    fn supported_opcodes(&self) -> Vec<u32>;

    /// Drop any host references the backend is holding. Called at
    /// finalization before the backend itself is destroyed.
    fn release_references(&self);
}

impl<T: CompilerBackend + ?Sized> CompilerBackend for std::sync::Arc<T> {
    fn compile(&self, func: &FuncRef) -> Result<CompiledArtifact, BackendError> {
        self.as_ref().compile(func)
    }

    fn specialize_type(&self, ty: &TypeRef, slots: &mut TypeSlots) -> Result<(), BackendError> {
        self.as_ref().specialize_type(ty, slots)
    }

    fn supported_opcodes(&self) -> Vec<u32> {
        self.as_ref().supported_opcodes()
    }

    fn release_references(&self) {
        self.as_ref().release_references()
    }
}

// =============================================================================
// Code arena
// =============================================================================

/// Default capacity of the code area, allocated once at initialization.
pub const DEFAULT_CODE_AREA_SIZE: usize = 2 * 1024 * 1024;

const ENTRY_ALIGN: usize = 16;

/// Bump allocator over a fixed block of code memory.
///
/// Allocations are never freed individually; the whole area is reused
/// across compilations and released when the backend is dropped.
#[derive(Debug)]
pub struct CodeArena {
    storage: Box<[u8]>,
    used: usize,
}

impl CodeArena {
    /// Allocate an arena of the given capacity.
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: vec![0u8; capacity].into_boxed_slice(),
            used: 0,
        }
    }

    /// Carve out `size` bytes, filled with trap bytes, 16-byte aligned.
    /// Returns `None` when the area is exhausted.
    pub fn alloc(&mut self, size: usize) -> Option<NativeEntry> {
        let size = size.max(1).next_multiple_of(ENTRY_ALIGN);
        if self.used + size > self.storage.len() {
            return None;
        }
        let region = &mut self.storage[self.used..self.used + size];
        region.fill(0xCC);
        let entry = NativeEntry::new(region.as_ptr());
        self.used += size;
        Some(entry)
    }

    /// Bytes currently in use.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Total capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.storage.len()
    }

    /// Forget all allocations, reusing the area from the start.
    pub fn reset(&mut self) {
        self.used = 0;
    }
}

// =============================================================================
// Template backend
// =============================================================================

const STUB_HEADER_SIZE: usize = 16;
const BYTES_PER_OP: usize = 4;
const SLOT_STUB_SIZE: usize = 32;
const SUPPORTED_OPCODE_COUNT: u32 = 64;

/// The default backend: stub emission plus deterministic frame metadata.
pub struct TemplateBackend {
    arena: Mutex<CodeArena>,
}

impl TemplateBackend {
    /// Backend over a code area of the default size.
    pub fn new() -> Self {
        Self::with_code_area_size(DEFAULT_CODE_AREA_SIZE)
    }

    /// Backend over a code area of the given size.
    pub fn with_code_area_size(capacity: usize) -> Self {
        Self {
            arena: Mutex::new(CodeArena::new(capacity)),
        }
    }

    /// Bytes of code memory currently in use.
    pub fn code_area_used(&self) -> usize {
        self.arena.lock().used()
    }

    fn render_hir(func: &FuncRef) -> String {
        let code = func.code();
        let mut out = format!("fn {} {{\n  bb 0 {{\n", func.full_name());
        out.push_str("    v0 = LoadCurrentFunc\n");
        for (i, op) in code.bytecode.iter().enumerate() {
            out.push_str(&format!("    v{} = BytecodeOp<{}> v0\n", i + 1, op));
        }
        out.push_str(&format!("    Return v{}\n  }}\n}}\n", code.bytecode.len()));
        out
    }

    fn render_disassembly(entry: NativeEntry, code_size: usize) -> String {
        let mut out = String::new();
        let mut offset = 0;
        while offset < code_size {
            out.push_str(&format!("{:#018x}: cc  int3\n", entry.addr() + offset));
            offset += ENTRY_ALIGN;
        }
        out
    }
}

impl Default for TemplateBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl CompilerBackend for TemplateBackend {
    fn compile(&self, func: &FuncRef) -> Result<CompiledArtifact, BackendError> {
        let code = func.code();
        let code_size = STUB_HEADER_SIZE + BYTES_PER_OP * code.bytecode.len();

        let entry = match self.arena.lock().alloc(code_size) {
            Some(entry) => entry,
            None => {
                warn!(func = %func.full_name(), "code area exhausted");
                return Err(BackendError::Unknown);
            }
        };

        let register_count = code.register_count as usize;
        Ok(CompiledArtifact {
            entry,
            code_size,
            stack_size: 64 + 8 * register_count,
            spill_stack_size: 8 * (register_count / 2),
            hir_dump: Some(Self::render_hir(func)),
            disassembly: Some(Self::render_disassembly(entry, code_size)),
        })
    }

    fn specialize_type(&self, ty: &TypeRef, slots: &mut TypeSlots) -> Result<(), BackendError> {
        let entry = self
            .arena
            .lock()
            .alloc(SLOT_STUB_SIZE)
            .ok_or(BackendError::Unknown)?;
        let _ = ty;
        slots.call = Some(entry);
        Ok(())
    }

    fn supported_opcodes(&self) -> Vec<u32> {
        (0..SUPPORTED_OPCODE_COUNT).collect()
    }

    fn release_references(&self) {
        self.arena.lock().reset();
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use onyx_runtime::{CodeFlags, CodeObject, Function, TypeObject};

    fn make_func(bytecode: Vec<u8>, register_count: u16) -> FuncRef {
        let code = CodeObject::with_details("f", bytecode, register_count, CodeFlags::NONE);
        Function::new("m", "f", code)
    }

    #[test]
    fn test_arena_alloc_aligned() {
        let mut arena = CodeArena::new(256);
        let a = arena.alloc(10).unwrap();
        let b = arena.alloc(10).unwrap();
        assert_eq!(a.addr() % 16, 0);
        assert_eq!(b.addr() - a.addr(), 16);
        assert_eq!(arena.used(), 32);
    }

    #[test]
    fn test_arena_exhaustion() {
        let mut arena = CodeArena::new(32);
        assert!(arena.alloc(16).is_some());
        assert!(arena.alloc(16).is_some());
        assert!(arena.alloc(1).is_none());

        arena.reset();
        assert!(arena.alloc(16).is_some());
    }

    #[test]
    fn test_compile_produces_artifact() {
        let backend = TemplateBackend::with_code_area_size(4096);
        let func = make_func(vec![1, 2, 3], 4);

        let artifact = backend.compile(&func).unwrap();
        assert_eq!(artifact.code_size, STUB_HEADER_SIZE + 3 * BYTES_PER_OP);
        assert_eq!(artifact.stack_size, 64 + 32);
        assert_eq!(artifact.spill_stack_size, 16);
        assert!(!artifact.entry.as_ptr().is_null());

        let hir = artifact.hir_dump.unwrap();
        assert!(hir.contains("fn m:f"));
        assert!(hir.contains("BytecodeOp<2>"));

        let disas = artifact.disassembly.unwrap();
        assert!(disas.contains("int3"));
    }

    #[test]
    fn test_compile_exhausts_code_area() {
        let backend = TemplateBackend::with_code_area_size(16);
        let func = make_func(vec![0; 64], 0);
        assert_eq!(backend.compile(&func), Err(BackendError::Unknown));
    }

    #[test]
    fn test_specialize_type_fills_call_slot() {
        let backend = TemplateBackend::with_code_area_size(4096);
        let ty = TypeObject::new("list");
        let mut slots = TypeSlots::default();

        backend.specialize_type(&ty, &mut slots).unwrap();
        assert!(slots.call.is_some());
        assert!(slots.get_attr.is_none());
    }

    #[test]
    fn test_supported_opcodes_nonempty() {
        let backend = TemplateBackend::new();
        let ops = backend.supported_opcodes();
        assert_eq!(ops.len(), SUPPORTED_OPCODE_COUNT as usize);
        assert!(ops.contains(&0));
    }

    #[test]
    fn test_release_references_resets_arena() {
        let backend = TemplateBackend::with_code_area_size(4096);
        let func = make_func(vec![1], 0);
        backend.compile(&func).unwrap();
        assert!(backend.code_area_used() > 0);

        backend.release_references();
        assert_eq!(backend.code_area_used(), 0);
    }
}
