//! Function and code objects.
//!
//! A [`Function`] is the unit of JIT registration and compilation. Identity
//! is by pointer: two handles refer to the same function iff their `Arc`s
//! share an allocation, so [`FuncId`] and [`CodeId`] are derived from the
//! `Arc` address the same way the code cache keys compiled entries.
//!
//! The native dispatch slot is a single atomic pointer: null means the
//! interpreter owns dispatch, non-null means calls enter JIT-emitted code.
//! Installation is a release store so a caller that observes the entry also
//! observes the code behind it.

use std::sync::atomic::{AtomicPtr, AtomicU32, Ordering};
use std::sync::Arc;

use onyx_core::Value;

// =============================================================================
// Code flags
// =============================================================================

/// Bit flags carried on a code object and observable to the JIT.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CodeFlags(pub u32);

impl CodeFlags {
    /// No flags set.
    pub const NONE: Self = Self(0);
    /// The function was statically compiled ahead of time and is amenable
    /// to aggressive compilation.
    pub const STATICALLY_COMPILED: Self = Self(1 << 0);
    /// The function must always be given a full interpreter frame,
    /// overriding frame elision.
    pub const NORMAL_FRAME: Self = Self(1 << 1);

    /// Check whether all bits of `other` are set.
    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// Union of two flag sets.
    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }
}

// =============================================================================
// Code object
// =============================================================================

/// An immutable bytecode payload plus its constant pool.
///
/// Flags live in an atomic because the `jit_force_normal_frame` decorator
/// mutates them through a shared handle.
#[derive(Debug)]
pub struct CodeObject {
    /// Unqualified name of the code unit.
    pub name: Arc<str>,
    /// Raw bytecode stream.
    pub bytecode: Box<[u8]>,
    /// Constant pool.
    pub consts: Box<[Value]>,
    /// Number of virtual registers the code uses.
    pub register_count: u16,
    flags: AtomicU32,
}

impl CodeObject {
    /// Create a code object with the given name and bytecode.
    pub fn new(name: &str, bytecode: Vec<u8>) -> Arc<Self> {
        Arc::new(Self {
            name: Arc::from(name),
            bytecode: bytecode.into_boxed_slice(),
            consts: Box::new([]),
            register_count: 0,
            flags: AtomicU32::new(0),
        })
    }

    /// Create a code object with explicit flags and register count.
    pub fn with_details(
        name: &str,
        bytecode: Vec<u8>,
        register_count: u16,
        flags: CodeFlags,
    ) -> Arc<Self> {
        Arc::new(Self {
            name: Arc::from(name),
            bytecode: bytecode.into_boxed_slice(),
            consts: Box::new([]),
            register_count,
            flags: AtomicU32::new(flags.0),
        })
    }

    /// Current flag set.
    #[inline]
    pub fn flags(&self) -> CodeFlags {
        CodeFlags(self.flags.load(Ordering::Acquire))
    }

    /// Set the given flags (or-ed into the existing set).
    pub fn add_flags(&self, flags: CodeFlags) {
        self.flags.fetch_or(flags.0, Ordering::AcqRel);
    }

    /// Was this code statically compiled?
    #[inline]
    pub fn is_statically_compiled(&self) -> bool {
        self.flags().contains(CodeFlags::STATICALLY_COMPILED)
    }

    /// Must this code always get a full frame?
    #[inline]
    pub fn is_normal_frame_required(&self) -> bool {
        self.flags().contains(CodeFlags::NORMAL_FRAME)
    }
}

/// Identity of a code object, derived from its `Arc` address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CodeId(usize);

impl CodeId {
    /// Identity of the given code object.
    #[inline]
    pub fn of(code: &Arc<CodeObject>) -> Self {
        Self(Arc::as_ptr(code) as usize)
    }
}

// =============================================================================
// Function object
// =============================================================================

/// Shared handle to a function object.
pub type FuncRef = Arc<Function>;

/// Identity of a function, derived from its `Arc` address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FuncId(usize);

impl FuncId {
    /// Identity of the given function handle.
    #[inline]
    pub fn of(func: &FuncRef) -> Self {
        Self(Arc::as_ptr(func) as usize)
    }
}

/// A host function object.
pub struct Function {
    module: Arc<str>,
    qualname: Arc<str>,
    code: Arc<CodeObject>,
    /// Native dispatch slot; null while the interpreter owns dispatch.
    entry: AtomicPtr<u8>,
}

impl Function {
    /// Create a function handle for `module.qualname` over the given code.
    pub fn new(module: &str, qualname: &str, code: Arc<CodeObject>) -> FuncRef {
        Arc::new(Self {
            module: Arc::from(module),
            qualname: Arc::from(qualname),
            code,
            entry: AtomicPtr::new(std::ptr::null_mut()),
        })
    }

    /// Module the function was defined in.
    #[inline]
    pub fn module(&self) -> &str {
        &self.module
    }

    /// Qualified name within the module.
    #[inline]
    pub fn qualname(&self) -> &str {
        &self.qualname
    }

    /// The underlying code object.
    #[inline]
    pub fn code(&self) -> &Arc<CodeObject> {
        &self.code
    }

    /// `module:qualname`, the form used in logs and jit-list files.
    pub fn full_name(&self) -> String {
        format!("{}:{}", self.module, self.qualname)
    }

    /// Install a native entry point, atomically taking over dispatch.
    #[inline]
    pub fn install_entry(&self, entry: *const u8) {
        self.entry.store(entry as *mut u8, Ordering::Release);
    }

    /// Current native entry, or null if the interpreter owns dispatch.
    #[inline]
    pub fn entry(&self) -> *const u8 {
        self.entry.load(Ordering::Acquire)
    }

    /// Does dispatch currently target native code?
    #[inline]
    pub fn has_native_entry(&self) -> bool {
        !self.entry().is_null()
    }

    /// Reset dispatch back to the interpreter.
    pub fn clear_entry(&self) {
        self.entry.store(std::ptr::null_mut(), Ordering::Release);
    }
}

impl std::fmt::Debug for Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Function")
            .field("module", &self.module)
            .field("qualname", &self.qualname)
            .field("native", &self.has_native_entry())
            .finish()
    }
}
