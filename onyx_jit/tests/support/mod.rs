//! Shared test utilities for JIT integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use onyx_jit::{
    BackendError, CompiledArtifact, CompilerBackend, Controller, JitOptions, NativeEntry,
    TypeSlots,
};
use onyx_runtime::{CodeFlags, CodeObject, FuncId, FuncRef, Function, TypeRef};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

// =============================================================================
// Function builders
// =============================================================================

/// A function `module.qualname` over a small bytecode payload.
pub fn make_func(module: &str, qualname: &str) -> FuncRef {
    let code = CodeObject::with_details(qualname, vec![1, 2, 3, 4], 4, CodeFlags::NONE);
    Function::new(module, qualname, code)
}

/// A statically-compiled function.
pub fn make_static_func(module: &str, qualname: &str) -> FuncRef {
    let code = CodeObject::with_details(
        qualname,
        vec![1, 2, 3, 4],
        4,
        CodeFlags::STATICALLY_COMPILED,
    );
    Function::new(module, qualname, code)
}

/// Write a jit-list file with the given lines, returning its path.
pub fn write_jit_list(lines: &[&str]) -> PathBuf {
    static COUNTER: AtomicUsize = AtomicUsize::new(0);
    let path = std::env::temp_dir().join(format!(
        "onyx-jitlist-{}-{}.txt",
        std::process::id(),
        COUNTER.fetch_add(1, Ordering::Relaxed)
    ));
    std::fs::write(&path, lines.join("\n")).expect("failed to write jit-list");
    path
}

/// A leaked controller, usable from scoped worker threads and hooks.
pub fn leak_controller() -> &'static Controller {
    Box::leak(Box::new(Controller::new()))
}

/// A leaked controller initialized over a scripted backend.
pub fn scripted_controller(opts: JitOptions) -> (&'static Controller, Arc<ScriptedBackend>) {
    let controller = leak_controller();
    let backend = Arc::new(ScriptedBackend::new());
    controller
        .initialize_with_backend(&opts, Box::new(Arc::clone(&backend)))
        .expect("initialize failed");
    (controller, backend)
}

// =============================================================================
// Scripted backend
// =============================================================================

type CompileHook = Arc<dyn Fn(&FuncRef) + Send + Sync>;

/// A backend whose failures are scripted per function.
///
/// Each scripted failure is consumed once, in order; once the script for
/// a function runs dry, its compiles succeed. A compile hook can be
/// installed to re-enter the controller mid-compilation.
pub struct ScriptedBackend {
    scripted: Mutex<FxHashMap<FuncId, VecDeque<BackendError>>>,
    invocations: Mutex<FxHashMap<FuncId, usize>>,
    total_invocations: AtomicUsize,
    hook: Mutex<Option<CompileHook>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self {
            scripted: Mutex::new(FxHashMap::default()),
            invocations: Mutex::new(FxHashMap::default()),
            total_invocations: AtomicUsize::new(0),
            hook: Mutex::new(None),
        }
    }

    /// Queue a failure for the next compile of `func`.
    pub fn script_failure(&self, func: &FuncRef, err: BackendError) {
        self.scripted
            .lock()
            .entry(FuncId::of(func))
            .or_default()
            .push_back(err);
    }

    /// Install a hook invoked at the start of every compile.
    pub fn set_compile_hook(&self, hook: impl Fn(&FuncRef) + Send + Sync + 'static) {
        *self.hook.lock() = Some(Arc::new(hook));
    }

    /// Number of backend invocations for `func`.
    pub fn invocations(&self, func: &FuncRef) -> usize {
        self.invocations
            .lock()
            .get(&FuncId::of(func))
            .copied()
            .unwrap_or(0)
    }

    /// Number of backend invocations across all functions.
    pub fn total_invocations(&self) -> usize {
        self.total_invocations.load(Ordering::Relaxed)
    }

    fn fabricate_entry() -> NativeEntry {
        let stub: &'static mut [u8; 16] = Box::leak(Box::new([0xCC; 16]));
        NativeEntry::new(stub.as_ptr())
    }
}

impl CompilerBackend for ScriptedBackend {
    fn compile(&self, func: &FuncRef) -> Result<CompiledArtifact, BackendError> {
        self.total_invocations.fetch_add(1, Ordering::Relaxed);
        *self.invocations.lock().entry(FuncId::of(func)).or_insert(0) += 1;

        // Clone the hook out so a re-entrant compile can take it again.
        let hook = self.hook.lock().clone();
        if let Some(hook) = hook {
            hook(func);
        }

        if let Some(err) = self
            .scripted
            .lock()
            .get_mut(&FuncId::of(func))
            .and_then(VecDeque::pop_front)
        {
            return Err(err);
        }

        let bytecode_len = func.code().bytecode.len();
        Ok(CompiledArtifact {
            entry: Self::fabricate_entry(),
            code_size: 16 + 4 * bytecode_len,
            stack_size: 128,
            spill_stack_size: 16,
            hir_dump: Some(format!("fn {} {{}}\n", func.full_name())),
            disassembly: Some("0x0: cc  int3\n".to_owned()),
        })
    }

    fn specialize_type(&self, _ty: &TypeRef, slots: &mut TypeSlots) -> Result<(), BackendError> {
        slots.call = Some(Self::fabricate_entry());
        Ok(())
    }

    fn supported_opcodes(&self) -> Vec<u32> {
        vec![0, 1, 2, 3]
    }

    fn release_references(&self) {}
}
