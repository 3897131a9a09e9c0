//! Host-callable introspection surface.
//!
//! The operations below are exported to user code as the `onyxjit`
//! module. They observe (and in a few cases drive) the process-wide
//! controller; after finalization every query degrades to zero, empty or
//! `None` rather than erroring.

use onyx_core::JitResult;
use onyx_runtime::FuncRef;
use rustc_hash::FxHashSet;

use crate::controller;

/// Disable the JIT, first compiling everything pending when `drain` is
/// set (the default in the host binding).
pub fn disable(drain: bool) {
    controller().disable(drain);
}

/// Has this function been JIT-compiled?
pub fn is_jit_compiled(func: &FuncRef) -> bool {
    controller().is_compiled(func)
}

/// Compile a registered function right now.
///
/// Returns true iff the function was pending compilation.
pub fn force_compile(func: &FuncRef) -> bool {
    controller().force_compile(func)
}

/// Textual HIR of a compiled function. Errors when not compiled.
pub fn print_hir(func: &FuncRef) -> JitResult<String> {
    match controller().context() {
        Some(ctx) => ctx.print_hir(func),
        None => Err(onyx_core::JitError::NotInitialized),
    }
}

/// Disassembly of a compiled function. Errors when not compiled.
pub fn disassemble(func: &FuncRef) -> JitResult<String> {
    match controller().context() {
        Some(ctx) => ctx.disassemble(func),
        None => Err(onyx_core::JitError::NotInitialized),
    }
}

/// The frame mode frozen at initialization:
/// 0 = normal frames, 1 = tiny frames, 2 = no frames.
pub fn jit_frame_mode() -> u8 {
    if !controller().is_initialized() {
        return 0;
    }
    controller().frame_mode() as u8
}

/// The loaded jit-list as `(module, sorted qualnames)` pairs, or `None`
/// when no list is loaded.
pub fn get_jit_list() -> Option<Vec<(String, Vec<String>)>> {
    controller().jit_list_entries()
}

/// Every function currently JIT-compiled.
pub fn get_compiled_functions() -> Vec<FuncRef> {
    match controller().context() {
        Some(ctx) => ctx.compiled_functions(),
        None => Vec::new(),
    }
}

/// Total wall-clock time spent compiling, in milliseconds.
pub fn get_compilation_time() -> u64 {
    if !controller().is_initialized() {
        return 0;
    }
    controller().timing().total().as_millis() as u64
}

/// Wall-clock time spent compiling one function, in milliseconds.
pub fn get_function_compilation_time(func: &FuncRef) -> Option<u64> {
    if !controller().is_initialized() {
        return None;
    }
    controller()
        .timing()
        .function_time(onyx_runtime::FuncId::of(func))
        .map(|d| d.as_millis() as u64)
}

/// Code size in bytes of a compiled function (0 when not compiled).
pub fn get_compiled_size(func: &FuncRef) -> usize {
    controller()
        .context()
        .and_then(|ctx| ctx.code_size(func))
        .unwrap_or(0)
}

/// Stack frame size in bytes of a compiled function (0 when not compiled).
pub fn get_compiled_stack_size(func: &FuncRef) -> usize {
    controller()
        .context()
        .and_then(|ctx| ctx.stack_size(func))
        .unwrap_or(0)
}

/// Spill area size in bytes of a compiled function (0 when not compiled).
pub fn get_compiled_spill_stack_size(func: &FuncRef) -> usize {
    controller()
        .context()
        .and_then(|ctx| ctx.spill_stack_size(func))
        .unwrap_or(0)
}

/// The set of bytecode opcodes the backend can lower.
pub fn get_supported_opcodes() -> FxHashSet<u32> {
    match controller().context() {
        Some(ctx) => ctx.supported_opcodes().into_iter().collect(),
        None => FxHashSet::default(),
    }
}

/// Decorator: force a function to always get a full frame when compiled.
/// Returns the function for decorator chaining.
pub fn jit_force_normal_frame(func: &FuncRef) -> FuncRef {
    func.code().add_flags(onyx_runtime::CodeFlags::NORMAL_FRAME);
    func.clone()
}

/// Force a multi-threaded recompile of still-registered functions.
/// Errors unless test-multithreaded mode is configured.
pub fn test_multithreaded_compile() -> JitResult<()> {
    controller().test_multithreaded_compile()
}

/// Is test-multithreaded mode configured?
pub fn is_test_multithreaded_compile_enabled() -> bool {
    controller().config().test_multithreaded_compile
}
