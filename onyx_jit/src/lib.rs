//! JIT controller and batch compilation engine for the Onyx runtime.
//!
//! This crate is the control plane of the JIT: it decides which functions
//! are eligible for native compilation, drives their compilation exactly
//! once, compiles many of them in parallel underneath the host's global
//! lock, and exposes the introspection surface tests and tools observe
//! compilations through.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                         Controller                            │
//! │  lifecycle · registration set · eligibility · compile driving │
//! ├──────────────┬──────────────────┬─────────────────────────────┤
//! │   JitList    │  CompileContext  │   ThreadedCompileContext    │
//! │ (allow-list) │ backend + records│  queue · retries · scope    │
//! ├──────────────┴──────────────────┴─────────────────────────────┤
//! │           CompilerBackend (HIR/LIR/encoding seam)             │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! The embedder drives the singleton through the free functions below
//! ([`initialize`], [`register_function`], [`compile_function`], ...);
//! user code observes it through [`introspect`]. Generators compiled by
//! the JIT resume through [`gen`].

#![deny(unsafe_op_in_unsafe_fn)]

pub mod backend;
pub mod config;
pub mod context;
pub mod controller;
pub mod gen;
pub mod introspect;
pub mod jit_list;
pub mod log;
pub mod perf;
pub mod threaded_compile;
pub mod timer;

use std::sync::OnceLock;

use onyx_core::JitResult;
use onyx_runtime::{FuncRef, TypeRef};

pub use backend::{
    BackendError, CompiledArtifact, CompilerBackend, NativeEntry, TemplateBackend, TypeSlots,
};
pub use config::{FrameMode, InitState, JitConfig, JitOptions};
pub use context::{CompilationRecord, CompileContext, CompileResult};
pub use controller::{Controller, MAX_COMPILE_DEPTH};
pub use jit_list::JitList;
pub use threaded_compile::{ThreadedCompileContext, ThreadedCompileSerialize};
pub use timer::{CompilationTimer, TimingStats};

/// The process-wide controller.
///
/// The controller mediates a single host runtime, so exactly one exists;
/// the embedder surface below and [`introspect`] both go through this
/// accessor. Constructing separate [`Controller`] values is reserved for
/// tests.
pub fn controller() -> &'static Controller {
    static CONTROLLER: OnceLock<Controller> = OnceLock::new();
    CONTROLLER.get_or_init(Controller::new)
}

// =============================================================================
// Embedder surface
// =============================================================================

/// Initialize the JIT from resolved options. Idempotent.
pub fn initialize(opts: &JitOptions) -> JitResult<()> {
    controller().initialize(opts)
}

/// Tear the JIT down, releasing backend resources.
pub fn finalize() -> JitResult<()> {
    controller().finalize()
}

/// Re-enable compilation after a [`disable`].
pub fn enable() {
    controller().enable()
}

/// Stop accepting and performing new compilations. Pending functions are
/// left registered; use [`introspect::disable`] to drain first.
pub fn disable() {
    controller().disable(false)
}

/// Is the JIT initialized and enabled?
pub fn is_enabled() -> bool {
    controller().is_enabled()
}

/// Register a function for future compilation. True iff inserted.
pub fn register_function(func: &FuncRef) -> bool {
    controller().register_function(func)
}

/// Remove a destroyed function from the registration set.
pub fn unregister_function(func: &FuncRef) {
    controller().unregister_function(func)
}

/// Does `func` have native code installed by this JIT?
pub fn is_compiled(func: &FuncRef) -> bool {
    controller().is_compiled(func)
}

/// Compile a single function on the calling thread.
pub fn compile_function(func: &FuncRef) -> CompileResult {
    controller().compile_function(func)
}

/// Install specialized dispatch slots on a type.
pub fn specialize_type(ty: &TypeRef, slots: &mut TypeSlots) -> CompileResult {
    controller().specialize_type(ty, slots)
}

/// Are type-slot specializations enabled?
pub fn are_type_slots_enabled() -> bool {
    controller().are_type_slots_enabled()
}

/// Turn type-slot specialization back on. False unless the JIT is enabled.
pub fn enable_type_slots() -> bool {
    controller().enable_type_slots()
}

/// Re-initialize per-process sampling state in a forked child.
pub fn after_fork_child() {
    perf::after_fork_child()
}
