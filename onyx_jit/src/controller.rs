//! The JIT controller: lifecycle, registration and compilation driving.
//!
//! The controller is the decision-maker of the JIT: it knows whether the
//! JIT is up, which functions are waiting to be compiled, and how to get
//! them compiled, either one at a time on the calling thread or all at once
//! across a cohort of batch workers that share the host's global lock.
//!
//! # Lifecycle
//!
//! `Uninitialized -> Initialized -> Finalized`, driven by
//! [`Controller::initialize`] and [`Controller::finalize`]. A failed or
//! declined initialization leaves no partial state behind. The orthogonal
//! `enabled` flag can be toggled while initialized without tearing
//! anything down.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use onyx_core::{JitError, JitResult};
use onyx_runtime::{CodeId, FuncId, FuncRef, OwnerCheckSuspension, TypeRef};
use parking_lot::{Mutex, RwLock};
use rustc_hash::FxHashMap;
use smallvec::SmallVec;
use tracing::{debug, info, warn};

use crate::backend::{CompilerBackend, TemplateBackend, TypeSlots};
use crate::config::{resolve_options, FrameMode, InitState, JitConfig, JitOptions};
use crate::context::{CompileContext, CompileResult};
use crate::jit_list::JitList;
use crate::threaded_compile::ThreadedCompileContext;
use crate::timer::{CompilationTimer, TimingStats};
use crate::{log, perf};

/// Maximum depth of the active-compile stack. A compile request that
/// would exceed it (or that finds its own code already on the stack)
/// fails instead of recursing further.
pub const MAX_COMPILE_DEPTH: usize = 10;

// =============================================================================
// Controller
// =============================================================================

/// The JIT control plane.
///
/// The embedder talks to the process singleton (see [`crate::controller`]);
/// constructing additional instances is reserved for tests.
pub struct Controller {
    config: RwLock<JitConfig>,
    jit_list: RwLock<Option<JitList>>,
    context: RwLock<Option<Arc<CompileContext>>>,
    threaded: Arc<ThreadedCompileContext>,
    registry: Mutex<FxHashMap<FuncId, FuncRef>>,
    test_multithreaded_funcs: Mutex<Vec<FuncRef>>,
    timing: TimingStats,
    active_compiles: Mutex<SmallVec<[CodeId; MAX_COMPILE_DEPTH]>>,
    workers_attempted: AtomicU64,
    workers_retried: AtomicU64,
}

impl Controller {
    /// A controller in the `Uninitialized` state.
    pub fn new() -> Self {
        Self {
            config: RwLock::new(JitConfig::default()),
            jit_list: RwLock::new(None),
            context: RwLock::new(None),
            threaded: Arc::new(ThreadedCompileContext::new()),
            registry: Mutex::new(FxHashMap::default()),
            test_multithreaded_funcs: Mutex::new(Vec::new()),
            timing: TimingStats::new(),
            active_compiles: Mutex::new(SmallVec::new()),
            workers_attempted: AtomicU64::new(0),
            workers_retried: AtomicU64::new(0),
        }
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    /// Initialize the JIT from resolved options, using the default backend.
    pub fn initialize(&self, opts: &JitOptions) -> JitResult<()> {
        self.initialize_with_backend(opts, Box::new(TemplateBackend::new()))
    }

    /// Initialize the JIT with an explicit backend.
    ///
    /// Idempotent while initialized, and a no-op once finalized. A
    /// declined startup (JIT not enabled, or jit-list parse failure)
    /// returns success and leaves the controller `Uninitialized` with no
    /// partial state observable.
    pub fn initialize_with_backend(
        &self,
        opts: &JitOptions,
        backend: Box<dyn CompilerBackend>,
    ) -> JitResult<()> {
        if self.config.read().init_state != InitState::Uninitialized {
            return Ok(());
        }

        let resolved = resolve_options(opts);
        log::init(resolved.log_file.as_deref(), resolved.config.debug);

        let mut jit_list = None;
        if let Some(path) = &resolved.jit_list_path {
            let mut list = if resolved.config.allow_jit_list_wildcards {
                JitList::with_wildcards()
            } else {
                JitList::new()
            };
            if let Err(err) = list.parse_file(path) {
                warn!(%err, "could not parse jit-list, disabling JIT");
                return Ok(());
            }
            jit_list = Some(list);
        }

        if !resolved.use_jit {
            return Ok(());
        }
        debug!("enabling JIT");

        let mut config = resolved.config;
        config.init_state = InitState::Initialized;
        config.enabled = true;

        let context = CompileContext::new(backend, Arc::clone(&self.threaded), &config);
        *self.context.write() = Some(Arc::new(context));
        *self.jit_list.write() = jit_list;
        *self.config.write() = config;
        self.timing.reset();
        perf::init();
        Ok(())
    }

    /// Tear the JIT down, releasing backend resources.
    ///
    /// A no-op (that still releases backend-held references) when the
    /// controller never initialized or already finalized.
    pub fn finalize(&self) -> JitResult<()> {
        // Backend-held references are released unconditionally: the
        // embedder may have driven the backend without a full controller
        // bring-up.
        if let Some(ctx) = self.context() {
            ctx.release_references();
        }

        if self.config.read().init_state != InitState::Initialized {
            return Ok(());
        }

        *self.jit_list.write() = None;
        self.config.write().init_state = InitState::Finalized;

        let ctx = self.context.write().take();
        assert!(ctx.is_some(), "compile context missing at finalize");

        self.registry.lock().clear();
        self.test_multithreaded_funcs.lock().clear();
        Ok(())
    }

    /// Is the controller initialized and enabled?
    pub fn is_enabled(&self) -> bool {
        let config = self.config.read();
        config.init_state == InitState::Initialized && config.enabled
    }

    /// Is the controller initialized?
    pub fn is_initialized(&self) -> bool {
        self.config.read().init_state == InitState::Initialized
    }

    /// Re-enable compilation. A no-op unless initialized.
    pub fn enable(&self) {
        let mut config = self.config.write();
        if config.init_state == InitState::Initialized {
            config.enabled = true;
        }
    }

    /// Stop accepting and performing new compilations.
    ///
    /// With `drain` set, everything still pending is compiled first:
    /// through the batch engine when workers are configured, serially
    /// otherwise.
    pub fn disable(&self, drain: bool) {
        if drain && self.is_initialized() {
            let workers = self.config.read().batch_compile_workers;
            if workers > 0 {
                self.batch_compile_all(workers);
            } else {
                self.compile_all_pending();
            }
        }
        let mut config = self.config.write();
        config.enabled = false;
        config.type_slots_enabled = false;
    }

    /// Are type-slot specializations enabled?
    pub fn are_type_slots_enabled(&self) -> bool {
        let config = self.config.read();
        config.init_state == InitState::Initialized && config.type_slots_enabled
    }

    /// Turn type-slot specialization back on. Fails (returns false)
    /// unless the JIT is enabled.
    pub fn enable_type_slots(&self) -> bool {
        if !self.is_enabled() {
            return false;
        }
        self.config.write().type_slots_enabled = true;
        true
    }

    /// The frame mode frozen at initialization.
    pub fn frame_mode(&self) -> FrameMode {
        self.config.read().frame_mode
    }

    /// A copy of the frozen configuration.
    pub fn config(&self) -> JitConfig {
        self.config.read().clone()
    }

    // =========================================================================
    // Eligibility and registration
    // =========================================================================

    /// Is `func` eligible for compilation?
    ///
    /// Accepts everything when no jit-list is loaded, and
    /// statically-compiled functions when `jit-all-static-functions` is
    /// set; otherwise defers to the list.
    pub fn on_jit_list(&self, func: &FuncRef) -> bool {
        let list = self.jit_list.read();
        let Some(list) = &*list else {
            return true;
        };
        if func.code().is_statically_compiled()
            && self.config.read().compile_all_static_functions
        {
            return true;
        }
        list.lookup(func.module(), func.qualname())
    }

    /// Register a function for future compilation.
    ///
    /// Returns true only when the function was actually inserted: the JIT
    /// must be enabled and the function on the jit-list.
    pub fn register_function(&self, func: &FuncRef) -> bool {
        if self.is_enabled() && self.on_jit_list(func) {
            if self.config.read().test_multithreaded_compile {
                self.test_multithreaded_funcs.lock().push(Arc::clone(func));
            }
            self.registry.lock().insert(FuncId::of(func), Arc::clone(func));
            return true;
        }
        false
    }

    /// Drop a function from the registration set. Called when the host
    /// destroys the function.
    pub fn unregister_function(&self, func: &FuncRef) {
        if self.is_enabled() {
            self.registry.lock().remove(&FuncId::of(func));
        }
    }

    /// Is `func` awaiting compilation?
    pub fn is_registered(&self, func: &FuncRef) -> bool {
        self.registry.lock().contains_key(&FuncId::of(func))
    }

    /// Snapshot of the registration set.
    pub fn pending_functions(&self) -> Vec<FuncRef> {
        self.registry.lock().values().cloned().collect()
    }

    /// Number of functions awaiting compilation.
    pub fn pending_count(&self) -> usize {
        self.registry.lock().len()
    }

    // =========================================================================
    // Compilation
    // =========================================================================

    /// Does `func` have native code installed by this controller?
    pub fn is_compiled(&self, func: &FuncRef) -> bool {
        match self.context() {
            Some(ctx) => ctx.did_compile(func),
            None => false,
        }
    }

    /// Compile a single function on the calling thread.
    ///
    /// Idempotent: an already-compiled function reports `Ok` without
    /// touching the backend. Safe to call re-entrantly from a backend;
    /// a recursive inline chain is cut off by the active-compile stack.
    pub fn compile_function(&self, func: &FuncRef) -> CompileResult {
        // We might have been called re-entrantly from a batch worker.
        let _serialized = self.threaded.serialize();

        let Some(ctx) = self.context() else {
            return CompileResult::NotInitialized;
        };
        // The list of conditions here must stay in sync with
        // compile_worker().
        if ctx.did_compile(func) {
            return CompileResult::Ok;
        }
        if !self.on_jit_list(func) {
            return CompileResult::CannotSpecialize;
        }

        let _timer = CompilationTimer::new(&self.timing, FuncId::of(func));

        // Don't attempt the compilation if there are already too many
        // active compilations or this function's code is one of them.
        let code_id = CodeId::of(func.code());
        {
            let active = self.active_compiles.lock();
            if active.len() == MAX_COMPILE_DEPTH || active.contains(&code_id) {
                return CompileResult::UnknownError;
            }
        }

        self.registry.lock().remove(&FuncId::of(func));
        self.active_compiles.lock().push(code_id);
        let result = ctx.compile(func);
        self.active_compiles.lock().pop();
        result
    }

    /// Compile a registered function on demand.
    ///
    /// Returns true iff the function was pending; unregistered functions
    /// are left alone.
    pub fn force_compile(&self, func: &FuncRef) -> bool {
        if self.is_registered(func) {
            self.compile_function(func);
            return true;
        }
        false
    }

    /// Serially compile everything in the registration set.
    pub fn compile_all_pending(&self) {
        for func in self.pending_functions() {
            self.compile_function(&func);
        }
    }

    /// Compile everything in the registration set across `workers`
    /// parallel threads.
    ///
    /// The worker cohort holds the host's global lock collectively: its
    /// single-owner check is suspended for the duration and the cohort
    /// serializes its own writes through the threaded-compile scope.
    /// Functions whose backend asked for a retry are re-attempted
    /// serially after the workers join.
    pub fn batch_compile_all(&self, workers: usize) {
        assert!(self.context().is_some(), "JIT not initialized");
        assert!(workers > 0, "zero workers for batch compile");

        let _owner_check = OwnerCheckSuspension::begin();

        let work: Vec<FuncRef> = {
            let mut registry = self.registry.lock();
            let snapshot = registry.values().cloned().collect();
            registry.clear();
            snapshot
        };
        self.threaded.start_compile(work);

        std::thread::scope(|scope| {
            // Hold the serialization scope while creating threads: the
            // host's thread-creation hook may itself run host code.
            let _guard = self.threaded.serialize();
            for i in 0..workers {
                std::thread::Builder::new()
                    .name(format!("onyx-jit-worker-{}", i))
                    .spawn_scoped(scope, || self.compile_worker())
                    .expect("failed to spawn JIT compile worker");
            }
        });

        let retry_list = self.threaded.end_compile();
        for func in retry_list {
            self.compile_function(&func);
        }
    }

    fn compile_worker(&self) {
        debug!(thread = ?std::thread::current().id(), "started compile worker");
        let Some(ctx) = self.context() else {
            return;
        };
        while let Some(func) = self.threaded.next_function() {
            let _timer = CompilationTimer::new(&self.timing, FuncId::of(&func));
            {
                // The list of conditions here must stay in sync with
                // compile_function().
                let _serialized = self.threaded.serialize();
                let test_mode = self.config.read().test_multithreaded_compile;
                if (!test_mode && ctx.did_compile(&func)) || !self.on_jit_list(&func) {
                    continue;
                }
            }
            self.workers_attempted.fetch_add(1, Ordering::Relaxed);
            if ctx.compile(&func) == CompileResult::Retry {
                let _serialized = self.threaded.serialize();
                self.workers_retried.fetch_add(1, Ordering::Relaxed);
                info!(func = %func.full_name(), "retrying compile");
                self.threaded.retry_function(func);
            }
        }
        debug!(thread = ?std::thread::current().id(), "finished compile worker");
    }

    /// Force a multi-threaded recompile of the side list captured in
    /// test-multithreaded mode, restoring the registration set afterwards.
    pub fn test_multithreaded_compile(&self) -> JitResult<()> {
        let (test_mode, workers) = {
            let config = self.config.read();
            (
                config.test_multithreaded_compile,
                config.batch_compile_workers,
            )
        };
        if !test_mode {
            return Err(JitError::ConfigInvalidValue {
                option: "jit-test-multithreaded-compile".into(),
                value: "0".into(),
            });
        }

        let saved = std::mem::take(&mut *self.registry.lock());
        {
            let mut registry = self.registry.lock();
            for func in self.test_multithreaded_funcs.lock().iter() {
                registry.insert(FuncId::of(func), Arc::clone(func));
            }
        }
        self.workers_attempted.store(0, Ordering::Relaxed);
        self.workers_retried.store(0, Ordering::Relaxed);
        info!(
            functions = self.registry.lock().len(),
            "(re)compiling registered functions"
        );

        let start = Instant::now();
        self.batch_compile_all(workers);
        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            attempted = self.workers_attempted.load(Ordering::Relaxed),
            retried = self.workers_retried.load(Ordering::Relaxed),
            "multithreaded compile finished"
        );

        *self.registry.lock() = saved;
        self.test_multithreaded_funcs.lock().clear();
        Ok(())
    }

    /// Install specialized dispatch slots on a type.
    pub fn specialize_type(&self, ty: &TypeRef, slots: &mut TypeSlots) -> CompileResult {
        match self.context() {
            Some(ctx) => ctx.specialize_type(ty, slots),
            None => CompileResult::NotInitialized,
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// The active compile context, if initialized.
    pub fn context(&self) -> Option<Arc<CompileContext>> {
        self.context.read().clone()
    }

    /// The loaded jit-list rendered as `(module, qualnames)` pairs.
    pub fn jit_list_entries(&self) -> Option<Vec<(String, Vec<String>)>> {
        self.jit_list.read().as_ref().map(JitList::entries)
    }

    /// Accumulated compilation timing.
    pub fn timing(&self) -> &TimingStats {
        &self.timing
    }

    /// Batch-worker compile attempts since the last reset.
    pub fn workers_attempted(&self) -> u64 {
        self.workers_attempted.load(Ordering::Relaxed)
    }

    /// Batch-worker retries since the last reset.
    pub fn workers_retried(&self) -> u64 {
        self.workers_retried.load(Ordering::Relaxed)
    }
}

impl Default for Controller {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use onyx_runtime::{CodeObject, Function};

    fn make_func(module: &str, qualname: &str) -> FuncRef {
        Function::new(module, qualname, CodeObject::new(qualname, vec![1, 2]))
    }

    fn initialized_controller() -> Controller {
        let controller = Controller::new();
        controller
            .initialize(&JitOptions::new().with_flag("jit"))
            .unwrap();
        controller
    }

    #[test]
    fn test_uninitialized_state() {
        let controller = Controller::new();
        assert!(!controller.is_enabled());
        assert!(!controller.is_initialized());
        assert!(!controller.are_type_slots_enabled());
        assert_eq!(
            controller.compile_function(&make_func("m", "f")),
            CompileResult::NotInitialized
        );
    }

    #[test]
    fn test_initialize_without_jit_flag_declines() {
        let controller = Controller::new();
        controller.initialize(&JitOptions::new()).unwrap();
        assert!(!controller.is_initialized());
    }

    #[test]
    fn test_initialize_is_idempotent() {
        let controller = initialized_controller();
        assert!(controller.is_enabled());
        controller
            .initialize(&JitOptions::new().with_flag("jit"))
            .unwrap();
        assert!(controller.is_enabled());
    }

    #[test]
    fn test_register_requires_enabled() {
        let controller = Controller::new();
        let func = make_func("m", "f");
        assert!(!controller.register_function(&func));
        assert_eq!(controller.pending_count(), 0);

        let controller = initialized_controller();
        assert!(controller.register_function(&func));
        assert!(controller.is_registered(&func));
    }

    #[test]
    fn test_register_unregister_roundtrip() {
        let controller = initialized_controller();
        let func = make_func("m", "f");

        controller.register_function(&func);
        controller.unregister_function(&func);
        assert!(!controller.is_registered(&func));
        assert_eq!(controller.pending_count(), 0);
    }

    #[test]
    fn test_compile_function_is_idempotent() {
        let controller = initialized_controller();
        let func = make_func("m", "f");

        assert_eq!(controller.compile_function(&func), CompileResult::Ok);
        assert!(controller.is_compiled(&func));
        assert!(func.has_native_entry());
        assert_eq!(controller.compile_function(&func), CompileResult::Ok);
    }

    #[test]
    fn test_enable_disable_toggles() {
        let controller = initialized_controller();
        assert!(controller.is_enabled());
        assert!(controller.are_type_slots_enabled());

        controller.disable(false);
        assert!(!controller.is_enabled());
        assert!(!controller.are_type_slots_enabled());

        controller.enable();
        assert!(controller.is_enabled());
        assert!(controller.enable_type_slots());
        assert!(controller.are_type_slots_enabled());
    }

    #[test]
    fn test_enable_type_slots_requires_enabled() {
        let controller = initialized_controller();
        controller.disable(false);
        assert!(!controller.enable_type_slots());
    }

    #[test]
    fn test_finalize_clears_state() {
        let controller = initialized_controller();
        let func = make_func("m", "f");
        controller.register_function(&func);
        controller.compile_function(&func);

        controller.finalize().unwrap();
        assert!(!controller.is_enabled());
        assert!(!controller.is_initialized());
        assert!(controller.context().is_none());
        assert_eq!(controller.pending_count(), 0);
        assert!(!controller.is_compiled(&func));

        // Finalize twice is fine; re-initialize is declined once finalized.
        controller.finalize().unwrap();
        controller
            .initialize(&JitOptions::new().with_flag("jit"))
            .unwrap();
        assert!(!controller.is_enabled());
    }

    #[test]
    fn test_compile_all_pending_drains() {
        let controller = initialized_controller();
        let funcs: Vec<FuncRef> = (0..3).map(|i| make_func("m", &format!("f{}", i))).collect();
        for func in &funcs {
            controller.register_function(func);
        }

        controller.compile_all_pending();
        assert_eq!(controller.pending_count(), 0);
        for func in &funcs {
            assert!(controller.is_compiled(func));
        }
    }

    #[test]
    fn test_specialize_type() {
        let controller = initialized_controller();
        let ty = onyx_runtime::TypeObject::new("list");
        let mut slots = TypeSlots::default();
        assert_eq!(
            controller.specialize_type(&ty, &mut slots),
            CompileResult::Ok
        );
        assert!(slots.call.is_some());
    }

    #[test]
    fn test_frame_mode_default() {
        let controller = initialized_controller();
        assert_eq!(controller.frame_mode(), FrameMode::Normal);
    }
}
