//! JIT configuration and option resolution.
//!
//! All flags are resolved exactly once, during initialization. Each option
//! is looked up in order: explicit runtime option, environment variable,
//! built-in default. The environment variable for option `jit-foo-bar` is
//! `ONYXJITFOOBAR` (uppercased, dashes removed).
//!
//! The resolved [`JitConfig`] is frozen after init; the only later
//! mutations are the `enabled`/`type_slots_enabled` toggles.

use rustc_hash::FxHashMap;
use tracing::warn;

// =============================================================================
// Lifecycle and frame mode
// =============================================================================

/// Controller lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitState {
    /// Never initialized, or initialization declined (JIT off).
    Uninitialized,
    /// Fully initialized; compilations may proceed.
    Initialized,
    /// Shut down; all operations are no-ops or report `NotInitialized`.
    Finalized,
}

/// Which subset of per-call frame bookkeeping compiled code emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameMode {
    /// Full interpreter-compatible frames.
    Normal = 0,
    /// Minimal shim frames.
    Tiny = 1,
    /// No frames at all.
    None = 2,
}

// =============================================================================
// Runtime options
// =============================================================================

/// Explicit runtime options, as passed by the embedder.
///
/// An option is either a bare flag (`jit`) or carries a string value
/// (`jit-list-file=path`). Presence alone makes `is_set` true, matching
/// the host's `-X` option semantics.
#[derive(Debug, Clone, Default)]
pub struct JitOptions {
    values: FxHashMap<String, Option<String>>,
}

impl JitOptions {
    /// No options set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a bare flag.
    pub fn with_flag(mut self, name: &str) -> Self {
        self.values.insert(name.to_owned(), None);
        self
    }

    /// Set an option with a string value.
    pub fn with_value(mut self, name: &str, value: &str) -> Self {
        self.values.insert(name.to_owned(), Some(value.to_owned()));
        self
    }

    /// Was the option passed at all (with or without a value)?
    pub fn is_set(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }

    /// The option's string value, if one was passed.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.as_deref())
    }
}

/// Environment variable name for a given option:
/// `jit-foo-bar` becomes `ONYXJITFOOBAR`.
pub fn env_var_name(option: &str) -> String {
    let mut name = String::with_capacity(option.len() + 4);
    name.push_str("ONYX");
    for ch in option.chars() {
        if ch != '-' {
            name.push(ch.to_ascii_uppercase());
        }
    }
    name
}

// Is the env var set to a value other than "0" or ""?
fn env_truthy(option: &str) -> bool {
    match std::env::var(env_var_name(option)) {
        Ok(val) => !val.is_empty() && !val.starts_with('0'),
        Err(_) => false,
    }
}

fn env_string(option: &str) -> Option<String> {
    match std::env::var(env_var_name(option)) {
        Ok(val) if !val.is_empty() => Some(val),
        _ => None,
    }
}

/// Boolean flag: explicit option, else truthy environment variable.
pub(crate) fn flag_set(opts: &JitOptions, option: &str) -> bool {
    opts.is_set(option) || env_truthy(option)
}

/// String flag: explicit option value, else nonempty environment variable.
pub(crate) fn flag_string(opts: &JitOptions, option: &str) -> Option<String> {
    opts.get(option).map(str::to_owned).or_else(|| env_string(option))
}

/// Integer flag: parse the option value, then the environment variable.
/// Unparsable values are logged and fall through; never an abort.
pub(crate) fn flag_usize(opts: &JitOptions, option: &str, default: usize) -> usize {
    if let Some(val) = opts.get(option) {
        match val.parse::<usize>() {
            Ok(n) => return n,
            Err(_) => warn!(option, value = val, "invalid option value"),
        }
    }
    if let Some(val) = env_string(option) {
        match val.parse::<usize>() {
            Ok(n) => return n,
            Err(_) => warn!(option, value = %val, "invalid environment value"),
        }
    }
    default
}

/// Replace a `{pid}` marker in a path with the current process id.
pub fn expand_pid_marker(path: &str) -> String {
    path.replace("{pid}", &std::process::id().to_string())
}

// =============================================================================
// Resolved configuration
// =============================================================================

/// Frozen JIT configuration.
#[derive(Debug, Clone)]
pub struct JitConfig {
    /// Lifecycle state.
    pub init_state: InitState,
    /// Master enable; gates new registrations and compilations.
    pub enabled: bool,
    /// Frame elision mode, frozen at init.
    pub frame_mode: FrameMode,
    /// Type-slot specialization gate.
    pub type_slots_enabled: bool,
    /// Accept `*` module tokens in the jit-list.
    pub allow_jit_list_wildcards: bool,
    /// Compile statically-compiled functions even when off the jit-list.
    pub compile_all_static_functions: bool,
    /// Worker count for batch compilation (0 = serial).
    pub batch_compile_workers: usize,
    /// Testing mode: allow forced recompilation of registered functions.
    pub test_multithreaded_compile: bool,

    /// Verbose logging.
    pub debug: bool,
    /// Refcount instrumentation in emitted code.
    pub debug_refcount: bool,
    /// Dump HIR after construction.
    pub dump_hir: bool,
    /// Dump HIR between passes.
    pub dump_hir_passes: bool,
    /// Dump HIR after the final pass.
    pub dump_final_hir: bool,
    /// Dump LIR.
    pub dump_lir: bool,
    /// Dump LIR without origin annotations.
    pub dump_lir_no_origin: bool,
    /// Disassemble functions after compilation.
    pub disas_funcs: bool,
    /// Emit debugger hooks for compiled code.
    pub gdb_support: bool,
    /// Emit debugger hooks for stubs.
    pub gdb_stubs_support: bool,
    /// Write ELF objects for the debugger.
    pub gdb_write_elf: bool,
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            init_state: InitState::Uninitialized,
            enabled: false,
            frame_mode: FrameMode::Normal,
            type_slots_enabled: false,
            allow_jit_list_wildcards: false,
            compile_all_static_functions: false,
            batch_compile_workers: 0,
            test_multithreaded_compile: false,
            debug: false,
            debug_refcount: false,
            dump_hir: false,
            dump_hir_passes: false,
            dump_final_hir: false,
            dump_lir: false,
            dump_lir_no_origin: false,
            disas_funcs: false,
            gdb_support: false,
            gdb_stubs_support: false,
            gdb_write_elf: false,
        }
    }
}

/// Everything option resolution produces.
#[derive(Debug, Clone)]
pub(crate) struct ResolvedOptions {
    /// Should the JIT come up at all?
    pub use_jit: bool,
    /// The configuration to commit if initialization succeeds.
    pub config: JitConfig,
    /// Path of the jit-list file, if configured.
    pub jit_list_path: Option<String>,
    /// Log redirection target, if configured (pre `{pid}` expansion).
    pub log_file: Option<String>,
}

/// Resolve all options into a frozen configuration.
///
/// Panics when `jit-tiny-frame` and `jit-no-frame` are both set; that is
/// a configuration bug in the embedding, not a runtime condition.
pub(crate) fn resolve_options(opts: &JitOptions) -> ResolvedOptions {
    let mut config = JitConfig::default();
    let mut use_jit = flag_set(opts, "jit");

    let log_file = flag_string(opts, "jit-log-file");

    config.debug = flag_set(opts, "jit-debug");
    config.debug_refcount = flag_set(opts, "jit-debug-refcount");
    config.dump_hir = flag_set(opts, "jit-dump-hir");
    config.dump_hir_passes = flag_set(opts, "jit-dump-hir-passes");
    config.dump_final_hir = flag_set(opts, "jit-dump-final-hir");
    config.dump_lir = flag_set(opts, "jit-dump-lir");
    if flag_set(opts, "jit-dump-lir-no-origin") {
        config.dump_lir = true;
        config.dump_lir_no_origin = true;
    }
    config.disas_funcs = flag_set(opts, "jit-disas-funcs");
    if flag_set(opts, "jit-gdb-support") {
        config.debug = true;
        config.gdb_support = true;
    }
    config.gdb_stubs_support = flag_set(opts, "jit-gdb-stubs-support");
    if flag_set(opts, "jit-gdb-write-elf") {
        config.debug = true;
        config.gdb_support = true;
        config.gdb_write_elf = true;
    }

    config.allow_jit_list_wildcards = flag_set(opts, "jit-enable-jit-list-wildcards");
    config.compile_all_static_functions = flag_set(opts, "jit-all-static-functions");

    let jit_list_path = flag_string(opts, "jit-list-file");
    if jit_list_path.is_some() {
        use_jit = true;
    }

    if flag_set(opts, "jit-tiny-frame") {
        config.frame_mode = FrameMode::Tiny;
    }
    if flag_set(opts, "jit-no-frame") {
        assert!(
            config.frame_mode == FrameMode::Normal,
            "jit-tiny-frame and jit-no-frame are mutually exclusive"
        );
        config.frame_mode = FrameMode::None;
    }

    config.type_slots_enabled = !opts.is_set("jit-no-type-slots");
    config.batch_compile_workers = flag_usize(opts, "jit-batch-compile-workers", 0);
    config.test_multithreaded_compile = flag_set(opts, "jit-test-multithreaded-compile");

    ResolvedOptions {
        use_jit,
        config,
        jit_list_path,
        log_file,
    }
}

// =============================================================================
// Tests
// =============================================================================
