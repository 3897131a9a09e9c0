//! Per-process sampling state for profiler integration.
//!
//! Profilers resolve JIT frames through a pid-keyed map file. The pid is
//! captured once at initialization; a forked child re-captures it so its
//! map file does not collide with the parent's.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU32, Ordering};

use tracing::debug;

static SAMPLING_PID: AtomicU32 = AtomicU32::new(0);

/// Capture the current process id. Called at controller initialization.
pub fn init() {
    SAMPLING_PID.store(std::process::id(), Ordering::Release);
}

/// Re-initialize sampling state in a freshly forked child.
pub fn after_fork_child() {
    let pid = std::process::id();
    SAMPLING_PID.store(pid, Ordering::Release);
    debug!(pid, "reinitialized sampling state after fork");
}

/// Pid the sampling state was captured for (0 before initialization).
pub fn sampling_pid() -> u32 {
    SAMPLING_PID.load(Ordering::Acquire)
}

/// Path of the pid-keyed profiler map file.
pub fn perf_map_path() -> PathBuf {
    PathBuf::from(format!("/tmp/perf-{}.map", sampling_pid()))
}
