//! Compilation timing.
//!
//! A [`CompilationTimer`] is a scoped timer: it captures a monotonic
//! timestamp when constructed and, when dropped, folds the elapsed
//! wall-clock time into a process-wide total and a per-function table.
//! Recording happens on every exit path out of a compile, including early
//! returns and panics.

use std::time::{Duration, Instant};

use onyx_runtime::FuncId;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;

// =============================================================================
// Timing stats
// =============================================================================

/// Accumulated compilation times.
#[derive(Debug, Default)]
pub struct TimingStats {
    total: Mutex<Duration>,
    per_func: Mutex<FxHashMap<FuncId, Duration>>,
}

impl TimingStats {
    /// Empty stats.
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one compile's elapsed time into the totals.
    ///
    /// The per-function table keeps the first recorded time; the total
    /// accumulates every attempt.
    pub fn record(&self, func: FuncId, elapsed: Duration) {
        *self.total.lock() += elapsed;
        self.per_func.lock().entry(func).or_insert(elapsed);
    }

    /// Total wall-clock time spent compiling.
    pub fn total(&self) -> Duration {
        *self.total.lock()
    }

    /// Wall-clock time spent compiling one function, if recorded.
    pub fn function_time(&self, func: FuncId) -> Option<Duration> {
        self.per_func.lock().get(&func).copied()
    }

    /// Number of functions with a recorded time.
    pub fn recorded_functions(&self) -> usize {
        self.per_func.lock().len()
    }

    /// Sum of all per-function times.
    pub fn per_function_sum(&self) -> Duration {
        self.per_func.lock().values().sum()
    }

    /// Zero everything.
    pub fn reset(&self) {
        *self.total.lock() = Duration::ZERO;
        self.per_func.lock().clear();
    }
}

// =============================================================================
// Scoped timer
// =============================================================================

/// Scoped wall-clock timer for one compilation attempt.
pub struct CompilationTimer<'a> {
    stats: &'a TimingStats,
    func: FuncId,
    start: Instant,
}

impl<'a> CompilationTimer<'a> {
    /// Start timing a compile of `func`.
    pub fn new(stats: &'a TimingStats, func: FuncId) -> Self {
        Self {
            stats,
            func,
            start: Instant::now(),
        }
    }
}

impl Drop for CompilationTimer<'_> {
    fn drop(&mut self) {
        self.stats.record(self.func, self.start.elapsed());
    }
}

// =============================================================================
// Tests
// =============================================================================
