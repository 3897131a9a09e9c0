//! Shared state for multi-threaded batch compilation.
//!
//! During a batch compile the worker cohort holds the host's global lock
//! collectively: the lock is never released, its single-owner check is
//! suspended, and the workers take over responsibility for serializing
//! their own writes. [`ThreadedCompileContext`] is that machinery: a
//! work-stealing queue of functions, a retry list drained after the
//! workers join, and the write-serialization lock behind
//! [`ThreadedCompileSerialize`].
//!
//! The serialization scope is intentionally conditional. While batch mode
//! is active it locks; outside batch mode the host lock already provides
//! mutual exclusion and the scope collapses to a no-op. The lock is
//! reentrant so a thread already inside a serialized region can re-enter
//! without waiting, which makes the single-function compile path safe to
//! invoke re-entrantly.

use std::sync::atomic::{AtomicBool, Ordering};

use crossbeam_deque::{Injector, Steal};
use onyx_runtime::FuncRef;
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};

// =============================================================================
// Threaded compile context
// =============================================================================

/// Queue, retry list and write-serialization lock shared by batch workers.
#[derive(Debug, Default)]
pub struct ThreadedCompileContext {
    active: AtomicBool,
    queue: Injector<FuncRef>,
    retry: Mutex<Vec<FuncRef>>,
    serial: ReentrantMutex<()>,
}

impl ThreadedCompileContext {
    /// A context with no batch in flight.
    pub fn new() -> Self {
        Self::default()
    }

    /// Move a batch of functions into the queue and enter batch mode.
    ///
    /// Panics if a batch is already active; batches never nest.
    pub fn start_compile(&self, work: Vec<FuncRef>) {
        let was_active = self.active.swap(true, Ordering::AcqRel);
        assert!(!was_active, "threaded compile already active");
        for func in work {
            self.queue.push(func);
        }
    }

    /// Pop the next function to compile, or `None` when the queue is dry.
    pub fn next_function(&self) -> Option<FuncRef> {
        loop {
            match self.queue.steal() {
                Steal::Success(func) => return Some(func),
                Steal::Empty => return None,
                Steal::Retry => continue,
            }
        }
    }

    /// Park a function on the retry list for a serial re-attempt after
    /// the workers join. Callers hold [`ThreadedCompileSerialize`].
    pub fn retry_function(&self, func: FuncRef) {
        self.retry.lock().push(func);
    }

    /// Leave batch mode, returning the accumulated retry list.
    pub fn end_compile(&self) -> Vec<FuncRef> {
        self.active.store(false, Ordering::Release);
        std::mem::take(&mut *self.retry.lock())
    }

    /// Is a batch compile in flight?
    #[inline]
    pub fn in_batch(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Enter the write-serialization scope.
    ///
    /// A real lock while batch mode is active; a no-op otherwise.
    pub fn serialize(&self) -> ThreadedCompileSerialize<'_> {
        ThreadedCompileSerialize {
            _guard: self.in_batch().then(|| self.serial.lock()),
        }
    }
}

/// Scoped write-serialization over refcounted host state.
#[must_use = "the serialization scope ends when this guard is dropped"]
pub struct ThreadedCompileSerialize<'a> {
    _guard: Option<ReentrantMutexGuard<'a, ()>>,
}

impl ThreadedCompileSerialize<'_> {
    /// Did this scope actually take the lock?
    pub fn is_held(&self) -> bool {
        self._guard.is_some()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use onyx_runtime::{CodeObject, Function};

    fn make_func(name: &str) -> FuncRef {
        Function::new("m", name, CodeObject::new(name, vec![0]))
    }

    #[test]
    fn test_queue_drains_all_functions() {
        let ctx = ThreadedCompileContext::new();
        ctx.start_compile(vec![make_func("a"), make_func("b"), make_func("c")]);

        let mut seen = Vec::new();
        while let Some(func) = ctx.next_function() {
            seen.push(func.qualname().to_owned());
        }
        seen.sort();
        assert_eq!(seen, vec!["a", "b", "c"]);
        assert!(ctx.next_function().is_none());
        ctx.end_compile();
    }

    #[test]
    fn test_retry_list_returned_at_end() {
        let ctx = ThreadedCompileContext::new();
        ctx.start_compile(vec![make_func("a")]);

        let func = ctx.next_function().unwrap();
        ctx.retry_function(func);

        let retries = ctx.end_compile();
        assert_eq!(retries.len(), 1);
        assert_eq!(retries[0].qualname(), "a");

        // The retry list resets between batches.
        ctx.start_compile(vec![]);
        assert!(ctx.end_compile().is_empty());
    }

    #[test]
    fn test_serialize_noop_outside_batch() {
        let ctx = ThreadedCompileContext::new();
        let guard = ctx.serialize();
        assert!(!guard.is_held());
    }

    #[test]
    fn test_serialize_locks_in_batch() {
        let ctx = ThreadedCompileContext::new();
        ctx.start_compile(vec![]);
        {
            let guard = ctx.serialize();
            assert!(guard.is_held());
            // Reentrant: same thread can serialize again without waiting.
            let inner = ctx.serialize();
            assert!(inner.is_held());
        }
        ctx.end_compile();
        assert!(!ctx.in_batch());
    }

    #[test]
    #[should_panic(expected = "already active")]
    fn test_batches_never_nest() {
        let ctx = ThreadedCompileContext::new();
        ctx.start_compile(vec![]);
        ctx.start_compile(vec![]);
    }

    #[test]
    fn test_workers_share_queue() {
        let ctx = ThreadedCompileContext::new();
        let work: Vec<FuncRef> = (0..64).map(|i| make_func(&format!("f{}", i))).collect();
        ctx.start_compile(work);

        let total = std::sync::atomic::AtomicUsize::new(0);
        std::thread::scope(|s| {
            for _ in 0..4 {
                s.spawn(|| {
                    while let Some(_func) = ctx.next_function() {
                        total.fetch_add(1, Ordering::Relaxed);
                    }
                });
            }
        });

        assert_eq!(total.load(Ordering::Relaxed), 64);
        ctx.end_compile();
    }
}
