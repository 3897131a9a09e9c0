//! Interpreter frames and per-thread state.
//!
//! Only the slice the JIT needs: the generator bridge installs a frame on
//! the thread state when resuming a suspended function, and injected
//! exceptions are staged as the thread's pending exception.

use std::sync::atomic::{AtomicBool, AtomicI32, Ordering};
use std::sync::Arc;

use onyx_core::Value;
use parking_lot::Mutex;

/// `lasti` value of a frame that has not started executing.
pub const LASTI_UNSTARTED: i32 = -1;

// =============================================================================
// Frame
// =============================================================================

/// A host interpreter frame.
///
/// The JIT only reads and writes the execution flag and the
/// last-instruction index; everything else stays with the interpreter.
#[derive(Debug)]
pub struct Frame {
    executing: AtomicBool,
    lasti: AtomicI32,
}

impl Frame {
    /// A fresh, not-yet-started frame.
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            executing: AtomicBool::new(false),
            lasti: AtomicI32::new(LASTI_UNSTARTED),
        })
    }

    /// Mark the frame as executing or not.
    #[inline]
    pub fn set_executing(&self, executing: bool) {
        self.executing.store(executing, Ordering::Release);
    }

    /// Is the frame currently executing?
    #[inline]
    pub fn is_executing(&self) -> bool {
        self.executing.load(Ordering::Acquire)
    }

    /// Set the last-instruction index.
    #[inline]
    pub fn set_lasti(&self, lasti: i32) {
        self.lasti.store(lasti, Ordering::Release);
    }

    /// Last-instruction index.
    #[inline]
    pub fn lasti(&self) -> i32 {
        self.lasti.load(Ordering::Acquire)
    }

    /// Has execution of this frame begun? Probes compare `lasti < 0`.
    #[inline]
    pub fn has_started(&self) -> bool {
        self.lasti() >= 0
    }
}

// =============================================================================
// Thread state
// =============================================================================

/// Per-thread interpreter state.
#[derive(Debug, Default)]
pub struct ThreadState {
    frame: Mutex<Option<Arc<Frame>>>,
    pending_exception: Mutex<Option<Value>>,
}

impl ThreadState {
    /// A thread state with no current frame and no pending exception.
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `frame` as the thread's current frame.
    pub fn set_frame(&self, frame: Arc<Frame>) {
        *self.frame.lock() = Some(frame);
    }

    /// The thread's current frame, if any.
    pub fn current_frame(&self) -> Option<Arc<Frame>> {
        self.frame.lock().clone()
    }

    /// Stage an exception to be raised at the next resume point.
    pub fn set_pending_exception(&self, exc: Value) {
        *self.pending_exception.lock() = Some(exc);
    }

    /// Is an exception pending on this thread?
    pub fn has_pending_exception(&self) -> bool {
        self.pending_exception.lock().is_some()
    }

    /// Take the pending exception, clearing it.
    pub fn take_pending_exception(&self) -> Option<Value> {
        self.pending_exception.lock().take()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_frame_is_unstarted() {
        let frame = Frame::new();
        assert!(!frame.is_executing());
        assert_eq!(frame.lasti(), LASTI_UNSTARTED);
        assert!(!frame.has_started());
    }

    #[test]
    fn test_frame_started_probe() {
        let frame = Frame::new();
        frame.set_lasti(i32::MAX);
        assert!(frame.has_started());
    }

    #[test]
    fn test_thread_state_frame_install() {
        let tstate = ThreadState::new();
        assert!(tstate.current_frame().is_none());

        let frame = Frame::new();
        tstate.set_frame(Arc::clone(&frame));
        let current = tstate.current_frame().unwrap();
        assert!(Arc::ptr_eq(&current, &frame));
    }

    #[test]
    fn test_thread_state_pending_exception() {
        let tstate = ThreadState::new();
        assert!(!tstate.has_pending_exception());

        tstate.set_pending_exception(Value::str("ValueError"));
        assert!(tstate.has_pending_exception());

        let exc = tstate.take_pending_exception();
        assert_eq!(exc, Some(Value::str("ValueError")));
        assert!(!tstate.has_pending_exception());
    }
}
