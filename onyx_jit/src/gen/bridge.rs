//! Bridge between the host's generator machinery and JIT continuations.
//!
//! The host calls these four operations for any generator whose function
//! was JIT-compiled. A generator reaching this bridge without a
//! continuation block is an invariant violation: the block is attached
//! when the compiled function first creates the generator.

use onyx_core::Value;
use onyx_runtime::{Frame, RefVisitor, ThreadState};

use super::data::Generator;
use super::state::GenState;
use std::sync::Arc;

/// Resume a suspended generator, sending it a value or an exception.
///
/// Preconditions: the continuation is `JustStarted` or `Running`, and a
/// yield point exists (the generator has been entered). When
/// `is_exception` is set, `arg` must be the `None` value and an exception
/// must be pending on `tstate`; the resume entry receives no send value
/// and raises instead.
///
/// If `frame` is supplied it is installed as the thread's current frame,
/// marked executing, and given a last-instruction index of `i32::MAX`:
/// not-yet-started probes compare `lasti < 0`, so the sentinel reads as
/// started while deliberately carrying no meaningful offset.
///
/// Returns the next yielded value, or `None` once the generator finishes;
/// finishing transitions the continuation to `Completed`.
pub fn gen_send(
    gen: &Generator,
    arg: Option<Value>,
    is_exception: bool,
    frame: Option<Arc<Frame>>,
    tstate: &ThreadState,
    finish_yield_from: bool,
) -> Option<Value> {
    let data_guard = gen.data();
    let data = data_guard
        .as_ref()
        .expect("generator missing JIT continuation");

    debug_assert!(
        data.state().is_resumable(),
        "invalid generator state for resume: {}",
        data.state()
    );
    data.header().set_state(GenState::Running);

    // The resume entry takes no send value when an exception is being
    // injected.
    let send = if is_exception {
        debug_assert!(
            matches!(arg, Some(Value::None)),
            "send value must be None when injecting an exception"
        );
        debug_assert!(
            tstate.has_pending_exception(),
            "exception injection without a pending exception"
        );
        None
    } else {
        Some(arg.unwrap_or(Value::None))
    };

    if let Some(frame) = frame {
        frame.set_executing(true);
        frame.set_lasti(i32::MAX);
        tstate.set_frame(frame);
    }

    debug_assert!(
        data.yield_point().is_some(),
        "attempting to resume a generator with no yield point"
    );

    let result = (data.resume_entry())(data, send, tstate, finish_yield_from);
    if result.is_none() {
        data.header().complete();
    }
    result
}

/// Walk the references pinned by a suspended generator.
pub fn gen_visit_refs(gen: &Generator, visitor: &mut dyn RefVisitor) {
    let data_guard = gen.data();
    let data = data_guard
        .as_ref()
        .expect("generator missing JIT continuation");
    if data.state().is_completed() {
        return;
    }
    if let Some(yield_point) = data.yield_point() {
        yield_point.visit_refs(data, visitor);
    }
}

/// Release a generator's continuation block.
///
/// References pinned by the active yield point are dropped first unless
/// the continuation already completed (completion released them).
pub fn gen_dealloc(gen: &Generator) {
    let data = gen.take_data().expect("generator missing JIT continuation");
    if !data.state().is_completed() {
        if let Some(yield_point) = data.yield_point() {
            yield_point.release_refs(&data);
        }
    }
}

/// The object a suspended generator is delegating to via `yield from`,
/// as a new reference, or `None` when not delegating or completed.
pub fn gen_yield_from_value(gen: &Generator) -> Option<Value> {
    let data_guard = gen.data();
    let data = data_guard
        .as_ref()
        .expect("generator missing JIT continuation");
    if data.state().is_completed() {
        return None;
    }
    data.yield_point()
        .and_then(|yield_point| yield_point.yield_from_value(data))
}

// =============================================================================
// Tests
// =============================================================================
