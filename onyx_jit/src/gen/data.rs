//! Continuation block layout.
//!
//! The continuation block is shared memory between this controller and the
//! backend's emitted code: the resume entry reads and writes the spill
//! frame directly. Its layout is part of the backend ABI and is versioned
//! with it; [`GenData::attach`] refuses a block built against a different
//! ABI revision.

use std::sync::Arc;

use onyx_core::Value;
use onyx_runtime::{RefVisitor, ThreadState};
use parking_lot::{Mutex, MutexGuard, RwLock};

use super::state::{GenHeader, GenState};

/// ABI revision of the continuation block layout. Bumped together with
/// the backend whenever the layout changes.
pub const GEN_DATA_ABI_VERSION: u16 = 1;

/// Resume entry emitted by the backend for a suspendable function.
///
/// Receives the continuation block, the sent value (`None` for an
/// exception injection), the resuming thread's state, and whether a
/// delegated `yield from` should be finished. Returns the yielded value,
/// or nothing when the function ran to completion.
pub type ResumeEntry =
    fn(data: &GenData, arg: Option<Value>, tstate: &ThreadState, finish_yield_from: bool) -> Option<Value>;

// =============================================================================
// Yield points
// =============================================================================

/// Descriptor of one suspension site in emitted code.
///
/// Emitted once per yield at compile time and shared by every generator
/// instance of the function.
#[derive(Debug)]
pub struct YieldPoint {
    resume_target: u32,
    yield_from_slot: Option<usize>,
}

impl YieldPoint {
    /// A yield point resuming at the given code label.
    pub fn new(resume_target: u32) -> Arc<Self> {
        Arc::new(Self {
            resume_target,
            yield_from_slot: None,
        })
    }

    /// A yield point that is delegating to a sub-iterator held in the
    /// given spill slot.
    pub fn with_yield_from(resume_target: u32, slot: usize) -> Arc<Self> {
        Arc::new(Self {
            resume_target,
            yield_from_slot: Some(slot),
        })
    }

    /// Code label this yield point resumes at.
    #[inline]
    pub fn resume_target(&self) -> u32 {
        self.resume_target
    }

    /// Walk every reference pinned by the suspended frame.
    pub fn visit_refs(&self, data: &GenData, visitor: &mut dyn RefVisitor) {
        for value in data.spill().iter() {
            visitor.visit(value);
        }
    }

    /// Drop every reference pinned by the suspended frame.
    pub fn release_refs(&self, data: &GenData) {
        data.spill().clear();
    }

    /// The object currently being delegated to, if this suspension is a
    /// `yield from`. The returned value is a new reference.
    pub fn yield_from_value(&self, data: &GenData) -> Option<Value> {
        let slot = self.yield_from_slot?;
        data.spill().get(slot).cloned()
    }
}

// =============================================================================
// Continuation block
// =============================================================================

/// Per-instance continuation state appended to a generator object.
pub struct GenData {
    header: GenHeader,
    yield_point: RwLock<Option<Arc<YieldPoint>>>,
    resume_entry: ResumeEntry,
    spill: Mutex<Vec<Value>>,
}

impl GenData {
    /// Build a continuation block against the current ABI revision.
    ///
    /// Panics when the backend was built against a different revision;
    /// mismatched layouts are a build system bug, not a runtime condition.
    pub fn attach(
        abi_version: u16,
        resume_entry: ResumeEntry,
        yield_point: Arc<YieldPoint>,
        spill: Vec<Value>,
    ) -> Self {
        assert_eq!(
            abi_version, GEN_DATA_ABI_VERSION,
            "continuation block ABI mismatch"
        );
        Self {
            header: GenHeader::new(),
            yield_point: RwLock::new(Some(yield_point)),
            resume_entry,
            spill: Mutex::new(spill),
        }
    }

    /// Current state.
    #[inline]
    pub fn state(&self) -> GenState {
        self.header.state()
    }

    /// The packed state header.
    #[inline]
    pub fn header(&self) -> &GenHeader {
        &self.header
    }

    /// The active yield point, if any.
    pub fn yield_point(&self) -> Option<Arc<YieldPoint>> {
        self.yield_point.read().clone()
    }

    /// Record a new suspension site. Called by emitted code at each yield.
    pub fn set_yield_point(&self, yield_point: Arc<YieldPoint>) {
        self.header.suspend_at(yield_point.resume_target());
        *self.yield_point.write() = Some(yield_point);
    }

    /// The resume entry for this continuation.
    #[inline]
    pub fn resume_entry(&self) -> ResumeEntry {
        self.resume_entry
    }

    /// The spill frame holding live values across the suspension.
    pub fn spill(&self) -> MutexGuard<'_, Vec<Value>> {
        self.spill.lock()
    }
}

impl std::fmt::Debug for GenData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenData")
            .field("state", &self.state())
            .field("yield_index", &self.header.yield_index())
            .field("spill_len", &self.spill().len())
            .finish()
    }
}

// =============================================================================
// Generator object
// =============================================================================

/// A host generator object, as far as the JIT is concerned: the owner of
/// one continuation block. The block's lifetime matches the generator's.
#[derive(Debug, Default)]
pub struct Generator {
    jit_data: RwLock<Option<Box<GenData>>>,
}

impl Generator {
    /// A generator with no JIT continuation (interpreter-owned).
    pub fn new() -> Self {
        Self::default()
    }

    /// A generator carrying the given continuation block.
    pub fn with_data(data: GenData) -> Self {
        Self {
            jit_data: RwLock::new(Some(Box::new(data))),
        }
    }

    /// Does this generator carry a JIT continuation?
    pub fn has_jit_data(&self) -> bool {
        self.jit_data.read().is_some()
    }

    /// Continuation state, if a block is attached.
    pub fn state(&self) -> Option<GenState> {
        self.jit_data.read().as_ref().map(|d| d.state())
    }

    pub(crate) fn data(&self) -> parking_lot::RwLockReadGuard<'_, Option<Box<GenData>>> {
        self.jit_data.read()
    }

    pub(crate) fn take_data(&self) -> Option<Box<GenData>> {
        self.jit_data.write().take()
    }
}

// =============================================================================
// Tests
// =============================================================================
