//! Global interpreter lock owner-check control.
//!
//! The host serializes interpreter state behind a single global lock and,
//! in debug configurations, asserts that exactly one thread holds it. The
//! batch compiler deliberately violates that invariant: a cohort of worker
//! threads holds the lock collectively and serializes its own writes. For
//! the duration of a batch compile the single-owner check is suspended and
//! restored afterwards, on every exit path.

use std::sync::atomic::{AtomicBool, Ordering};

static OWNER_CHECK_ENABLED: AtomicBool = AtomicBool::new(true);

/// Is the single-owner check currently active?
#[inline]
pub fn owner_check_enabled() -> bool {
    OWNER_CHECK_ENABLED.load(Ordering::Acquire)
}

/// Set the single-owner check, returning the previous setting.
pub fn set_owner_check_enabled(enabled: bool) -> bool {
    OWNER_CHECK_ENABLED.swap(enabled, Ordering::AcqRel)
}

/// Scoped suspension of the single-owner check.
///
/// Restores the prior setting on drop, so early returns and panics inside
/// a batch compile cannot leave the check disabled.
#[derive(Debug)]
pub struct OwnerCheckSuspension {
    prev: bool,
}

impl OwnerCheckSuspension {
    /// Suspend the owner check until the returned guard is dropped.
    pub fn begin() -> Self {
        Self {
            prev: set_owner_check_enabled(false),
        }
    }
}

impl Drop for OwnerCheckSuspension {
    fn drop(&mut self) {
        set_owner_check_enabled(self.prev);
    }
}
