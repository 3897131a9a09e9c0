//! Reference-visiting protocol for GC traversal.

use onyx_core::Value;

/// Visitor over the references an object pins.
///
/// The collector supplies an implementation; traversal routines call
/// [`RefVisitor::visit`] once per reachable value.
pub trait RefVisitor {
    /// Visit one pinned value.
    fn visit(&mut self, value: &Value);
}

impl<F: FnMut(&Value)> RefVisitor for F {
    fn visit(&mut self, value: &Value) {
        self(value)
    }
}
