//! Host-runtime object model the Onyx JIT plugs into.
//!
//! The JIT control plane does not own the interpreter; it cooperates with
//! it. This crate models the slice of the host runtime the JIT touches:
//!
//! - [`Function`] / [`CodeObject`]: callable objects with a mutable native
//!   dispatch slot the backend installs into
//! - [`Frame`] / [`ThreadState`]: per-thread interpreter state the
//!   generator bridge manipulates on resume
//! - [`gil`]: the global interpreter lock's single-owner check, which the
//!   batch compiler suspends while a worker cohort holds the lock
//!   collectively
//! - [`RefVisitor`]: the GC traversal protocol for reference visiting

#![deny(unsafe_op_in_unsafe_fn)]

pub mod frame;
pub mod function;
pub mod gc_trace;
pub mod gil;
pub mod type_obj;

pub use frame::{Frame, ThreadState, LASTI_UNSTARTED};
pub use function::{CodeFlags, CodeId, CodeObject, FuncId, FuncRef, Function};
pub use gc_trace::RefVisitor;
pub use gil::OwnerCheckSuspension;
pub use type_obj::{TypeObject, TypeRef};
