//! Generator support: continuation state and the host bridge.
//!
//! A compiled function that can suspend carries a continuation block
//! alongside the host generator object. The backend's emitted code stores
//! register state into the block's spill frame at each yield; this module
//! owns the block's layout and the four operations the host's generator
//! machinery calls into: resume, GC traversal, deallocation and
//! `yield from` introspection.

pub mod bridge;
pub mod data;
pub mod state;

pub use bridge::{gen_dealloc, gen_send, gen_visit_refs, gen_yield_from_value};
pub use data::{GenData, Generator, ResumeEntry, YieldPoint, GEN_DATA_ABI_VERSION};
pub use state::{GenHeader, GenState};
