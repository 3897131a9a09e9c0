//! Core types shared across the Onyx runtime.
//!
//! This crate holds the leaf definitions every other Onyx crate builds on:
//!
//! - [`Value`]: the boxed value representation exchanged with the host
//! - [`JitError`] / [`JitResult`]: the unified error hierarchy

#![deny(unsafe_op_in_unsafe_fn)]

pub mod error;
pub mod value;

pub use error::{JitError, JitResult};
pub use value::Value;
