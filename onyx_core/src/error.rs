//! Error types and result definitions for the Onyx JIT.
//!
//! Every fallible operation in the JIT control plane reports one of the
//! kinds below. Configuration problems and jit-list parse failures are
//! recoverable (the JIT degrades to interpretation). Internal invariant
//! violations are not modelled here at all; those are asserts.

use thiserror::Error;

/// The unified result type used throughout the Onyx JIT.
pub type JitResult<T> = Result<T, JitError>;

/// Error kinds surfaced by the JIT control plane.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JitError {
    /// The controller has not been initialized (or was finalized).
    #[error("JIT is not initialized")]
    NotInitialized,

    /// The operation expected a function object.
    #[error("expected a function object")]
    NotAFunction,

    /// The function is not eligible per the loaded jit-list.
    #[error("function is not on the jit-list")]
    NotOnJitList,

    /// The function already has native code installed.
    #[error("function is already compiled")]
    AlreadyCompiled,

    /// Introspection was asked about a function with no native code.
    #[error("function is not jit compiled")]
    NotCompiled,

    /// The active-compile stack is full or contains this code object.
    #[error("compile recursion limit reached or cycle detected")]
    RecursionLimitOrCycle,

    /// The backend asked for the compilation to be re-attempted later.
    #[error("backend requested a retry")]
    BackendRetry,

    /// The backend cannot specialize this function.
    #[error("backend cannot specialize")]
    BackendCannotSpecialize,

    /// The backend failed for an unclassified reason.
    #[error("backend failed with an unknown error")]
    BackendUnknown,

    /// The jit-list file could not be parsed.
    #[error("failed to parse jit-list: {0}")]
    JitListParseFailure(String),

    /// A configuration option carried an unusable value.
    #[error("invalid value for {option}: {value}")]
    ConfigInvalidValue {
        /// The option name, e.g. `jit-batch-compile-workers`.
        option: String,
        /// The rejected value.
        value: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            JitError::NotInitialized.to_string(),
            "JIT is not initialized"
        );
        assert_eq!(
            JitError::NotCompiled.to_string(),
            "function is not jit compiled"
        );
    }

    #[test]
    fn test_config_invalid_value_display() {
        let err = JitError::ConfigInvalidValue {
            option: "jit-batch-compile-workers".into(),
            value: "many".into(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value for jit-batch-compile-workers: many"
        );
    }

    #[test]
    fn test_error_eq() {
        assert_eq!(JitError::BackendRetry, JitError::BackendRetry);
        assert_ne!(JitError::BackendRetry, JitError::BackendUnknown);
    }
}
