//! Error types for the evaluation core.
//!
//! Errors are bound to the resource instance that produced them so a walk
//! can record a failure on one vertex and keep going on independent branches.

use thiserror::Error;

/// Errors that can occur while expanding or evaluating resources.
#[derive(Debug, Error)]
pub enum Error {
    /// A resource declaration's count evaluated to a negative number
    #[error("negative count: {0}")]
    InvalidCount(i64),

    /// Interpolating a raw configuration failed
    #[error("interpolation failed for {resource}: {message}")]
    Interpolation {
        /// Identity of the resource instance being interpolated
        resource: String,
        /// Detail from the interpolator
        message: String,
    },

    /// A provider call failed
    #[error("provider error for {key}: {message}")]
    Provider {
        /// State key of the affected instance
        key: String,
        /// Detail from the provider
        message: String,
    },

    /// A provisioner failed while converging a freshly created instance
    #[error("provisioner {provisioner} failed for {key}: {message}")]
    Provisioner {
        /// Provisioner kind (e.g. "shell")
        provisioner: String,
        /// State key of the affected instance
        key: String,
        /// Detail from the provisioner
        message: String,
    },

    /// The diff computed at apply time no longer matches the planned diff
    #[error("diffs didn't match during apply for {key}: {reason}")]
    DiffMismatch {
        /// State key of the affected instance
        key: String,
        /// First detected divergence
        reason: String,
    },

    /// No provider registered under the requested key
    #[error("provider {0} not initialized")]
    UnknownProvider(String),

    /// No provisioner registered under the requested kind
    #[error("provisioner {0} not initialized")]
    UnknownProvisioner(String),

    /// A tainted instance was addressed at an index that does not exist
    #[error("bad tainted index {index} for resource {key}")]
    BadTaintedIndex {
        /// State key of the affected resource
        key: String,
        /// The index that was out of range (-1 addresses the last entry)
        index: i64,
    },

    /// A hook reported a failure
    #[error("hook error: {0}")]
    Hook(String),
}

/// Result type for evaluation operations.
pub type Result<T> = std::result::Result<T, Error>;
