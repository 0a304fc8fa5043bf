//! Error types for the GCP tensor decomposition kernels.

/// Errors that can occur while building, configuring, or running a kernel.
#[derive(Debug, Clone, thiserror::Error)]
pub enum GcpError {
    /// A factor matrix's row count disagrees with the corresponding tensor
    /// dimension, or a `Ktensor`'s components have inconsistent rank.
    #[error("shape mismatch: {message} (expected {expected}, got {got})")]
    ShapeMismatch {
        message: String,
        expected: usize,
        got: usize,
    },

    /// A coordinate lies outside `[0, dims[k])`.
    #[error("coordinate out of bounds on mode {mode}: {index} >= {dim}")]
    CoordOutOfBounds {
        mode: usize,
        index: usize,
        dim: usize,
    },

    /// A requested kernel variant is not valid for the current backend or
    /// tensor state (e.g. `Single`/`Duplicated` on GPU, `Perm` without a
    /// built permutation).
    #[error("unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// A numerical operation failed (divide-by-zero column scale, a solve
    /// that could not be recovered even by the indefinite fallback).
    #[error("numerical failure: {0}")]
    NumericalFailure(String),

    /// A CLI argument was malformed or out of range.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A GPU kernel failed to launch or to synchronize.
    #[error("launch error: {0}")]
    LaunchError(String),

    /// Reading or writing a tensor text file failed.
    #[error("io error: {0}")]
    Io(String),
}

impl GcpError {
    pub fn shape(message: impl Into<String>, expected: usize, got: usize) -> Self {
        Self::ShapeMismatch {
            message: message.into(),
            expected,
            got,
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        Self::UnsupportedConfiguration(message.into())
    }

    pub fn numerical(message: impl Into<String>) -> Self {
        Self::NumericalFailure(message.into())
    }

    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn launch(message: impl Into<String>) -> Self {
        Self::LaunchError(message.into())
    }

    pub fn io(message: impl Into<String>) -> Self {
        Self::Io(message.into())
    }
}

impl From<std::io::Error> for GcpError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

/// Result type used throughout the crate.
pub type GcpResult<T> = Result<T, GcpError>;
