//! Error taxonomy for the result-processing stage.
//!
//! Request-scoped errors ([`TransformError`], [`CorruptResultError`],
//! [`InvalidTransitionError`]) are caught at the
//! [`ResultProcessor`](crate::ResultProcessor) boundary and reported as a
//! [`ProcessingFailure`](crate::ProcessingFailure). [`PoolMisuseError`]
//! is the one category that escapes `process`: it signals a buffer
//! lifecycle bug in the caller and must not be tolerated.

use crate::buffer::BufferId;
use crate::request::RequestState;
use crate::types::PixelFormat;

/// A pooled buffer was used outside its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolMisuseError {
    /// The buffer was released a second time.
    #[error("buffer {id} released twice")]
    DoubleRelease {
        /// Generation id of the offending buffer.
        id: BufferId,
    },

    /// The buffer was read or written after it was released.
    #[error("buffer {id} accessed after release")]
    UseAfterRelease {
        /// Generation id of the offending buffer.
        id: BufferId,
    },
}

/// The pool could not hand out a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PoolError {
    /// The requested buffer is larger than the pool's per-buffer limit
    /// or does not fit in addressable memory.
    #[error("buffer of {width}x{height} {format} is too large to allocate")]
    Oversized {
        /// Requested width in pixels.
        width: u32,
        /// Requested height in pixels.
        height: u32,
        /// Requested pixel format.
        format: PixelFormat,
    },
}

/// Errors raised by a [`Transform`](crate::Transform).
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TransformError {
    /// A buffer was used outside its lifetime while transforming.
    ///
    /// The processor escalates this instead of reporting it.
    #[error("buffer misuse during transform: {0}")]
    Buffer(#[from] PoolMisuseError),

    /// An output buffer could not be acquired.
    #[error("failed to acquire output buffer: {0}")]
    Allocation(#[from] PoolError),

    /// A transform parameter is out of range.
    #[error("invalid transform parameter: {0}")]
    InvalidParameter(String),

    /// The transform failed for a reason of its own.
    #[error("transform failed: {0}")]
    Failed(String),
}

/// A transform reported success but produced an unusable buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum CorruptResultError {
    /// The returned buffer was already released.
    #[error("transform returned released buffer {id}")]
    Released {
        /// Generation id of the returned buffer.
        id: BufferId,
    },

    /// The returned buffer has no pixels.
    #[error("transform returned an empty {width}x{height} buffer")]
    Empty {
        /// Width of the returned buffer.
        width: u32,
        /// Height of the returned buffer.
        height: u32,
    },
}

/// A request state change that does not follow the lifecycle ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("invalid request transition from {from} to {to}")]
pub struct InvalidTransitionError {
    /// State the request was in.
    pub from: RequestState,
    /// State that was requested.
    pub to: RequestState,
}

/// Why a request failed during processing.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FailureCause {
    /// The transform step raised an error.
    #[error(transparent)]
    Transform(#[from] TransformError),

    /// The transform produced an unusable buffer.
    #[error(transparent)]
    CorruptResult(#[from] CorruptResultError),

    /// The request could not enter the processing stage.
    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransitionError),
}

/// Configuration failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}
