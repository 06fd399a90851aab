//! relume-pipeline: result-processing stage of an image loader (sans-IO).
//!
//! Takes a freshly decoded image and runs it through:
//! eligibility checks -> transform step -> reclamation of the stale
//! buffer into a pool -> request state update.
//!
//! Pixel memory is handed out by a [`BufferPool`] as [`PixelBuffer`]
//! handles carrying a generation id, so a released buffer can never be
//! read or released again without the misuse being reported.
//!
//! A [`RedisplayGate`] per recycled display container decides, on
//! reattach, whether to replay the last known request from the memory
//! cache.
//!
//! This crate has **no I/O dependencies**: fetching, decoding and
//! displaying are the caller's concern.

pub mod blur;
pub mod buffer;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod grayscale;
pub mod mask;
pub mod pool;
pub mod processor;
pub mod redisplay;
pub mod request;
pub mod resize;
pub mod result;
pub mod transform;
pub mod types;

pub use buffer::{BufferId, PixelBuffer};
pub use config::ProcessorConfig;
pub use diagnostics::ProcessDiagnostics;
pub use error::{
    ConfigError, CorruptResultError, FailureCause, InvalidTransitionError, PoolError,
    PoolMisuseError, TransformError,
};
pub use pool::{BufferPool, PoolConfig, PoolStats, ReleaseOutcome};
pub use processor::{
    FailureCallback, LogFailures, ProcessOutcome, ProcessingFailure, ResultProcessor, SkipReason,
};
pub use redisplay::{
    DisplayCache, DisplayOutcome, LogRedisplay, ReattachOutcome, Redisplay, RedisplayGate,
    RedisplayListener,
};
pub use request::{LoadRequest, RequestState, RequestStatus, TransformOptions};
pub use resize::ResizeFilter;
pub use result::{DecodeResult, DecodedPayload};
pub use transform::{Transform, TransformKind};
pub use types::{BufferInfo, Dimensions, ImageInfo, PixelFormat, Resize, ResizeMode, RgbaImage};
