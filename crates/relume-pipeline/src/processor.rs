//! Result processor: runs the transform step over a decode result.
//!
//! [`ResultProcessor::process`] decides whether a result is eligible,
//! invokes the request's transform, reclaims the stale input buffer into
//! the pool, and converts request-scoped errors into a reported
//! [`ProcessingFailure`]. Only [`PoolMisuseError`] escapes.

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use crate::buffer::PixelBuffer;
use crate::diagnostics::ProcessDiagnostics;
use crate::error::{CorruptResultError, FailureCause, PoolMisuseError, TransformError};
use crate::pool::BufferPool;
use crate::request::{LoadRequest, RequestState};
use crate::result::{DecodeResult, DecodedPayload};

/// Why a result was passed through untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The result is banned from processing.
    Banned,
    /// The payload is not a still image.
    NotBitmap,
    /// The still image has no buffer, or its buffer was released.
    BufferAbsent,
    /// The request configures no transform.
    NoTransform,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Banned => f.write_str("banned from processing"),
            Self::NotBitmap => f.write_str("not a bitmap"),
            Self::BufferAbsent => f.write_str("no live buffer"),
            Self::NoTransform => f.write_str("no transform configured"),
        }
    }
}

/// A request failed while being processed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("processing {request_key} with {transform_key} failed: {cause}")]
pub struct ProcessingFailure {
    /// What went wrong.
    #[source]
    pub cause: FailureCause,
    /// Key of the failed request.
    pub request_key: String,
    /// Key of the transform that was running.
    pub transform_key: String,
}

/// What [`ResultProcessor::process`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// The result was left as it was.
    Skipped(SkipReason),
    /// The transform ran and the result now holds its output.
    Processed(ProcessDiagnostics),
    /// The request failed; the failure was reported to the callback.
    Failed(ProcessingFailure),
}

impl ProcessOutcome {
    /// Diagnostics of a processed result.
    #[must_use]
    pub const fn diagnostics(&self) -> Option<&ProcessDiagnostics> {
        match self {
            Self::Processed(diagnostics) => Some(diagnostics),
            Self::Skipped(_) | Self::Failed(_) => None,
        }
    }

    /// The reported failure, if the request failed.
    #[must_use]
    pub const fn failure(&self) -> Option<&ProcessingFailure> {
        match self {
            Self::Failed(failure) => Some(failure),
            Self::Skipped(_) | Self::Processed(_) => None,
        }
    }

    /// Why the result was skipped, if it was.
    #[must_use]
    pub const fn skip_reason(&self) -> Option<SkipReason> {
        match self {
            Self::Skipped(reason) => Some(*reason),
            Self::Processed(_) | Self::Failed(_) => None,
        }
    }
}

/// Receives processing failures, synchronously on the processing thread.
pub trait FailureCallback: Send + Sync {
    /// Called once per failed request.
    fn on_error(&self, failure: &ProcessingFailure);
}

impl<F> FailureCallback for F
where
    F: Fn(&ProcessingFailure) + Send + Sync,
{
    fn on_error(&self, failure: &ProcessingFailure) {
        self(failure);
    }
}

/// Default callback: log the failure at `warn` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFailures;

impl FailureCallback for LogFailures {
    fn on_error(&self, failure: &ProcessingFailure) {
        log::warn!("{failure}");
    }
}

/// Applies request transforms to decode results.
pub struct ResultProcessor {
    pool: Arc<BufferPool>,
    callback: Box<dyn FailureCallback>,
}

impl ResultProcessor {
    /// Create a processor that reclaims buffers into `pool` and logs
    /// failures.
    #[must_use]
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self {
            pool,
            callback: Box::new(LogFailures),
        }
    }

    /// Replace the failure callback.
    #[must_use]
    pub fn with_failure_callback(mut self, callback: impl FailureCallback + 'static) -> Self {
        self.callback = Box::new(callback);
        self
    }

    /// The pool stale buffers are returned to.
    #[must_use]
    pub const fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Run the request's transform over `result`.
    ///
    /// Results that are banned, not a still image, without a live
    /// buffer, or whose request has no transform are skipped. The first
    /// three also waive the request's processing stage.
    ///
    /// On success the result holds the transform output, the previous
    /// buffer has been returned to the pool (unless the transform kept
    /// it or released it itself), and the request is left in
    /// [`RequestState::Processing`] for the display stage to complete.
    ///
    /// On failure the result is left holding its original buffer, unless
    /// the transform released it, in which case the result holds none.
    /// The failure is reported to the callback and the request is failed.
    ///
    /// # Errors
    ///
    /// Returns [`PoolMisuseError`] if a buffer was used outside its
    /// lifetime, either by the transform or by the caller. This is a
    /// programming error and is never reported as a request failure.
    pub fn process(
        &self,
        request: &mut LoadRequest,
        result: &mut DecodeResult,
    ) -> Result<ProcessOutcome, PoolMisuseError> {
        if result.is_banned_from_processing() {
            return Ok(skip(request, SkipReason::Banned));
        }
        let buffer = match result.payload() {
            DecodedPayload::Bitmap(buffer) => buffer.clone(),
            DecodedPayload::Animated { .. } => return Ok(skip(request, SkipReason::NotBitmap)),
        };
        let Some(input) = buffer.filter(|b| !b.is_released()) else {
            return Ok(skip(request, SkipReason::BufferAbsent));
        };
        let Some(transform) = request.options().transform().cloned() else {
            return Ok(skip(request, SkipReason::NoTransform));
        };

        let transform_key = transform.key();
        if let Err(err) = request.transition(RequestState::Processing) {
            return Ok(self.fail(request, transform_key, err.into()));
        }

        let started = Instant::now();
        let applied = transform.apply(
            &self.pool,
            &input,
            request.options().resize(),
            request.options().low_quality(),
        );
        let duration = started.elapsed();

        let output = match applied {
            Ok(output) => output,
            Err(TransformError::Buffer(misuse)) => {
                log::error!(
                    "transform {transform_key} misused a buffer for {}: {misuse}",
                    request.key()
                );
                return Err(misuse);
            }
            Err(err) => {
                forget_released_input(result, &input);
                return Ok(self.fail(request, transform_key, err.into()));
            }
        };
        let replaced = !output.same_instance(&input);

        if let Err(corrupt) = check_output(&output) {
            if replaced && !output.is_released() {
                self.pool.release(&output)?;
            }
            forget_released_input(result, &input);
            return Ok(self.fail(request, transform_key, corrupt.into()));
        }

        let reclaimed = if replaced && !input.is_released() {
            Some(self.pool.release(&input)?)
        } else {
            None
        };
        if replaced {
            if reclaimed.is_none() {
                log::debug!("transform {transform_key} released its input itself");
            }
            result.set_buffer(Some(output.clone()));
        }
        result.record_transform(transform_key.clone());

        Ok(ProcessOutcome::Processed(ProcessDiagnostics {
            transform: transform_key,
            duration,
            input: input.info(),
            output: output.info(),
            replaced,
            reclaimed,
            pool: self.pool.stats(),
        }))
    }

    fn fail(
        &self,
        request: &mut LoadRequest,
        transform_key: String,
        cause: FailureCause,
    ) -> ProcessOutcome {
        let failure = ProcessingFailure {
            cause,
            request_key: request.key().to_string(),
            transform_key,
        };
        log::debug!("{failure} (pool: {:?})", self.pool.stats());
        self.callback.on_error(&failure);
        if let Err(err) = request.transition(RequestState::Failed) {
            log::warn!("could not fail request {}: {err}", request.key());
        }
        ProcessOutcome::Failed(failure)
    }
}

impl fmt::Debug for ResultProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResultProcessor")
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

fn skip(request: &mut LoadRequest, reason: SkipReason) -> ProcessOutcome {
    log::debug!("skipping processing of {}: {reason}", request.key());
    if reason != SkipReason::NoTransform {
        request.status_mut().waive_processing();
    }
    ProcessOutcome::Skipped(reason)
}

/// Drop the result's reference to an input the transform released
/// before failing.
fn forget_released_input(result: &mut DecodeResult, input: &PixelBuffer) {
    if input.is_released() {
        log::debug!("transform released input {} before failing", input.id());
        result.set_buffer(None);
    }
}

/// Reject outputs that cannot be displayed.
fn check_output(output: &PixelBuffer) -> Result<(), CorruptResultError> {
    if output.is_released() {
        return Err(CorruptResultError::Released { id: output.id() });
    }
    if output.is_empty() {
        return Err(CorruptResultError::Empty {
            width: output.width(),
            height: output.height(),
        });
    }
    Ok(())
}
