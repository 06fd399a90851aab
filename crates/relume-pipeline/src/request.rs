//! Request lifecycle tracking.
//!
//! A [`LoadRequest`] carries the request key (usually the source URI),
//! the immutable [`TransformOptions`] attached to it, and a
//! [`RequestStatus`] state machine that only moves forward:
//!
//! ```text
//! Pending -> Decoding -> Processing -> Completed
//!    \__________\____________\_______> Failed
//! ```

use std::fmt;
use std::sync::Arc;

use crate::error::InvalidTransitionError;
use crate::transform::Transform;
use crate::types::Resize;

/// Lifecycle stage of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RequestState {
    /// Created, not yet decoding.
    #[default]
    Pending,
    /// Source bytes are being decoded.
    Decoding,
    /// The decoded result is being transformed.
    Processing,
    /// Finished successfully. Terminal.
    Completed,
    /// Finished with an error. Terminal.
    Failed,
}

impl RequestState {
    /// Returns `true` for [`Completed`](Self::Completed) and
    /// [`Failed`](Self::Failed).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Decoding => 1,
            Self::Processing => 2,
            Self::Completed | Self::Failed => 3,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => f.write_str("Pending"),
            Self::Decoding => f.write_str("Decoding"),
            Self::Processing => f.write_str("Processing"),
            Self::Completed => f.write_str("Completed"),
            Self::Failed => f.write_str("Failed"),
        }
    }
}

/// Forward-only state machine for one request.
#[derive(Debug, Clone)]
pub struct RequestStatus {
    current: RequestState,
    history: Vec<RequestState>,
    requires_processing: bool,
}

impl RequestStatus {
    /// Create a status in [`RequestState::Pending`].
    ///
    /// With `requires_processing`, the request cannot complete without
    /// passing through [`RequestState::Processing`] unless processing is
    /// waived.
    #[must_use]
    pub fn new(requires_processing: bool) -> Self {
        Self {
            current: RequestState::Pending,
            history: vec![RequestState::Pending],
            requires_processing,
        }
    }

    /// The current state.
    #[must_use]
    pub const fn current_state(&self) -> RequestState {
        self.current
    }

    /// Every state entered so far, oldest first.
    #[must_use]
    pub fn history(&self) -> &[RequestState] {
        &self.history
    }

    /// Allow completion without a processing stage.
    ///
    /// Used when the result cannot be processed at all (banned, not a
    /// bitmap, or without a live buffer).
    pub const fn waive_processing(&mut self) {
        self.requires_processing = false;
    }

    /// Move to `to`.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidTransitionError`] if the request is already in a
    /// terminal state, if `to` does not come strictly after the current
    /// state, or if `to` is [`RequestState::Completed`] while a required
    /// processing stage has not been entered. Entering
    /// [`RequestState::Failed`] is allowed from every non-terminal state.
    pub fn transition(&mut self, to: RequestState) -> Result<(), InvalidTransitionError> {
        let from = self.current;
        let allowed = !from.is_terminal()
            && (to == RequestState::Failed
                || (to.rank() > from.rank()
                    && !(to == RequestState::Completed
                        && self.requires_processing
                        && !self.history.contains(&RequestState::Processing))));
        if !allowed {
            return Err(InvalidTransitionError { from, to });
        }

        log::trace!("request state {from} -> {to}");
        self.current = to;
        self.history.push(to);
        Ok(())
    }
}

/// Options attached to a request. Immutable once the request exists.
#[derive(Clone, Default)]
pub struct TransformOptions {
    resize: Option<Resize>,
    low_quality: bool,
    transform: Option<Arc<dyn Transform>>,
}

impl TransformOptions {
    /// Options with no resize, full quality and no transform.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the resize target.
    #[must_use]
    pub fn with_resize(mut self, resize: Resize) -> Self {
        self.resize = Some(resize);
        self
    }

    /// Prefer lower memory use over fidelity.
    #[must_use]
    pub fn with_low_quality(mut self, low_quality: bool) -> Self {
        self.low_quality = low_quality;
        self
    }

    /// Set the transform step.
    #[must_use]
    pub fn with_transform(mut self, transform: Arc<dyn Transform>) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Resize target, if any.
    #[must_use]
    pub const fn resize(&self) -> Option<&Resize> {
        self.resize.as_ref()
    }

    /// Whether lower memory use is preferred over fidelity.
    #[must_use]
    pub const fn low_quality(&self) -> bool {
        self.low_quality
    }

    /// The configured transform step, if any.
    #[must_use]
    pub fn transform(&self) -> Option<&Arc<dyn Transform>> {
        self.transform.as_ref()
    }
}

impl fmt::Debug for TransformOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransformOptions")
            .field("resize", &self.resize)
            .field("low_quality", &self.low_quality)
            .field("transform", &self.transform.as_ref().map(|t| t.key()))
            .finish()
    }
}

/// One image load, identified by its key.
#[derive(Debug, Clone)]
pub struct LoadRequest {
    key: String,
    options: TransformOptions,
    status: RequestStatus,
}

impl LoadRequest {
    /// Create a pending request.
    #[must_use]
    pub fn new(key: impl Into<String>, options: TransformOptions) -> Self {
        let status = RequestStatus::new(options.transform().is_some());
        Self {
            key: key.into(),
            options,
            status,
        }
    }

    /// Identifying key, e.g. the source URI.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Options attached at creation.
    #[must_use]
    pub const fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> RequestState {
        self.status.current_state()
    }

    /// The lifecycle state machine.
    #[must_use]
    pub const fn status(&self) -> &RequestStatus {
        &self.status
    }

    pub(crate) const fn status_mut(&mut self) -> &mut RequestStatus {
        &mut self.status
    }

    /// Move the request to `to`.
    ///
    /// # Errors
    ///
    /// See [`RequestStatus::transition`].
    pub fn transition(&mut self, to: RequestState) -> Result<(), InvalidTransitionError> {
        self.status.transition(to)
    }
}
