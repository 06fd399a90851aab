//! Processor configuration.
//!
//! Loaded at the edge (the bench CLI parses JSON or flags) and turned
//! into the pieces the library works with: a [`BufferPool`] and the
//! [`TransformOptions`] attached to each request.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::blur::MAX_SIGMA;
use crate::error::ConfigError;
use crate::pool::{BufferPool, PoolConfig};
use crate::request::TransformOptions;
use crate::transform::TransformKind;
use crate::types::Resize;

/// Configuration for a processing run.
///
/// All fields have defaults, so a partial JSON object is valid.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Buffer pool limits.
    pub pool: PoolConfig,

    /// Transform applied to every request. `None` passes results
    /// through untouched.
    pub transform: Option<TransformKind>,

    /// Resize target handed to the transform.
    pub resize: Option<Resize>,

    /// Prefer lower memory use over fidelity.
    pub low_quality: bool,
}

impl ProcessorConfig {
    /// Check that all values are in range.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] if the pool limits are invalid,
    /// the blur sigma is not finite or exceeds [`MAX_SIGMA`], or the
    /// resize target has a zero axis.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pool.validate()?;
        if let Some(TransformKind::Blur { sigma }) = self.transform
            && (!sigma.is_finite() || sigma > MAX_SIGMA)
        {
            return Err(ConfigError::Invalid(format!(
                "blur sigma {sigma} must be a finite number no larger than {MAX_SIGMA}"
            )));
        }
        if let Some(resize) = self.resize
            && (resize.width == 0 || resize.height == 0)
        {
            return Err(ConfigError::Invalid(format!(
                "resize target {}x{} has a zero axis",
                resize.width, resize.height
            )));
        }
        Ok(())
    }

    /// Build a pool from [`Self::pool`].
    #[must_use]
    pub fn build_pool(&self) -> Arc<BufferPool> {
        Arc::new(BufferPool::new(self.pool))
    }

    /// Request options described by this configuration.
    #[must_use]
    pub fn transform_options(&self) -> TransformOptions {
        let mut options = TransformOptions::new().with_low_quality(self.low_quality);
        if let Some(resize) = self.resize {
            options = options.with_resize(resize);
        }
        if let Some(transform) = self.transform {
            options = options.with_transform(Arc::new(transform));
        }
        options
    }
}
