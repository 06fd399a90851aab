//! Transform step: post-decode image manipulation.
//!
//! This module defines the [`Transform`] trait for pluggable transforms
//! and the [`TransformKind`] enum for selecting one of the built-in
//! transforms at runtime (e.g. from configuration).
//!
//! # Ownership
//!
//! A transform receives the input buffer by handle and returns the
//! buffer the result should hold from now on. Returning a clone of the
//! input means "transformed in place"; returning a different buffer
//! means the input is stale and the caller reclaims it, unless the
//! transform already released it itself.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::error::TransformError;
use crate::pool::BufferPool;
use crate::resize::ResizeFilter;
use crate::types::{PixelFormat, Resize, RgbaImage};

/// Trait for transform steps.
pub trait Transform: fmt::Debug + Send + Sync {
    /// Identity of this transform, recorded in the result's transform
    /// history and in failure reports.
    fn key(&self) -> String;

    /// Transform `input`.
    ///
    /// `resize` and `low_quality` come from the request's options.
    /// Output buffers should be acquired from `pool`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransformError`] if the transform cannot produce an
    /// output. The input must be left intact in that case.
    fn apply(
        &self,
        pool: &BufferPool,
        input: &PixelBuffer,
        resize: Option<&Resize>,
        low_quality: bool,
    ) -> Result<PixelBuffer, TransformError>;
}

/// Selects one of the built-in transforms.
///
/// Additional variants can be added without changing the
/// configuration structs that embed this enum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TransformKind {
    /// Resize to the request's [`Resize`] target.
    Resize {
        /// Resampling filter.
        #[serde(default)]
        filter: ResizeFilter,
    },
    /// Convert to grayscale in place.
    Grayscale,
    /// Gaussian blur.
    Blur {
        /// Kernel sigma. Non-positive values leave the image unchanged.
        sigma: f32,
    },
    /// Crop to the centered square and clear everything outside the
    /// inscribed circle.
    CircleCrop,
    /// Clear everything outside rounded corners.
    RoundedCorners {
        /// Corner radius in pixels, clamped to half the shorter side.
        radius: u32,
    },
}

impl Transform for TransformKind {
    fn key(&self) -> String {
        match *self {
            Self::Resize { filter } => format!("Resize({filter})"),
            Self::Grayscale => "Grayscale".to_string(),
            Self::Blur { sigma } => format!("Blur({sigma})"),
            Self::CircleCrop => "CircleCrop".to_string(),
            Self::RoundedCorners { radius } => format!("RoundedCorners({radius})"),
        }
    }

    fn apply(
        &self,
        pool: &BufferPool,
        input: &PixelBuffer,
        resize: Option<&Resize>,
        low_quality: bool,
    ) -> Result<PixelBuffer, TransformError> {
        match *self {
            Self::Resize { filter } => {
                crate::resize::resize(pool, input, resize, filter, low_quality)
            }
            Self::Grayscale => crate::grayscale::grayscale_in_place(input),
            Self::Blur { sigma } => crate::blur::blur(pool, input, sigma, low_quality),
            Self::CircleCrop => crate::mask::circle_crop(pool, input),
            Self::RoundedCorners { radius } => crate::mask::rounded_corners(pool, input, radius),
        }
    }
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.key())
    }
}

/// Format for a transform output derived from `input`.
///
/// Low quality only downgrades images without any transparency; an
/// image that uses alpha keeps its format.
pub(crate) fn output_format(input: PixelFormat, pixels: &RgbaImage, low_quality: bool) -> PixelFormat {
    let opaque = !input.has_alpha() || pixels.pixels().all(|p| p.0[3] == u8::MAX);
    if opaque {
        input.for_opaque_output(low_quality)
    } else {
        input
    }
}
