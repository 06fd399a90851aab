//! Resizing to a request's target box.
//!
//! Scales the input so it fits (or exactly fills) the [`Resize`] target
//! attached to the request. If no target is set, or the image already
//! has the target size and needs no format change, the input is
//! returned unchanged as the same instance.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::buffer::PixelBuffer;
use crate::error::{PoolError, TransformError};
use crate::pool::BufferPool;
use crate::transform::output_format;
use crate::types::{BufferInfo, Dimensions, PixelFormat, Resize};

/// Resampling filter used when resizing.
///
/// Ordered from fastest/lowest-quality to slowest/highest-quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeFilter {
    /// Nearest-neighbor: fastest, blocky artifacts.
    Nearest,
    /// Bilinear interpolation: fast, decent quality.
    #[default]
    Triangle,
    /// Bicubic (Catmull-Rom): moderate speed, good quality.
    CatmullRom,
    /// Gaussian: moderate speed, smooth output.
    Gaussian,
    /// Lanczos with 3 lobes: slowest, sharpest/best for photos.
    Lanczos3,
}

impl ResizeFilter {
    /// Convert to the `image` crate's `FilterType`.
    const fn to_image_filter(self) -> image::imageops::FilterType {
        match self {
            Self::Nearest => image::imageops::FilterType::Nearest,
            Self::Triangle => image::imageops::FilterType::Triangle,
            Self::CatmullRom => image::imageops::FilterType::CatmullRom,
            Self::Gaussian => image::imageops::FilterType::Gaussian,
            Self::Lanczos3 => image::imageops::FilterType::Lanczos3,
        }
    }
}

impl fmt::Display for ResizeFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Nearest => f.write_str("Nearest"),
            Self::Triangle => f.write_str("Triangle"),
            Self::CatmullRom => f.write_str("CatmullRom"),
            Self::Gaussian => f.write_str("Gaussian"),
            Self::Lanczos3 => f.write_str("Lanczos3"),
        }
    }
}

/// Resize `input` to `resize` using `filter`.
///
/// The output is a new buffer acquired from `pool`, or `input` itself
/// when there is nothing to do.
///
/// # Errors
///
/// Returns [`TransformError::InvalidParameter`] if the target has a zero
/// axis, [`TransformError::Buffer`] if `input` was released, and
/// [`TransformError::Allocation`] if the output or the resampling
/// scratch space would exceed the pool's per-buffer limit. The limit is
/// checked before anything is allocated.
pub fn resize(
    pool: &BufferPool,
    input: &PixelBuffer,
    resize: Option<&Resize>,
    filter: ResizeFilter,
    low_quality: bool,
) -> Result<PixelBuffer, TransformError> {
    let Some(resize) = resize else {
        return Ok(input.clone());
    };

    let target = resize.target_for(input.dimensions());
    if target.is_empty() {
        return Err(TransformError::InvalidParameter(format!(
            "resize target {target} has no pixels"
        )));
    }

    let rgba = input.to_rgba_image()?;
    let format = output_format(input.format(), &rgba, low_quality);
    if target == input.dimensions() && format == input.format() {
        return Ok(input.clone());
    }

    check_target(pool, input.dimensions(), target)?;
    let resized = image::imageops::resize(
        &rgba,
        target.width,
        target.height,
        filter.to_image_filter(),
    );
    Ok(pool.acquire_rgba(&resized, format)?)
}

/// Refuse targets whose RGBA output, or whose vertical resampling pass
/// (source-width rows at the target height), the pool would not hand
/// out.
fn check_target(
    pool: &BufferPool,
    source: Dimensions,
    target: Dimensions,
) -> Result<(), PoolError> {
    let output = BufferInfo::new(target.width, target.height, PixelFormat::Rgba8);
    pool.checked_len(output)?;
    pool.checked_len(BufferInfo::new(source.width, target.height, PixelFormat::Rgba8))
        .map(|_| ())
        .map_err(|_| PoolError::Oversized {
            width: output.width,
            height: output.height,
            format: output.format,
        })
}
