//! Shared types for the relume result-processing stage.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Re-export `RgbaImage` so downstream crates can hand decoded pixels
/// to the pool without depending on `image` directly.
pub use image::RgbaImage;

/// Image dimensions in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dimensions {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
}

impl Dimensions {
    /// Create new dimensions.
    #[must_use]
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Total pixel count (`width * height`).
    #[must_use]
    pub const fn pixel_count(self) -> u64 {
        self.width as u64 * self.height as u64
    }

    /// Returns `true` if either axis is zero.
    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for Dimensions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// In-memory layout of a pixel buffer.
///
/// Ordered by bytes per pixel so pool bookkeeping can sort on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PixelFormat {
    /// One luminance byte per pixel. Opaque.
    Gray8,
    /// 5-6-5 packed RGB, two bytes per pixel, little-endian. Opaque.
    ///
    /// Chosen for opaque outputs when a request prefers lower memory
    /// over fidelity.
    Rgb565,
    /// Four bytes per pixel: red, green, blue, alpha.
    Rgba8,
}

impl PixelFormat {
    /// Bytes occupied by a single pixel.
    #[must_use]
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Gray8 => 1,
            Self::Rgb565 => 2,
            Self::Rgba8 => 4,
        }
    }

    /// Whether the format stores an alpha channel.
    #[must_use]
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba8)
    }

    /// Format a transform should emit for an opaque output.
    ///
    /// Low quality downgrades color formats to [`PixelFormat::Rgb565`];
    /// grayscale input stays grayscale since it is already smaller.
    #[must_use]
    pub const fn for_opaque_output(self, low_quality: bool) -> Self {
        match self {
            Self::Gray8 => Self::Gray8,
            Self::Rgb565 | Self::Rgba8 if low_quality => Self::Rgb565,
            other => other,
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gray8 => f.write_str("Gray8"),
            Self::Rgb565 => f.write_str("Rgb565"),
            Self::Rgba8 => f.write_str("Rgba8"),
        }
    }
}

/// Shape of a pixel buffer: dimensions plus pixel format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BufferInfo {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Pixel layout.
    pub format: PixelFormat,
}

impl BufferInfo {
    /// Create a new buffer description.
    #[must_use]
    pub const fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    /// The buffer's dimensions.
    #[must_use]
    pub const fn dimensions(self) -> Dimensions {
        Dimensions::new(self.width, self.height)
    }

    /// Number of bytes the pixel data occupies, or `None` if it does
    /// not fit in `usize`.
    #[must_use]
    pub fn byte_len(self) -> Option<usize> {
        usize::try_from(self.width)
            .ok()?
            .checked_mul(usize::try_from(self.height).ok()?)?
            .checked_mul(self.format.bytes_per_pixel())
    }
}

impl fmt::Display for BufferInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{} {}", self.width, self.height, self.format)
    }
}

/// How a [`Resize`] target box is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ResizeMode {
    /// Scale uniformly so the image fits inside the target box.
    #[default]
    Fit,
    /// Stretch to exactly the target box.
    Exact,
}

/// Resize target attached to a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resize {
    /// Target width in pixels.
    pub width: u32,
    /// Target height in pixels.
    pub height: u32,
    /// How the target box is applied.
    #[serde(default)]
    pub mode: ResizeMode,
}

impl Resize {
    /// A resize that fits the image inside `width x height`.
    #[must_use]
    pub const fn fit(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mode: ResizeMode::Fit,
        }
    }

    /// A resize that stretches the image to exactly `width x height`.
    #[must_use]
    pub const fn exact(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            mode: ResizeMode::Exact,
        }
    }

    /// Compute output dimensions for an image of size `source`.
    ///
    /// `Fit` preserves the aspect ratio and never produces a zero axis.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn target_for(self, source: Dimensions) -> Dimensions {
        match self.mode {
            ResizeMode::Exact => Dimensions::new(self.width, self.height),
            ResizeMode::Fit => {
                if source.is_empty() {
                    return source;
                }
                let scale = (f64::from(self.width) / f64::from(source.width))
                    .min(f64::from(self.height) / f64::from(source.height));
                let width = (f64::from(source.width) * scale).round().max(1.0) as u32;
                let height = (f64::from(source.height) * scale).round().max(1.0) as u32;
                Dimensions::new(width, height)
            }
        }
    }
}

/// Source image facts reported by the decode stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    /// Width of the encoded source in pixels.
    pub width: u32,
    /// Height of the encoded source in pixels.
    pub height: u32,
    /// MIME type of the encoded source, e.g. `image/png`.
    pub mime_type: String,
}

impl ImageInfo {
    /// Create new image info.
    #[must_use]
    pub fn new(width: u32, height: u32, mime_type: impl Into<String>) -> Self {
        Self {
            width,
            height,
            mime_type: mime_type.into(),
        }
    }
}
