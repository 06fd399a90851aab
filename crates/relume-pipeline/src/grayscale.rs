//! In-place grayscale conversion.
//!
//! Rewrites the color channels of a pooled buffer with their BT.601
//! luminance. The buffer keeps its format and identity, so the result
//! processor sees an in-place transform and reclaims nothing.

use crate::buffer::{PixelBuffer, luminance, pack_rgb565, unpack_rgb565};
use crate::error::TransformError;
use crate::types::PixelFormat;

/// Convert `input` to grayscale in place and return it.
///
/// # Errors
///
/// Returns [`TransformError::Buffer`] if `input` was released.
pub fn grayscale_in_place(input: &PixelBuffer) -> Result<PixelBuffer, TransformError> {
    let format = input.format();
    input.write(|pixels| match format {
        PixelFormat::Rgba8 => {
            for chunk in pixels.chunks_exact_mut(4) {
                let l = luminance(chunk[0], chunk[1], chunk[2]);
                chunk[..3].fill(l);
            }
        }
        PixelFormat::Rgb565 => {
            for chunk in pixels.chunks_exact_mut(2) {
                let [r, g, b] = unpack_rgb565(u16::from_le_bytes([chunk[0], chunk[1]]));
                let l = luminance(r, g, b);
                chunk.copy_from_slice(&pack_rgb565(l, l, l).to_le_bytes());
            }
        }
        // Already gray.
        PixelFormat::Gray8 => {}
    })?;
    Ok(input.clone())
}
