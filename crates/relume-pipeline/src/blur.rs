//! Gaussian blur transform.
//!
//! Splits a pooled buffer into channel planes, smooths each with
//! [`imageproc::filter::gaussian_blur_f32`] and writes the result into a
//! fresh buffer from the pool. The input is left untouched.

use image::{GrayImage, Luma};

use crate::buffer::{self, PixelBuffer};
use crate::error::TransformError;
use crate::pool::BufferPool;
use crate::types::{BufferInfo, PixelFormat};

/// Largest accepted sigma. The blur kernel spans `4 * sigma` pixels.
pub const MAX_SIGMA: f32 = 1024.0;

/// Blur `input` with the given `sigma`.
///
/// Non-positive sigma values and empty inputs return `input` itself.
///
/// # Errors
///
/// Returns [`TransformError::InvalidParameter`] if `sigma` is not finite
/// or exceeds [`MAX_SIGMA`], [`TransformError::Buffer`] if `input` was
/// released, and [`TransformError::Allocation`] if the output cannot be
/// acquired.
pub fn blur(
    pool: &BufferPool,
    input: &PixelBuffer,
    sigma: f32,
    low_quality: bool,
) -> Result<PixelBuffer, TransformError> {
    if !sigma.is_finite() || sigma > MAX_SIGMA {
        return Err(TransformError::InvalidParameter(format!(
            "blur sigma {sigma} must be a finite number no larger than {MAX_SIGMA}"
        )));
    }
    if sigma <= 0.0 || input.is_empty() {
        return Ok(input.clone());
    }

    let info = input.info();
    let planes = input.read(|pixels| split_planes(pixels, info))?;
    let blurred = planes.map(|plane| imageproc::filter::gaussian_blur_f32(&plane, sigma));

    let opaque = !info.format.has_alpha() || blurred[3].pixels().all(|p| p.0[0] == u8::MAX);
    let format = if opaque {
        info.format.for_opaque_output(low_quality)
    } else {
        info.format
    };
    let output = pool.acquire(BufferInfo::new(info.width, info.height, format))?;
    output.write(|pixels| merge_planes(&blurred, format, pixels))?;
    Ok(output)
}

/// One plane per RGBA channel.
fn split_planes(pixels: &[u8], info: BufferInfo) -> [GrayImage; 4] {
    let mut planes: [GrayImage; 4] =
        std::array::from_fn(|_| GrayImage::new(info.width, info.height));
    for y in 0..info.height {
        for x in 0..info.width {
            let rgba = buffer::decode_pixel(pixels, info, x, y);
            for (plane, value) in planes.iter_mut().zip(rgba) {
                plane.put_pixel(x, y, Luma([value]));
            }
        }
    }
    planes
}

fn merge_planes(planes: &[GrayImage; 4], format: PixelFormat, pixels: &mut [u8]) {
    let raw = planes.each_ref().map(|plane| plane.as_raw().as_slice());
    for (i, chunk) in pixels
        .chunks_exact_mut(format.bytes_per_pixel())
        .enumerate()
    {
        buffer::encode_pixel(chunk, format, raw.map(|plane| plane[i]));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::RgbaImage;

    /// Sharp black-to-white boundary at x=5.
    fn sharp_edge_image() -> RgbaImage {
        RgbaImage::from_fn(10, 10, |x, _y| {
            if x < 5 {
                image::Rgba([0, 0, 0, 255])
            } else {
                image::Rgba([255, 255, 255, 255])
            }
        })
    }

    fn pooled(pool: &BufferPool, image: &RgbaImage) -> PixelBuffer {
        pool.acquire_rgba(image, PixelFormat::Rgba8).unwrap()
    }

    #[test]
    fn zero_sigma_returns_same_instance() {
        let pool = BufferPool::default();
        let input = pooled(&pool, &sharp_edge_image());
        let output = blur(&pool, &input, 0.0, false).unwrap();
        assert!(output.same_instance(&input));
    }

    #[test]
    fn negative_sigma_returns_same_instance() {
        let pool = BufferPool::default();
        let input = pooled(&pool, &sharp_edge_image());
        let output = blur(&pool, &input, -1.0, false).unwrap();
        assert!(output.same_instance(&input));
    }

    #[test]
    fn nan_sigma_is_invalid() {
        let pool = BufferPool::default();
        let input = pooled(&pool, &sharp_edge_image());
        let result = blur(&pool, &input, f32::NAN, false);
        assert!(matches!(result, Err(TransformError::InvalidParameter(_))));
        assert!(!input.is_released());
    }

    #[test]
    fn blur_smooths_sharp_edge_into_new_buffer() {
        let pool = BufferPool::default();
        let input = pooled(&pool, &sharp_edge_image());
        let output = blur(&pool, &input, 2.0, false).unwrap();
        assert!(!output.same_instance(&input));
        assert_eq!(output.dimensions(), input.dimensions());

        let blurred = output.to_rgba_image().unwrap();
        let left_of_edge = blurred.get_pixel(4, 5).0[0];
        let right_of_edge = blurred.get_pixel(5, 5).0[0];
        assert!(
            left_of_edge > 0,
            "expected blur to raise left-of-edge above 0, got {left_of_edge}",
        );
        assert!(
            right_of_edge < 255,
            "expected blur to lower right-of-edge below 255, got {right_of_edge}",
        );
    }

    #[test]
    fn input_pixels_are_untouched() {
        let pool = BufferPool::default();
        let image = sharp_edge_image();
        let input = pooled(&pool, &image);
        blur(&pool, &input, 2.0, false).unwrap();
        assert_eq!(input.to_rgba_image().unwrap(), image);
    }

    #[test]
    fn uniform_image_stays_uniform() {
        let pool = BufferPool::default();
        let img = RgbaImage::from_pixel(10, 10, image::Rgba([128, 64, 200, 255]));
        let output = blur(&pool, &pooled(&pool, &img), 1.4, false).unwrap();
        for pixel in output.to_rgba_image().unwrap().pixels() {
            let diff = i16::from(pixel.0[0]) - 128;
            assert!(diff.abs() <= 1, "got {}", pixel.0[0]);
            assert_eq!(pixel.0[3], 255);
        }
    }

    #[test]
    fn non_finite_sigma_is_invalid() {
        let pool = BufferPool::default();
        let input = pooled(&pool, &sharp_edge_image());
        for sigma in [f32::INFINITY, f32::NEG_INFINITY, MAX_SIGMA * 2.0] {
            let result = blur(&pool, &input, sigma, false);
            assert!(
                matches!(result, Err(TransformError::InvalidParameter(_))),
                "sigma {sigma} gave {result:?}",
            );
        }
        assert!(!input.is_released());
    }

    #[test]
    fn translucent_input_keeps_alpha_in_low_quality() {
        let pool = BufferPool::default();
        let img = RgbaImage::from_pixel(6, 6, image::Rgba([10, 20, 30, 100]));
        let output = blur(&pool, &pooled(&pool, &img), 1.0, true).unwrap();
        assert_eq!(output.format(), PixelFormat::Rgba8);
        for pixel in output.to_rgba_image().unwrap().pixels() {
            assert!(pixel.0[3].abs_diff(100) <= 1, "alpha {}", pixel.0[3]);
        }
    }

    #[test]
    fn opaque_input_downgrades_in_low_quality() {
        let pool = BufferPool::default();
        let output = blur(&pool, &pooled(&pool, &sharp_edge_image()), 1.0, true).unwrap();
        assert_eq!(output.format(), PixelFormat::Rgb565);
    }
}
