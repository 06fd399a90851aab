//! Shape masks: circle crop and rounded corners.
//!
//! Both transforms clear every pixel whose center falls outside the
//! shape to fully transparent black. The output is always
//! [`PixelFormat::Rgba8`] since the mask needs an alpha channel.

use crate::buffer::PixelBuffer;
use crate::error::TransformError;
use crate::pool::BufferPool;
use crate::types::{PixelFormat, RgbaImage};

const TRANSPARENT: image::Rgba<u8> = image::Rgba([0, 0, 0, 0]);

/// Crop `input` to its centered square and clear everything outside the
/// inscribed circle.
///
/// Empty inputs are returned unchanged.
///
/// # Errors
///
/// Returns [`TransformError::Buffer`] if `input` was released and
/// [`TransformError::Allocation`] if the output cannot be acquired.
pub fn circle_crop(pool: &BufferPool, input: &PixelBuffer) -> Result<PixelBuffer, TransformError> {
    if input.is_empty() {
        return Ok(input.clone());
    }

    let rgba = input.to_rgba_image()?;
    let (w, h) = rgba.dimensions();
    let side = w.min(h);
    let mut square =
        image::imageops::crop_imm(&rgba, (w - side) / 2, (h - side) / 2, side, side).to_image();

    let radius = f64::from(side) / 2.0;
    let center = (radius, radius);
    for (x, y, pixel) in square.enumerate_pixels_mut() {
        if !is_inside(pixel_center(x, y), center, radius * radius) {
            *pixel = TRANSPARENT;
        }
    }

    Ok(pool.acquire_rgba(&square, PixelFormat::Rgba8)?)
}

/// Round the corners of `input` with the given `radius`.
///
/// The radius is clamped to half the shorter side. A zero radius (or an
/// empty input) returns `input` unchanged.
///
/// # Errors
///
/// Returns [`TransformError::Buffer`] if `input` was released and
/// [`TransformError::Allocation`] if the output cannot be acquired.
pub fn rounded_corners(
    pool: &BufferPool,
    input: &PixelBuffer,
    radius: u32,
) -> Result<PixelBuffer, TransformError> {
    let radius = radius.min(input.width().min(input.height()) / 2);
    if radius == 0 {
        return Ok(input.clone());
    }

    let mut rgba = input.to_rgba_image()?;
    apply_rounded_corners(&mut rgba, radius);
    Ok(pool.acquire_rgba(&rgba, PixelFormat::Rgba8)?)
}

fn apply_rounded_corners(image: &mut RgbaImage, radius: u32) {
    let (w, h) = (f64::from(image.width()), f64::from(image.height()));
    let r = f64::from(radius);
    for (x, y, pixel) in image.enumerate_pixels_mut() {
        let p = pixel_center(x, y);
        // Nearest point of the inner rectangle the corner arcs are centered on.
        let nearest = (p.0.clamp(r, w - r), p.1.clamp(r, h - r));
        if !is_inside(p, nearest, r * r) {
            *pixel = TRANSPARENT;
        }
    }
}

fn pixel_center(x: u32, y: u32) -> (f64, f64) {
    (f64::from(x) + 0.5, f64::from(y) + 0.5)
}

/// Check if a point is inside (or on) a circle.
fn is_inside(p: (f64, f64), center: (f64, f64), radius_sq: f64) -> bool {
    let dx = p.0 - center.0;
    let dy = p.1 - center.1;
    dx.mul_add(dx, dy * dy) <= radius_sq + 1e-9
}
