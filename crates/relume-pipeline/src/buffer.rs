//! Pooled pixel buffer handles.
//!
//! A [`PixelBuffer`] is a cheap, clonable handle to one allocation handed
//! out by a [`BufferPool`](crate::BufferPool). Clones refer to the same
//! instance. Every hand-out carries a fresh [`BufferId`] which acts as a
//! generation id: once the pool takes the storage back, the handle (and
//! all of its clones) is permanently released, and any further access
//! fails with [`PoolMisuseError`] instead of touching memory that may
//! already belong to another buffer.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::PoolMisuseError;
use crate::types::{BufferInfo, Dimensions, PixelFormat, RgbaImage};

/// Generation id of a pooled buffer. Never reused within a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub(crate) u64);

impl BufferId {
    /// The raw id value.
    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

struct BufferCell {
    id: BufferId,
    info: BufferInfo,
    /// `None` once the storage has been returned to the pool.
    pixels: Mutex<Option<Vec<u8>>>,
}

/// Handle to a pooled pixel buffer.
#[derive(Clone)]
pub struct PixelBuffer {
    cell: Arc<BufferCell>,
}

impl PixelBuffer {
    /// Wrap storage handed out by the pool. `pixels.len()` must equal
    /// `info.byte_len()`.
    pub(crate) fn from_storage(id: BufferId, info: BufferInfo, pixels: Vec<u8>) -> Self {
        debug_assert_eq!(Some(pixels.len()), info.byte_len());
        Self {
            cell: Arc::new(BufferCell {
                id,
                info,
                pixels: Mutex::new(Some(pixels)),
            }),
        }
    }

    /// Generation id of this buffer.
    #[must_use]
    pub fn id(&self) -> BufferId {
        self.cell.id
    }

    /// Dimensions and pixel format.
    #[must_use]
    pub fn info(&self) -> BufferInfo {
        self.cell.info
    }

    /// Width in pixels.
    #[must_use]
    pub fn width(&self) -> u32 {
        self.cell.info.width
    }

    /// Height in pixels.
    #[must_use]
    pub fn height(&self) -> u32 {
        self.cell.info.height
    }

    /// Dimensions in pixels.
    #[must_use]
    pub fn dimensions(&self) -> Dimensions {
        self.cell.info.dimensions()
    }

    /// Pixel format.
    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.cell.info.format
    }

    /// Returns `true` if the buffer has no pixels.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cell.info.dimensions().is_empty()
    }

    /// Whether the storage has been returned to the pool.
    #[must_use]
    pub fn is_released(&self) -> bool {
        self.lock().is_none()
    }

    /// Whether `other` is a handle to the same buffer instance.
    #[must_use]
    pub fn same_instance(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Run `f` over the raw pixel bytes.
    ///
    /// # Errors
    ///
    /// Returns [`PoolMisuseError::UseAfterRelease`] if the buffer has
    /// been released.
    pub fn read<T>(&self, f: impl FnOnce(&[u8]) -> T) -> Result<T, PoolMisuseError> {
        let guard = self.lock();
        let pixels = guard
            .as_deref()
            .ok_or(PoolMisuseError::UseAfterRelease { id: self.id() })?;
        Ok(f(pixels))
    }

    /// Run `f` over the raw pixel bytes, mutably.
    ///
    /// # Errors
    ///
    /// Returns [`PoolMisuseError::UseAfterRelease`] if the buffer has
    /// been released.
    pub fn write<T>(&self, f: impl FnOnce(&mut [u8]) -> T) -> Result<T, PoolMisuseError> {
        let mut guard = self.lock();
        let pixels = guard
            .as_deref_mut()
            .ok_or(PoolMisuseError::UseAfterRelease { id: self.id() })?;
        Ok(f(pixels))
    }

    /// Decode the buffer into an owned RGBA image.
    ///
    /// # Errors
    ///
    /// Returns [`PoolMisuseError::UseAfterRelease`] if the buffer has
    /// been released.
    pub fn to_rgba_image(&self) -> Result<RgbaImage, PoolMisuseError> {
        let info = self.info();
        self.read(|pixels| {
            RgbaImage::from_fn(info.width, info.height, |x, y| {
                image::Rgba(decode_pixel(pixels, info, x, y))
            })
        })
    }

    /// Take the storage out of the handle, leaving it released.
    pub(crate) fn take_storage(&self) -> Result<Vec<u8>, PoolMisuseError> {
        self.lock()
            .take()
            .ok_or(PoolMisuseError::DoubleRelease { id: self.id() })
    }

    fn lock(&self) -> MutexGuard<'_, Option<Vec<u8>>> {
        self.cell
            .pixels
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for PixelBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PixelBuffer")
            .field("id", &self.cell.id)
            .field("info", &self.cell.info)
            .field("released", &self.is_released())
            .finish()
    }
}

/// Read pixel `(x, y)` from raw storage as RGBA.
pub(crate) fn decode_pixel(pixels: &[u8], info: BufferInfo, x: u32, y: u32) -> [u8; 4] {
    let bpp = info.format.bytes_per_pixel();
    let offset = (y as usize * info.width as usize + x as usize) * bpp;
    match info.format {
        PixelFormat::Rgba8 => [
            pixels[offset],
            pixels[offset + 1],
            pixels[offset + 2],
            pixels[offset + 3],
        ],
        PixelFormat::Rgb565 => {
            let [r, g, b] = unpack_rgb565(u16::from_le_bytes([pixels[offset], pixels[offset + 1]]));
            [r, g, b, 255]
        }
        PixelFormat::Gray8 => {
            let l = pixels[offset];
            [l, l, l, 255]
        }
    }
}

/// Write an RGBA image into raw storage laid out as `format`.
///
/// `pixels` must be exactly `width * height * bytes_per_pixel` long.
/// Alpha is dropped for opaque formats.
pub(crate) fn encode_rgba(image: &RgbaImage, format: PixelFormat, pixels: &mut [u8]) {
    let bpp = format.bytes_per_pixel();
    for (chunk, pixel) in pixels.chunks_exact_mut(bpp).zip(image.pixels()) {
        encode_pixel(chunk, format, pixel.0);
    }
}

/// Write one RGBA pixel into a `format`-sized chunk.
pub(crate) fn encode_pixel(chunk: &mut [u8], format: PixelFormat, [r, g, b, a]: [u8; 4]) {
    match format {
        PixelFormat::Rgba8 => chunk.copy_from_slice(&[r, g, b, a]),
        PixelFormat::Rgb565 => chunk.copy_from_slice(&pack_rgb565(r, g, b).to_le_bytes()),
        PixelFormat::Gray8 => chunk[0] = luminance(r, g, b),
    }
}

/// ITU-R BT.601 luma: `0.299*R + 0.587*G + 0.114*B`, in fixed point.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn luminance(r: u8, g: u8, b: u8) -> u8 {
    ((299 * r as u32 + 587 * g as u32 + 114 * b as u32 + 500) / 1000) as u8
}

pub(crate) const fn pack_rgb565(r: u8, g: u8, b: u8) -> u16 {
    ((r as u16 >> 3) << 11) | ((g as u16 >> 2) << 5) | (b as u16 >> 3)
}

#[allow(clippy::cast_possible_truncation)]
pub(crate) const fn unpack_rgb565(value: u16) -> [u8; 3] {
    let r5 = ((value >> 11) & 0x1F) as u8;
    let g6 = ((value >> 5) & 0x3F) as u8;
    let b5 = (value & 0x1F) as u8;
    [(r5 << 3) | (r5 >> 2), (g6 << 2) | (g6 >> 4), (b5 << 3) | (b5 >> 2)]
}
