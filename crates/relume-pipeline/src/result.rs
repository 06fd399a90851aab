//! Decode results handed from the decode stage to the processor.

use crate::buffer::PixelBuffer;
use crate::types::ImageInfo;

/// What the decoder produced.
#[derive(Debug, Clone)]
pub enum DecodedPayload {
    /// A single still image. The buffer may be missing if the decoder
    /// gave up after allocating the result.
    Bitmap(Option<PixelBuffer>),
    /// An animated image. Frames are decoded lazily by the consumer and
    /// never pass through the processor.
    Animated {
        /// Number of frames in the animation.
        frame_count: u32,
    },
}

/// Output of the decode stage for one request.
#[derive(Debug, Clone)]
pub struct DecodeResult {
    payload: DecodedPayload,
    info: ImageInfo,
    banned_from_processing: bool,
    processed: bool,
    transformed: Vec<String>,
}

impl DecodeResult {
    /// A still-image result wrapping `buffer`.
    #[must_use]
    pub const fn bitmap(buffer: PixelBuffer, info: ImageInfo) -> Self {
        Self::new(DecodedPayload::Bitmap(Some(buffer)), info)
    }

    /// A result with an arbitrary payload.
    #[must_use]
    pub const fn new(payload: DecodedPayload, info: ImageInfo) -> Self {
        Self {
            payload,
            info,
            banned_from_processing: false,
            processed: false,
            transformed: Vec::new(),
        }
    }

    /// Exclude this result from processing (e.g. the decoder already
    /// produced a thumbnail that must be shown as-is).
    #[must_use]
    pub fn banned(mut self) -> Self {
        self.banned_from_processing = true;
        self
    }

    /// The decoded payload.
    #[must_use]
    pub const fn payload(&self) -> &DecodedPayload {
        &self.payload
    }

    /// The still-image buffer, if the payload carries one.
    #[must_use]
    pub const fn buffer(&self) -> Option<&PixelBuffer> {
        match &self.payload {
            DecodedPayload::Bitmap(buffer) => buffer.as_ref(),
            DecodedPayload::Animated { .. } => None,
        }
    }

    /// Source image facts.
    #[must_use]
    pub const fn info(&self) -> &ImageInfo {
        &self.info
    }

    /// Whether processing is disallowed for this result.
    #[must_use]
    pub const fn is_banned_from_processing(&self) -> bool {
        self.banned_from_processing
    }

    /// Whether the buffer is the output of a completed transform.
    #[must_use]
    pub const fn is_processed(&self) -> bool {
        self.processed
    }

    /// Keys of the transforms applied so far, oldest first.
    #[must_use]
    pub fn transformed(&self) -> &[String] {
        &self.transformed
    }

    /// Replace the bitmap buffer. No-op for other payloads.
    pub(crate) fn set_buffer(&mut self, buffer: Option<PixelBuffer>) {
        if let DecodedPayload::Bitmap(slot) = &mut self.payload {
            *slot = buffer;
        }
    }

    pub(crate) fn record_transform(&mut self, key: String) {
        self.transformed.push(key);
        self.processed = true;
    }
}
