use std::fmt;

use image::RgbImage;
use once_cell::sync::OnceCell;

use super::pool::PooledBuffer;
use crate::capture::convert::{nv21_to_rgb, rotate};
use crate::capture::frame::{FrameMetadata, ImageFormat};
use crate::error::{AnalyzeError, ConvertError};

/// A successful analysis: the NV21 frame it came from, its metadata and the
/// decoded payload.
///
/// Owns the frame buffer; the buffer goes back to its pool when the result
/// is dropped.
pub struct AnalyzeResult<T> {
    buffer: PooledBuffer,
    format: ImageFormat,
    meta: FrameMetadata,
    bitmap: OnceCell<RgbImage>,
    result: T,
}

impl<T> AnalyzeResult<T> {
    pub fn new(buffer: PooledBuffer, format: ImageFormat, meta: FrameMetadata, result: T) -> Self {
        Self {
            buffer,
            format,
            meta,
            bitmap: OnceCell::new(),
            result,
        }
    }

    pub fn image_data(&self) -> &[u8] {
        &self.buffer
    }

    pub fn image_format(&self) -> ImageFormat {
        self.format
    }

    pub fn frame_metadata(&self) -> &FrameMetadata {
        &self.meta
    }

    /// Upright RGB rendering of the frame, built on first access.
    pub fn bitmap(&self) -> Result<&RgbImage, ConvertError> {
        self.bitmap.get_or_try_init(|| {
            let rgb = nv21_to_rgb(&self.buffer, self.meta.width, self.meta.height)?;
            Ok(rotate(rgb, self.meta.rotation))
        })
    }

    pub fn bitmap_width(&self) -> u32 {
        self.meta.oriented_width()
    }

    pub fn bitmap_height(&self) -> u32 {
        self.meta.oriented_height()
    }

    pub fn result(&self) -> &T {
        &self.result
    }
}

impl<T: fmt::Debug> fmt::Debug for AnalyzeResult<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnalyzeResult")
            .field("format", &self.format)
            .field("meta", &self.meta)
            .field("result", &self.result)
            .finish()
    }
}

/// How one analysis attempt settled.
///
/// `Failure(None)` means the decoder ran and found nothing; a cause is
/// attached when conversion or the backend failed.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(AnalyzeResult<T>),
    Failure(Option<AnalyzeError>),
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn into_result(self) -> Option<AnalyzeResult<T>> {
        match self {
            Outcome::Success(result) => Some(result),
            Outcome::Failure(_) => None,
        }
    }
}
