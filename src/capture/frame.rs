use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// One plane of a planar YUV image.
///
/// `row_stride` may exceed the logical row width (padding bytes), and
/// `pixel_stride` is 2 when chroma samples are interleaved with another
/// plane.
#[derive(Debug, Clone)]
pub struct Plane {
    /// Plane bytes - shared, cloning never copies pixel data
    pub data: Bytes,
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Bytes, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }
}

/// A camera frame in YUV 4:2:0 planar layout with independent strides.
#[derive(Debug, Clone)]
pub struct PlanarImage {
    pub y: Plane,
    pub u: Plane,
    pub v: Plane,

    /// Frame metadata
    pub meta: FrameMetadata,

    /// Capture timestamp for latency tracking
    pub timestamp: Instant,
}

impl PlanarImage {
    pub fn new(y: Plane, u: Plane, v: Plane, meta: FrameMetadata) -> Self {
        Self {
            y,
            u,
            v,
            meta,
            timestamp: Instant::now(),
        }
    }

    /// Planar view over a packed YUYV (4:2:2) capture without copying.
    ///
    /// Luma sits on every even byte. Chroma is subsampled to 4:2:0 by
    /// reading every other row: U at offset 1, V at offset 3, four bytes
    /// between samples.
    pub fn from_yuyv(data: Bytes, width: u32, height: u32, rotation: u32) -> Self {
        let row = width as usize * 2;
        let y = Plane::new(data.clone(), row, 2);
        let u = Plane::new(data.slice(1.min(data.len())..), row * 2, 4);
        let v = Plane::new(data.slice(3.min(data.len())..), row * 2, 4);
        Self::new(y, u, v, FrameMetadata::new(width, height, rotation))
    }

    /// Planar view over an NV21 buffer: V and U share the interleaved
    /// chroma rows, each read with a pixel stride of 2.
    pub fn from_nv21(data: Bytes, width: u32, height: u32, rotation: u32) -> Self {
        let luma = width as usize * height as usize;
        let chroma_row = (width as usize / 2) * 2;
        let y = Plane::new(data.slice(..luma.min(data.len())), width as usize, 1);
        let v = Plane::new(data.slice(luma.min(data.len())..), chroma_row, 2);
        let u = Plane::new(data.slice((luma + 1).min(data.len())..), chroma_row, 2);
        Self::new(y, u, v, FrameMetadata::new(width, height, rotation))
    }

    pub fn width(&self) -> u32 {
        self.meta.width
    }

    pub fn height(&self) -> u32 {
        self.meta.height
    }
}

/// Frame metadata attached to every analysis result.
///
/// `width`/`height` are the raw capture dimensions; the oriented accessors
/// swap them when the frame is rotated a quarter turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameMetadata {
    pub width: u32,
    pub height: u32,
    pub rotation: u32,
}

impl FrameMetadata {
    pub fn new(width: u32, height: u32, rotation: u32) -> Self {
        Self {
            width,
            height,
            rotation: rotation % 360,
        }
    }

    pub fn is_quarter_turn(&self) -> bool {
        self.rotation % 180 != 0
    }

    pub fn oriented_width(&self) -> u32 {
        if self.is_quarter_turn() {
            self.height
        } else {
            self.width
        }
    }

    pub fn oriented_height(&self) -> u32 {
        if self.is_quarter_turn() {
            self.width
        } else {
            self.height
        }
    }
}

/// Pixel formats a frame buffer may hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageFormat {
    Nv21,
}

/// Bytes needed for an NV21 image: full-size luma plus quarter-size V/U pairs.
pub fn nv21_len(width: u32, height: u32) -> usize {
    let size = width as usize * height as usize;
    size + 2 * (size / 4)
}
