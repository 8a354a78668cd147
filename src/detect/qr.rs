//! QR code detection using the rqrr crate

use image::GrayImage;
use tracing::{debug, trace};

use super::{DetectedSymbol, Detector, SymbolFormat};
use crate::error::DecodeError;
use crate::geometry::{Point, Rect};

/// QR-only detector
#[derive(Debug, Default)]
pub struct QrDetector;

impl QrDetector {
    pub fn new() -> Self {
        Self
    }
}

impl Detector for QrDetector {
    fn name(&self) -> &'static str {
        "rqrr"
    }

    fn detect(&self, image: &GrayImage) -> Result<Vec<DetectedSymbol>, DecodeError> {
        let (width, height) = image.dimensions();
        let mut prepared = rqrr::PreparedImage::prepare_from_greyscale(
            width as usize,
            height as usize,
            |x, y| image.get_pixel(x as u32, y as u32)[0],
        );

        let grids = prepared.detect_grids();
        trace!(grids = grids.len(), "rqrr grid scan");
        if grids.is_empty() {
            return Ok(Vec::new());
        }

        let mut symbols = Vec::with_capacity(grids.len());
        let mut last_error = None;
        for grid in grids {
            match grid.decode() {
                Ok((meta, content)) => {
                    let corners = grid.bounds.iter().map(|p| Point::new(p.x as f32, p.y as f32));
                    let Some(bounds) = Rect::bounding(corners) else {
                        continue;
                    };
                    debug!(version = ?meta.version, ecc = ?meta.ecc_level, "decoded QR grid");
                    symbols.push(DetectedSymbol {
                        text: content,
                        bounds,
                        format: SymbolFormat::QrCode,
                    });
                }
                Err(e) => {
                    debug!(error = ?e, "failed to decode QR grid");
                    last_error = Some(format!("{:?}", e));
                }
            }
        }

        // A grid was located but none decoded: that is a backend failure.
        match (symbols.is_empty(), last_error) {
            (true, Some(message)) => Err(DecodeError::Backend {
                backend: self.name(),
                message,
            }),
            _ => Ok(symbols),
        }
    }
}
