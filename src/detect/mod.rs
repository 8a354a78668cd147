//! Barcode decode adapter
//!
//! The pipeline only sees the [`Detector`] trait. Concrete backends wrap a
//! third-party decoder and are picked once per symbol-format filter.

pub mod multi;
pub mod qr;

use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use arc_swap::ArcSwap;
use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::DecodeError;
use crate::geometry::Rect;

pub use multi::MultiFormatDetector;
pub use qr::QrDetector;

/// Which symbol families a scanner looks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum CodeFormat {
    #[default]
    All,
    Barcode,
    #[serde(alias = "qr")]
    #[value(alias = "qr")]
    QrCode,
}

/// Decoder implementation backing a [`DecodeAdapter`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// rqrr for QR-only scanning, rxing otherwise
    #[default]
    Auto,
    Rqrr,
    Rxing,
}

/// Format of one decoded symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SymbolFormat {
    QrCode,
    MicroQrCode,
    DataMatrix,
    Aztec,
    Pdf417,
    Code128,
    Code39,
    Code93,
    Codabar,
    Ean13,
    Ean8,
    UpcA,
    UpcE,
    Itf,
    Other,
}

/// One barcode or QR code found in a frame.
///
/// `bounds` are in oriented frame coordinates (rotation already applied).
/// For rxing 2D results they span the finder pattern centres rather than the
/// symbol edges, so they sit a few modules inside the symbol; the centre is
/// what result markers use.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedSymbol {
    pub text: String,
    pub bounds: Rect,
    pub format: SymbolFormat,
}

/// A synchronous symbol decoder.
///
/// An empty vector means "nothing found"; `Err` is reserved for the backend
/// itself failing.
pub trait Detector: Send + Sync {
    fn name(&self) -> &'static str;

    fn detect(&self, image: &GrayImage) -> Result<Vec<DetectedSymbol>, DecodeError>;
}

/// Build the detector for a format filter.
pub fn detector_for(format: CodeFormat, backend: Backend) -> Box<dyn Detector> {
    match (backend, format) {
        (Backend::Rqrr, _) | (Backend::Auto, CodeFormat::QrCode) => Box::new(QrDetector::new()),
        (Backend::Rxing, _) | (Backend::Auto, _) => Box::new(MultiFormatDetector::new(format)),
    }
}

/// Wraps a [`Detector`] behind an asynchronous contract.
///
/// Detection runs on tokio's blocking pool, so completion happens on a
/// thread the caller does not control. The detector can be swapped while
/// decodes are in flight; each decode keeps the one it started with.
pub struct DecodeAdapter {
    detector: ArcSwap<Box<dyn Detector>>,
    backend: Backend,
}

impl DecodeAdapter {
    pub fn new(format: CodeFormat, backend: Backend) -> Self {
        Self::with_detector(detector_for(format, backend), backend)
    }

    pub fn with_detector(detector: Box<dyn Detector>, backend: Backend) -> Self {
        info!(detector = detector.name(), "decode adapter ready");
        Self {
            detector: ArcSwap::from_pointee(detector),
            backend,
        }
    }

    /// Replace the format filter; takes effect from the next decode.
    pub fn set_code_format(&self, format: CodeFormat) {
        let detector = detector_for(format, self.backend);
        info!(?format, detector = detector.name(), "switching detector");
        self.detector.store(Arc::new(detector));
    }

    pub fn detector_name(&self) -> &'static str {
        self.detector.load().name()
    }

    pub async fn detect(&self, image: GrayImage) -> Result<Vec<DetectedSymbol>, DecodeError> {
        let detector = self.detector.load_full();
        let start = Instant::now();

        let symbols = tokio::task::spawn_blocking(move || detector.detect(&image))
            .await
            .map_err(|e| DecodeError::Aborted(e.to_string()))??;

        let elapsed = start.elapsed();
        metrics::histogram!("codescan_decode_time_us").record(elapsed.as_micros() as f64);
        debug!(count = symbols.len(), elapsed_ms = elapsed.as_millis(), "decode finished");
        Ok(symbols)
    }
}

impl fmt::Debug for DecodeAdapter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecodeAdapter")
            .field("detector", &self.detector_name())
            .field("backend", &self.backend)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_backend_selection() {
        assert_eq!(detector_for(CodeFormat::QrCode, Backend::Auto).name(), "rqrr");
        assert_eq!(detector_for(CodeFormat::All, Backend::Auto).name(), "rxing");
        assert_eq!(detector_for(CodeFormat::Barcode, Backend::Rqrr).name(), "rqrr");
    }

    #[tokio::test]
    async fn test_blank_image_yields_no_symbols() {
        let adapter = DecodeAdapter::new(CodeFormat::QrCode, Backend::Auto);
        let symbols = adapter.detect(GrayImage::new(64, 64)).await.unwrap();
        assert!(symbols.is_empty());
    }

    #[test]
    fn test_swap_detector() {
        let adapter = DecodeAdapter::new(CodeFormat::All, Backend::Auto);
        assert_eq!(adapter.detector_name(), "rxing");
        adapter.set_code_format(CodeFormat::QrCode);
        assert_eq!(adapter.detector_name(), "rqrr");
    }
}
