#![allow(dead_code)]

use std::sync::Arc;

use image::GrayImage;
use once_cell::sync::Lazy;

use codescan::detect::{Backend, DecodeAdapter, DetectedSymbol, Detector, SymbolFormat};
use codescan::error::DecodeError;
use codescan::geometry::Rect;

pub static RUNTIME: Lazy<tokio::runtime::Runtime> = Lazy::new(|| tokio::runtime::Runtime::new().unwrap());

/// Answers each decode with the next scripted reply, blocking until one arrives.
pub struct ScriptedDetector(pub flume::Receiver<Vec<DetectedSymbol>>);

impl Detector for ScriptedDetector {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn detect(&self, _image: &GrayImage) -> Result<Vec<DetectedSymbol>, DecodeError> {
        self.0.recv().map_err(|e| DecodeError::Backend {
            backend: "scripted",
            message: e.to_string(),
        })
    }
}

/// Adapter over a [`ScriptedDetector`] and the sender feeding it.
pub fn scripted_adapter() -> (Arc<DecodeAdapter>, flume::Sender<Vec<DetectedSymbol>>) {
    let (replies, scripted) = flume::unbounded();
    let adapter = DecodeAdapter::with_detector(Box::new(ScriptedDetector(scripted)), Backend::Auto);
    (Arc::new(adapter), replies)
}

pub fn qr(text: &str, bounds: Rect) -> DetectedSymbol {
    DetectedSymbol {
        text: text.into(),
        bounds,
        format: SymbolFormat::QrCode,
    }
}
