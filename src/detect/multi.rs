//! Multi-format detection (1D barcodes and 2D codes) using rxing

use std::collections::HashSet;

use image::GrayImage;
use rxing::common::HybridBinarizer;
use rxing::multi::{GenericMultipleBarcodeReader, MultipleBarcodeReader};
use rxing::{BarcodeFormat, BinaryBitmap, DecodeHintValue, DecodeHints, Luma8LuminanceSource, MultiFormatReader};
use tracing::trace;

use super::{CodeFormat, DetectedSymbol, Detector, SymbolFormat};
use crate::error::DecodeError;
use crate::geometry::{Point, Rect};

const LINEAR_FORMATS: [BarcodeFormat; 9] = [
    BarcodeFormat::CODE_128,
    BarcodeFormat::CODE_39,
    BarcodeFormat::CODE_93,
    BarcodeFormat::CODABAR,
    BarcodeFormat::EAN_13,
    BarcodeFormat::EAN_8,
    BarcodeFormat::UPC_A,
    BarcodeFormat::UPC_E,
    BarcodeFormat::ITF,
];

const MATRIX_FORMATS: [BarcodeFormat; 5] = [
    BarcodeFormat::QR_CODE,
    BarcodeFormat::MICRO_QR_CODE,
    BarcodeFormat::DATA_MATRIX,
    BarcodeFormat::AZTEC,
    BarcodeFormat::PDF_417,
];

/// Detector restricted to the formats of a [`CodeFormat`] filter
pub struct MultiFormatDetector {
    formats: HashSet<BarcodeFormat>,
}

impl MultiFormatDetector {
    pub fn new(filter: CodeFormat) -> Self {
        let formats: HashSet<BarcodeFormat> = match filter {
            CodeFormat::All => LINEAR_FORMATS.into_iter().chain(MATRIX_FORMATS).collect(),
            CodeFormat::Barcode => LINEAR_FORMATS.into_iter().collect(),
            CodeFormat::QrCode => [BarcodeFormat::QR_CODE, BarcodeFormat::MICRO_QR_CODE].into_iter().collect(),
        };

        Self { formats }
    }

    fn hints(&self) -> DecodeHints {
        DecodeHints::default()
            .with(DecodeHintValue::TryHarder(true))
            .with(DecodeHintValue::PossibleFormats(self.formats.clone()))
    }
}

impl Detector for MultiFormatDetector {
    fn name(&self) -> &'static str {
        "rxing"
    }

    fn detect(&self, image: &GrayImage) -> Result<Vec<DetectedSymbol>, DecodeError> {
        let (width, height) = image.dimensions();
        let source = Luma8LuminanceSource::new(image.as_raw().clone(), width, height);
        let mut bitmap = BinaryBitmap::new(HybridBinarizer::new(source));
        let mut reader = GenericMultipleBarcodeReader::new(MultiFormatReader::default());

        let results = match reader.decode_multiple_with_hints(&mut bitmap, &self.hints()) {
            Ok(results) => results,
            Err(rxing::Exceptions::NotFoundException(_)) => return Ok(Vec::new()),
            Err(e) => {
                return Err(DecodeError::Backend {
                    backend: self.name(),
                    message: format!("{:?}", e),
                })
            }
        };

        let symbols = results
            .iter()
            .filter_map(|result| {
                // Finder centres for 2D codes, scan line ends for 1D
                let corners = result.getPoints().iter().map(|p| Point::new(p.x, p.y));
                let bounds = Rect::bounding(corners)?;
                Some(DetectedSymbol {
                    text: result.getText().to_string(),
                    bounds,
                    format: symbol_format(result.getBarcodeFormat()),
                })
            })
            .collect::<Vec<_>>();

        trace!(count = symbols.len(), "rxing scan");
        Ok(symbols)
    }
}

fn symbol_format(format: &BarcodeFormat) -> SymbolFormat {
    match format {
        BarcodeFormat::QR_CODE => SymbolFormat::QrCode,
        BarcodeFormat::MICRO_QR_CODE => SymbolFormat::MicroQrCode,
        BarcodeFormat::DATA_MATRIX => SymbolFormat::DataMatrix,
        BarcodeFormat::AZTEC => SymbolFormat::Aztec,
        BarcodeFormat::PDF_417 => SymbolFormat::Pdf417,
        BarcodeFormat::CODE_128 => SymbolFormat::Code128,
        BarcodeFormat::CODE_39 => SymbolFormat::Code39,
        BarcodeFormat::CODE_93 => SymbolFormat::Code93,
        BarcodeFormat::CODABAR => SymbolFormat::Codabar,
        BarcodeFormat::EAN_13 => SymbolFormat::Ean13,
        BarcodeFormat::EAN_8 => SymbolFormat::Ean8,
        BarcodeFormat::UPC_A => SymbolFormat::UpcA,
        BarcodeFormat::UPC_E => SymbolFormat::UpcE,
        BarcodeFormat::ITF => SymbolFormat::Itf,
        _ => SymbolFormat::Other,
    }
}
