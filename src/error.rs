//! Error types shared across the scanning pipeline

use thiserror::Error;

/// Pixel conversion failures.
///
/// An undersized destination is a programmer error: the caller asked the
/// pool for a buffer of the wrong size. It is still reported rather than
/// panicking so the pipeline can recycle the buffer and carry on.
#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("destination holds {actual} bytes, {required} required for {width}x{height} NV21")]
    DestinationTooSmall {
        width: u32,
        height: u32,
        required: usize,
        actual: usize,
    },

    #[error("{plane} plane too short: need byte {needed}, have {len}")]
    PlaneTooShort {
        plane: &'static str,
        needed: usize,
        len: usize,
    },

    #[error("unsupported planar layout: {0}")]
    Unsupported(String),
}

/// Failure reported by a decode backend.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("{backend} backend failed: {message}")]
    Backend {
        backend: &'static str,
        message: String,
    },

    #[error("decode task aborted: {0}")]
    Aborted(String),
}

/// Cause attached to a failed analysis attempt.
#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error(transparent)]
    Convert(#[from] ConvertError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("analyzer busy, still image not analyzed")]
    Busy,
}

/// Camera framework failures. Caught and logged at the session boundary.
#[derive(Debug, Error)]
pub enum CameraError {
    #[error("camera bind failed: {0}")]
    Bind(String),

    #[error("{0} not supported by this camera")]
    Unsupported(&'static str),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Integration errors raised while wiring the scanner together.
///
/// These are never recovered at runtime.
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Load(#[from] config::ConfigError),

    #[error("failed to start analysis worker: {0}")]
    Worker(#[from] std::io::Error),
}
