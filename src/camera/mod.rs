//! Camera session control
//!
//! The platform camera framework sits behind [`CameraProvider`] and
//! [`Camera`]. Everything else here (zoom clamping, torch, tap-to-focus,
//! ambient light feedback, the analysis worker) is framework independent.

pub mod beep;
pub mod config;
pub mod gesture;
pub mod light;
pub mod session;

use std::sync::Arc;

use crate::capture::frame::PlanarImage;
use crate::error::CameraError;

pub use beep::{BeepManager, FeedbackSink, TerminalBell};
pub use config::{AdaptiveCameraConfig, AspectRatio, CameraConfig, LensFacing, ResolutionPolicy, Size};
pub use gesture::{TapDetector, TouchAction, TouchEvent};
pub use light::{AmbientLightManager, FlashlightView, LightLevel};
pub use session::{CameraSession, ScanResultCallback, SessionOptions};

/// Receives frames from a bound camera, on the camera's own thread.
pub type FrameSink = Arc<dyn Fn(PlanarImage) + Send + Sync>;

/// Zoom as last reported by the device
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZoomState {
    pub ratio: f32,
    pub min_ratio: f32,
    pub max_ratio: f32,
    /// Zoom mapped linearly onto 0..=1
    pub linear: f32,
}

impl ZoomState {
    /// Clamp `ratio` to the device range.
    pub fn clamp(&self, ratio: f32) -> f32 {
        ratio.min(self.max_ratio).max(self.min_ratio)
    }
}

/// A bound camera.
pub trait Camera: Send + Sync {
    fn zoom_state(&self) -> Option<ZoomState>;

    fn set_zoom_ratio(&self, ratio: f32) -> Result<(), CameraError>;

    fn set_linear_zoom(&self, linear: f32) -> Result<(), CameraError>;

    fn enable_torch(&self, on: bool) -> Result<(), CameraError>;

    fn torch_enabled(&self) -> bool;

    fn has_flash_unit(&self) -> bool;

    fn focus_and_metering_supported(&self) -> bool {
        false
    }

    /// Focus and meter at a point in preview coordinates.
    fn start_focus_and_metering(&self, _x: f32, _y: f32) -> Result<(), CameraError> {
        Err(CameraError::Unsupported("focus and metering"))
    }
}

/// Binds cameras for preview and analysis.
pub trait CameraProvider: Send + Sync {
    /// Bind a camera selected by `config`; frames are pushed into `sink`
    /// until [`CameraProvider::unbind_all`].
    fn bind(&self, config: &dyn CameraConfig, sink: FrameSink) -> Result<Arc<dyn Camera>, CameraError>;

    fn unbind_all(&self);
}
