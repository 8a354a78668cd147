pub mod camera;
pub mod capture;
pub mod detect;
pub mod display;
pub mod error;
pub mod geometry;
pub mod pipeline;
pub mod scanner;
#[cfg(feature = "v4l2")]
pub mod utils;

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::camera::{LensFacing, SessionOptions};
use crate::detect::{Backend, CodeFormat};
use crate::display::ViewfinderConfig;
use crate::error::SetupError;
use crate::geometry::FitMode;

/// Scanner configuration.
///
/// Loaded from defaults, an optional TOML file, then `CODESCAN__*`
/// environment variables (`CODESCAN__LIGHT__DARK_LUX=30`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scanner: ScannerConfig,
    pub camera: CameraSettings,
    pub light: LightConfig,
    pub viewfinder: ViewfinderConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScannerConfig {
    pub format: CodeFormat,
    pub backend: Backend,
    /// Analyze live frames as soon as the camera starts
    pub analyze: bool,
    /// Stop analyzing after the first result until scanning resumes
    pub auto_stop_analyze: bool,
    pub play_beep: bool,
    pub vibrate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraSettings {
    pub lens_facing: LensFacing,
    /// Pinch to zoom
    pub touch_zoom: bool,
    pub display_width: u32,
    pub display_height: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LightConfig {
    pub dark_lux: f32,
    pub bright_lux: f32,
    pub interval_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// How long a still image waits for a running live decode
    pub still_wait_ms: u64,
    /// How frame coordinates map onto the preview
    pub fit_mode: FitMode,
    /// Frame period of the file-backed camera
    pub replay_interval_ms: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            format: CodeFormat::All,
            backend: Backend::Auto,
            analyze: true,
            auto_stop_analyze: true,
            play_beep: true,
            vibrate: false,
        }
    }
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            lens_facing: LensFacing::Back,
            touch_zoom: true,
            display_width: 1080,
            display_height: 1920,
        }
    }
}

impl Default for LightConfig {
    fn default() -> Self {
        Self {
            dark_lux: camera::light::DEFAULT_DARK_LUX,
            bright_lux: camera::light::DEFAULT_BRIGHT_LUX,
            interval_ms: camera::light::DEFAULT_INTERVAL.as_millis() as u64,
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            still_wait_ms: 2000,
            fit_mode: FitMode::Fill,
            replay_interval_ms: 33,
        }
    }
}

impl PipelineConfig {
    pub fn still_wait(&self) -> Duration {
        Duration::from_millis(self.still_wait_ms)
    }

    pub fn replay_interval(&self) -> Duration {
        Duration::from_millis(self.replay_interval_ms)
    }
}

impl Config {
    /// Layer defaults, the TOML file at `path` (if any) and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, SetupError> {
        let mut builder = config::Config::builder().add_source(config::Config::try_from(&Config::default())?);
        if let Some(path) = path {
            debug!(path = %path.display(), "loading config file");
            builder = builder.add_source(config::File::from(path).format(config::FileFormat::Toml));
        }
        let config: Config = builder
            .add_source(
                config::Environment::with_prefix("CODESCAN")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SetupError> {
        let invalid = |message: String| Err(SetupError::Config(message));
        let vf = &self.viewfinder;

        if !(vf.frame_ratio > 0.0 && vf.frame_ratio <= 1.0) {
            return invalid(format!("viewfinder.frame_ratio must be in (0, 1], got {}", vf.frame_ratio));
        }
        if vf.laser_image_ratio <= 0.0 {
            return invalid(format!("viewfinder.laser_image_ratio must be positive, got {}", vf.laser_image_ratio));
        }
        if vf.point_stroke_ratio <= 0.0 {
            return invalid(format!("viewfinder.point_stroke_ratio must be positive, got {}", vf.point_stroke_ratio));
        }
        if vf.laser_animation_interval_ms == 0 || vf.point_animation_interval_ms == 0 {
            return invalid("viewfinder animation intervals must be non-zero".into());
        }
        if vf.laser_grid_column < 2 {
            return invalid(format!("viewfinder.laser_grid_column must be at least 2, got {}", vf.laser_grid_column));
        }
        if self.light.dark_lux > self.light.bright_lux {
            return invalid(format!(
                "light.dark_lux ({}) exceeds light.bright_lux ({})",
                self.light.dark_lux, self.light.bright_lux
            ));
        }
        if self.pipeline.replay_interval_ms == 0 {
            return invalid("pipeline.replay_interval_ms must be non-zero".into());
        }
        Ok(())
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            analyze: self.scanner.analyze,
            auto_stop_analyze: self.scanner.auto_stop_analyze,
            play_beep: self.scanner.play_beep,
            vibrate: self.scanner.vibrate,
            touch_zoom: self.camera.touch_zoom,
            dark_lux: self.light.dark_lux,
            bright_lux: self.light.bright_lux,
            light_interval: Duration::from_millis(self.light.interval_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        let options = config.session_options();
        assert_eq!(options.dark_lux, 45.0);
        assert_eq!(options.light_interval, Duration::from_millis(200));
    }

    #[test]
    fn test_rejects_inverted_light_thresholds() {
        let mut config = Config::default();
        config.light.dark_lux = 120.0;
        assert!(matches!(config.validate(), Err(SetupError::Config(_))));
    }

    #[test]
    fn test_rejects_bad_viewfinder() {
        let mut config = Config::default();
        config.viewfinder.laser_grid_column = 1;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.viewfinder.frame_ratio = 0.0;
        assert!(config.validate().is_err());
    }
}
