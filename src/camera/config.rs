//! Camera selection and resolution policy

use serde::{Deserialize, Serialize};
use tracing::debug;

const QUALITY_1080P: u32 = 1080;
const QUALITY_720P: u32 = 720;
const RATIO_4_3: f32 = 4.0 / 3.0;
const RATIO_16_9: f32 = 16.0 / 9.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    /// Let the provider pick
    #[default]
    Unknown,
    Back,
    Front,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AspectRatio {
    Ratio4x3,
    Ratio16x9,
}

impl AspectRatio {
    /// Closest standard ratio to `long / short`.
    pub fn closest(ratio: f32) -> Self {
        if (ratio - RATIO_4_3).abs() < (ratio - RATIO_16_9).abs() {
            AspectRatio::Ratio4x3
        } else {
            AspectRatio::Ratio16x9
        }
    }

    pub fn value(&self) -> f32 {
        match self {
            AspectRatio::Ratio4x3 => RATIO_4_3,
            AspectRatio::Ratio16x9 => RATIO_16_9,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: u32,
    pub height: u32,
}

impl Size {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn short_side(&self) -> u32 {
        self.width.min(self.height)
    }

    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Target resolution for one use case (preview or analysis).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ResolutionPolicy {
    pub aspect_ratio: AspectRatio,
    pub target: Size,
    /// Sizes whose short side exceeds this are never chosen
    pub quality: u32,
}

impl ResolutionPolicy {
    /// Supported sizes that do not exceed the quality cap.
    pub fn filter(&self, supported: &[Size]) -> Vec<Size> {
        supported
            .iter()
            .copied()
            .filter(|size| size.short_side() <= self.quality)
            .collect()
    }

    /// Closest size at or above the target, else the closest below it.
    pub fn select(&self, supported: &[Size]) -> Option<Size> {
        let candidates = self.filter(supported);
        let target = self.target.area();
        let higher = candidates
            .iter()
            .filter(|size| size.area() >= target)
            .min_by_key(|size| size.area());
        let lower = candidates
            .iter()
            .filter(|size| size.area() < target)
            .max_by_key(|size| size.area());
        higher.or(lower).copied()
    }
}

/// Camera options applied when binding.
pub trait CameraConfig: Send + Sync {
    fn lens_facing(&self) -> LensFacing {
        LensFacing::Unknown
    }

    fn preview(&self) -> ResolutionPolicy;

    fn analysis(&self) -> ResolutionPolicy;
}

/// Picks preview and analysis resolutions from the display size.
///
/// The aspect ratio follows the display (4:3 or 16:9, whichever is closer).
/// Preview is capped at 1080p; analysis at 1080p on displays whose short
/// side is above 1080, otherwise at 720p.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveCameraConfig {
    lens_facing: LensFacing,
    preview: ResolutionPolicy,
    analysis: ResolutionPolicy,
}

impl AdaptiveCameraConfig {
    pub fn new(display_width: u32, display_height: u32, lens_facing: LensFacing) -> Self {
        debug!(display_width, display_height, "adaptive camera config");
        let portrait = display_width < display_height;
        let short = display_width.min(display_height).max(1);
        let long = display_width.max(display_height);
        let ratio = long as f32 / short as f32;
        let aspect_ratio = AspectRatio::closest(ratio);

        let preview_quality = short.min(QUALITY_1080P);
        let analysis_quality = if short > QUALITY_1080P {
            QUALITY_1080P
        } else {
            short.min(QUALITY_720P)
        };

        let target = |quality: u32| {
            let stretched = (quality as f32 * ratio).round() as u32;
            if portrait {
                Size::new(quality, stretched)
            } else {
                Size::new(stretched, quality)
            }
        };

        Self {
            lens_facing,
            preview: ResolutionPolicy {
                aspect_ratio,
                target: target(preview_quality),
                quality: preview_quality,
            },
            analysis: ResolutionPolicy {
                aspect_ratio,
                target: target(analysis_quality),
                quality: analysis_quality,
            },
        }
    }
}

impl CameraConfig for AdaptiveCameraConfig {
    fn lens_facing(&self) -> LensFacing {
        self.lens_facing
    }

    fn preview(&self) -> ResolutionPolicy {
        self.preview
    }

    fn analysis(&self) -> ResolutionPolicy {
        self.analysis
    }
}
