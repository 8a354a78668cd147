//! Ambient light feedback for the torch affordance

use std::time::{Duration, Instant};

use tracing::trace;

pub const DEFAULT_DARK_LUX: f32 = 45.0;
pub const DEFAULT_BRIGHT_LUX: f32 = 100.0;
pub const DEFAULT_INTERVAL: Duration = Duration::from_millis(200);

/// The on-screen torch toggle.
pub trait FlashlightView: Send + Sync {
    fn set_visible(&self, visible: bool);

    fn is_visible(&self) -> bool;

    fn set_selected(&self, selected: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightLevel {
    Dark,
    Bright,
}

/// Classifies light sensor readings, at most one per interval.
#[derive(Debug, Clone)]
pub struct AmbientLightManager {
    dark_lux: f32,
    bright_lux: f32,
    interval: Duration,
    last_reading: Option<Instant>,
    last_lux: Option<f32>,
    enabled: bool,
    registered: bool,
}

impl Default for AmbientLightManager {
    fn default() -> Self {
        Self::new(DEFAULT_DARK_LUX, DEFAULT_BRIGHT_LUX, DEFAULT_INTERVAL)
    }
}

impl AmbientLightManager {
    pub fn new(dark_lux: f32, bright_lux: f32, interval: Duration) -> Self {
        Self {
            dark_lux,
            bright_lux,
            interval,
            last_reading: None,
            last_lux: None,
            enabled: false,
            registered: true,
        }
    }

    pub fn set_dark_lux(&mut self, lux: f32) {
        self.dark_lux = lux;
    }

    pub fn set_bright_lux(&mut self, lux: f32) {
        self.bright_lux = lux;
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn register(&mut self) {
        self.registered = true;
    }

    /// Stop listening for good; readings are ignored afterwards.
    pub fn unregister(&mut self) {
        self.registered = false;
    }

    pub fn last_lux(&self) -> Option<f32> {
        self.last_lux
    }

    /// Feed one sensor reading taken at `at`.
    ///
    /// Returns the level when the reading is accepted and crosses a
    /// threshold. Readings inside the throttle window are discarded.
    pub fn on_reading(&mut self, lux: f32, at: Instant) -> Option<LightLevel> {
        if !self.enabled || !self.registered {
            return None;
        }
        if let Some(last) = self.last_reading {
            if at.saturating_duration_since(last) < self.interval {
                return None;
            }
        }
        self.last_reading = Some(at);
        self.last_lux = Some(lux);
        trace!(lux, "ambient light");

        if lux <= self.dark_lux {
            Some(LightLevel::Dark)
        } else if lux >= self.bright_lux {
            Some(LightLevel::Bright)
        } else {
            None
        }
    }
}
