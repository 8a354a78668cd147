use std::time::{Duration, Instant};

use crate::geometry::Point;

/// Longest press that still counts as a tap
pub const TAP_TIMEOUT: Duration = Duration::from_millis(150);
/// Farthest a tap may travel, in pixels
pub const TAP_SLOP: f32 = 20.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TouchAction {
    Down,
    Move,
    Up,
    Cancel,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TouchEvent {
    pub action: TouchAction,
    pub x: f32,
    pub y: f32,
    pub pointers: usize,
    pub at: Instant,
}

impl TouchEvent {
    pub fn new(action: TouchAction, x: f32, y: f32, at: Instant) -> Self {
        Self {
            action,
            x,
            y,
            pointers: 1,
            at,
        }
    }
}

/// Tells a single-finger tap from a drag.
#[derive(Debug, Clone)]
pub struct TapDetector {
    timeout: Duration,
    slop: f32,
    down: Option<(Point, Instant)>,
    is_tap: bool,
}

impl Default for TapDetector {
    fn default() -> Self {
        Self::new(TAP_TIMEOUT, TAP_SLOP)
    }
}

impl TapDetector {
    pub fn new(timeout: Duration, slop: f32) -> Self {
        Self {
            timeout,
            slop,
            down: None,
            is_tap: false,
        }
    }

    /// Feed a touch event; returns the release point of a completed tap.
    pub fn on_touch(&mut self, event: &TouchEvent) -> Option<Point> {
        if event.pointers != 1 {
            self.is_tap = false;
            return None;
        }
        let at = Point::new(event.x, event.y);
        match event.action {
            TouchAction::Down => {
                self.down = Some((at, event.at));
                self.is_tap = true;
                None
            }
            TouchAction::Move => {
                if let Some((origin, _)) = self.down {
                    self.is_tap = origin.distance(at) < self.slop;
                }
                None
            }
            TouchAction::Up => {
                let (origin, pressed) = self.down.take()?;
                let quick = event.at.saturating_duration_since(pressed) < self.timeout;
                let near = origin.distance(at) < self.slop;
                (self.is_tap && quick && near).then_some(at)
            }
            TouchAction::Cancel => {
                self.down = None;
                self.is_tap = false;
                None
            }
        }
    }
}
