//! Viewfinder overlay: scan frame, laser animation and result markers
//!
//! The viewfinder is a small state machine driven by its host's render loop.
//! Each [`Viewfinder::draw`] call paints one frame and returns the
//! [`Invalidate`] request for the next one; there is no timer of its own.

use std::time::Duration;

use image::imageops::{self, FilterType};
use image::RgbaImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::canvas::{Canvas, Color, Fill, TextAlign};
use crate::geometry::{Point, Rect};

/// Marker hit range relative to its drawn size
const RANGE_RATIO: f32 = 1.2;
const MAX_ZOOM_RATIO: f32 = 1.2;
const ZOOM_SPEED: f32 = 0.02;
const GRID_STROKE: f32 = 2.0;
const LABEL_LINE_SPACING: f32 = 1.2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewfinderStyle {
    /// Dimmed exterior, framed scan area with corner marks
    #[default]
    Classic,
    /// Borderless full-view laser
    Popular,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LaserStyle {
    None,
    #[default]
    Line,
    Grid,
    Image,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FrameGravity {
    #[default]
    Center,
    Left,
    Top,
    Right,
    Bottom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextLocation {
    #[default]
    Top,
    Bottom,
}

/// Viewfinder appearance. Lengths are in view pixels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewfinderConfig {
    pub style: ViewfinderStyle,
    pub laser_style: LaserStyle,

    pub mask_color: Color,
    pub frame_color: Color,
    pub frame_corner_color: Color,
    pub laser_color: Color,
    pub label_text_color: Color,
    pub point_color: Color,
    pub point_stroke_color: Color,

    /// Explicit frame size; 0 (or larger than the view) derives it from `frame_ratio`
    pub frame_width: u32,
    pub frame_height: u32,
    pub frame_ratio: f32,
    pub frame_gravity: FrameGravity,
    pub frame_padding_left: f32,
    pub frame_padding_top: f32,
    pub frame_padding_right: f32,
    pub frame_padding_bottom: f32,
    pub frame_line_stroke_width: f32,
    pub frame_corner_size: f32,
    pub frame_corner_stroke_width: f32,

    pub laser_line_height: f32,
    pub laser_movement_speed: f32,
    pub laser_animation_interval_ms: u64,
    pub laser_grid_column: u32,
    pub laser_grid_height: f32,
    /// Width of the laser image relative to the view's short side
    pub laser_image_ratio: f32,

    pub label_text: Option<String>,
    pub label_text_size: f32,
    pub label_text_padding: f32,
    pub label_text_location: TextLocation,

    pub point_radius: f32,
    pub point_stroke_ratio: f32,
    pub point_animation: bool,
    pub point_animation_interval_ms: u64,
}

impl Default for ViewfinderConfig {
    fn default() -> Self {
        Self {
            style: ViewfinderStyle::Classic,
            laser_style: LaserStyle::Line,
            mask_color: Color(0x6000_0000),
            frame_color: Color(0x7F1F_B3E2),
            frame_corner_color: Color(0xFF1F_B3E2),
            laser_color: Color(0xFF1F_B3E2),
            label_text_color: Color(0xC0FF_FFFF),
            point_color: Color(0xFF1F_B3E2),
            point_stroke_color: Color::WHITE,
            frame_width: 0,
            frame_height: 0,
            frame_ratio: 0.625,
            frame_gravity: FrameGravity::Center,
            frame_padding_left: 0.0,
            frame_padding_top: 0.0,
            frame_padding_right: 0.0,
            frame_padding_bottom: 0.0,
            frame_line_stroke_width: 1.0,
            frame_corner_size: 16.0,
            frame_corner_stroke_width: 4.0,
            laser_line_height: 5.0,
            laser_movement_speed: 2.0,
            laser_animation_interval_ms: 20,
            laser_grid_column: 20,
            laser_grid_height: 40.0,
            laser_image_ratio: 0.625,
            label_text: None,
            label_text_size: 14.0,
            label_text_padding: 24.0,
            label_text_location: TextLocation::Top,
            point_radius: 15.0,
            point_stroke_ratio: RANGE_RATIO,
            point_animation: true,
            point_animation_interval_ms: 3000,
        }
    }
}

/// Redraw request returned by [`Viewfinder::draw`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Invalidate {
    pub delay: Duration,
    /// `None` means the whole view
    pub region: Option<Rect>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewState {
    Scanning,
    ShowingResults(Vec<Point>),
}

/// Marker pulse: the scale climbs from 1.0 to [`MAX_ZOOM_RATIO`] and back,
/// three rounds per cycle, then rests for the point animation interval.
#[derive(Debug, Clone, Copy, Default)]
struct Pulse {
    step: u32,
    last_step: u32,
    rounds: u32,
}

impl Pulse {
    fn max_step() -> u32 {
        ((MAX_ZOOM_RATIO - 1.0) / ZOOM_SPEED).round() as u32
    }

    fn ratio(&self) -> f32 {
        1.0 + self.step as f32 * ZOOM_SPEED
    }

    /// Advance one animation tick. Returns true when a cycle just finished.
    fn advance(&mut self) -> bool {
        if self.step == 0 {
            self.last_step = 0;
            self.step = 1;
            self.rounds = if self.rounds < 2 { self.rounds + 1 } else { 0 };
        } else if self.step >= Self::max_step() || self.last_step > self.step {
            self.last_step = self.step;
            self.step -= 1;
        } else {
            self.last_step = self.step;
            self.step += 1;
        }
        self.rounds == 0 && self.last_step == 0
    }
}

pub struct Viewfinder {
    config: ViewfinderConfig,
    width: u32,
    height: u32,
    frame: Option<Rect>,
    scanner_start: Option<f32>,
    laser_source: Option<RgbaImage>,
    laser_image: Option<RgbaImage>,
    frame_image: Option<RgbaImage>,
    point_image: Option<RgbaImage>,
    state: ViewState,
    pulse: Pulse,
}

impl Viewfinder {
    pub fn new(config: ViewfinderConfig) -> Self {
        Self {
            config,
            width: 0,
            height: 0,
            frame: None,
            scanner_start: None,
            laser_source: None,
            laser_image: None,
            frame_image: None,
            point_image: None,
            state: ViewState::Scanning,
            pulse: Pulse::default(),
        }
    }

    pub fn config(&self) -> &ViewfinderConfig {
        &self.config
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn frame(&self) -> Option<Rect> {
        self.frame
    }

    pub fn state(&self) -> &ViewState {
        &self.state
    }

    pub fn is_showing_points(&self) -> bool {
        matches!(self.state, ViewState::ShowingResults(_))
    }

    pub fn result_points(&self) -> &[Point] {
        match &self.state {
            ViewState::ShowingResults(points) => points,
            ViewState::Scanning => &[],
        }
    }

    /// Top edge of the laser, once the first scanning frame is drawn.
    pub fn scanner_position(&self) -> Option<f32> {
        self.scanner_start
    }

    /// Current marker scale.
    pub fn zoom_ratio(&self) -> f32 {
        self.pulse.ratio()
    }

    pub fn set_style(&mut self, style: ViewfinderStyle) {
        self.config.style = style;
    }

    pub fn set_laser_style(&mut self, laser_style: LaserStyle) {
        self.config.laser_style = laser_style;
    }

    pub fn set_label_text(&mut self, text: Option<String>) {
        self.config.label_text = text;
    }

    pub fn set_laser_image(&mut self, image: Option<RgbaImage>) {
        self.laser_source = image;
        self.scale_laser_image();
    }

    /// Replaces the drawn border and corners.
    pub fn set_frame_image(&mut self, image: Option<RgbaImage>) {
        self.frame_image = image;
    }

    /// Replaces the circle markers.
    pub fn set_point_image(&mut self, image: Option<RgbaImage>) {
        self.point_image = image;
    }

    /// Radius around a marker center that counts as a hit.
    pub fn point_range_radius(&self) -> f32 {
        match &self.point_image {
            Some(image) => (image.width() + image.height()) as f32 / 4.0 * RANGE_RATIO,
            None => self.point_stroke_radius() * RANGE_RATIO,
        }
    }

    fn point_stroke_radius(&self) -> f32 {
        self.config.point_radius * self.config.point_stroke_ratio
    }

    fn laser_interval(&self) -> Duration {
        Duration::from_millis(self.config.laser_animation_interval_ms)
    }

    /// Lay the frame out for a `width`x`height` view.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
        if width == 0 || height == 0 {
            self.frame = None;
            return;
        }

        let config = &self.config;
        let (w, h) = (width as f32, height as f32);
        let size = (w.min(h) * config.frame_ratio).floor().max(1.0);

        let frame_width = match config.frame_width {
            0 => size,
            fw if fw > width => size,
            fw => fw as f32,
        }
        .min(w);
        let frame_height = match config.frame_height {
            0 => size,
            fh if fh > height => size,
            fh => fh as f32,
        }
        .min(h);

        let mut left = (w - frame_width) / 2.0 + config.frame_padding_left - config.frame_padding_right;
        let mut top = (h - frame_height) / 2.0 + config.frame_padding_top - config.frame_padding_bottom;
        match config.frame_gravity {
            FrameGravity::Center => {}
            FrameGravity::Left => left = config.frame_padding_left,
            FrameGravity::Top => top = config.frame_padding_top,
            FrameGravity::Right => left = w - frame_width + config.frame_padding_right,
            FrameGravity::Bottom => top = h - frame_height + config.frame_padding_bottom,
        }
        let left = left.clamp(0.0, w - frame_width).floor();
        let top = top.clamp(0.0, h - frame_height).floor();

        let frame = Rect::new(left, top, left + frame_width, top + frame_height);
        debug!(width, height, ?frame, "viewfinder frame laid out");
        self.frame = Some(frame);
        self.scanner_start = None;
        self.scale_laser_image();
    }

    fn scale_laser_image(&mut self) {
        let (Some(source), true) = (&self.laser_source, self.width > 0 && self.height > 0) else {
            self.laser_image = self.laser_source.clone();
            return;
        };
        let target_width = (self.width.min(self.height) as f32 * self.config.laser_image_ratio).round();
        if target_width < 1.0 || source.width() == 0 {
            self.laser_image = None;
            return;
        }
        let ratio = target_width / source.width() as f32;
        let target_height = ((source.height() as f32 * ratio).round() as u32).max(1);
        self.laser_image = Some(imageops::resize(source, target_width as u32, target_height, FilterType::Triangle));
    }

    /// Back to the scanning animation.
    pub fn show_scanner(&mut self) {
        self.state = ViewState::Scanning;
    }

    /// Freeze the laser and mark each point.
    pub fn show_result_points(&mut self, points: Vec<Point>) {
        debug!(count = points.len(), "showing result points");
        self.state = ViewState::ShowingResults(points);
        self.pulse = Pulse::default();
    }

    /// Index of the first marker within range of `(x, y)`.
    pub fn on_tap(&self, x: f32, y: f32) -> Option<usize> {
        let ViewState::ShowingResults(points) = &self.state else {
            return None;
        };
        let tap = Point::new(x, y);
        let range = self.point_range_radius();
        points.iter().position(|p| p.distance(tap) <= range)
    }

    /// Paint one frame and return the next redraw request.
    pub fn draw(&mut self, canvas: &mut dyn Canvas) -> Option<Invalidate> {
        if let ViewState::ShowingResults(points) = &self.state {
            self.draw_mask(canvas);
            let ratio = self.pulse.ratio();
            for point in points {
                self.draw_result_point(canvas, *point, ratio);
            }
            if !self.config.point_animation {
                return None;
            }
            let rest = self.pulse.advance();
            let delay = if rest {
                Duration::from_millis(self.config.point_animation_interval_ms)
            } else {
                self.laser_interval() * 2
            };
            return Some(Invalidate { delay, region: None });
        }

        let frame = self.frame?;
        if self.scanner_start.is_none() {
            self.scanner_start = Some(frame.top);
        }

        match self.config.style {
            ViewfinderStyle::Classic => {
                self.draw_exterior(canvas, frame);
                self.draw_laser(canvas, frame);
                self.draw_frame(canvas, frame);
                self.draw_label(canvas, frame);
                Some(Invalidate {
                    delay: self.laser_interval(),
                    region: Some(frame),
                })
            }
            ViewfinderStyle::Popular => {
                self.draw_laser(canvas, frame);
                self.draw_label(canvas, frame);
                Some(Invalidate {
                    delay: self.laser_interval(),
                    region: None,
                })
            }
        }
    }

    fn view_rect(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width as f32, self.height as f32)
    }

    fn draw_mask(&self, canvas: &mut dyn Canvas) {
        if !self.config.mask_color.is_transparent() {
            canvas.fill_rect(self.view_rect(), self.config.mask_color.into());
        }
    }

    fn draw_exterior(&self, canvas: &mut dyn Canvas, frame: Rect) {
        let color = self.config.mask_color;
        if color.is_transparent() {
            return;
        }
        let (w, h) = (self.width as f32, self.height as f32);
        canvas.fill_rect(Rect::new(0.0, 0.0, w, frame.top), color.into());
        canvas.fill_rect(Rect::new(0.0, frame.top, frame.left, frame.bottom), color.into());
        canvas.fill_rect(Rect::new(frame.right, frame.top, w, frame.bottom), color.into());
        canvas.fill_rect(Rect::new(0.0, frame.bottom, w, h), color.into());
    }

    fn scanner_end(&self, frame: Rect) -> f32 {
        frame.bottom - self.config.laser_line_height
    }

    /// Move the laser down one step, or wrap it to the top once it reaches
    /// the lower bound. Returns false on the wrapping tick.
    fn advance_laser(&mut self, frame: Rect) -> bool {
        let start = self.scanner_start.unwrap_or(frame.top);
        if start < self.scanner_end(frame) {
            self.scanner_start = Some(start + self.config.laser_movement_speed);
            true
        } else {
            self.scanner_start = Some(frame.top);
            false
        }
    }

    fn draw_laser(&mut self, canvas: &mut dyn Canvas, frame: Rect) {
        match self.config.laser_style {
            LaserStyle::None => {}
            LaserStyle::Line => self.draw_line_laser(canvas, frame),
            LaserStyle::Grid => self.draw_grid_laser(canvas, frame),
            LaserStyle::Image => {
                if self.laser_image.is_some() {
                    self.draw_image_laser(canvas, frame);
                } else {
                    self.draw_line_laser(canvas, frame);
                }
            }
        }
    }

    fn draw_line_laser(&mut self, canvas: &mut dyn Canvas, frame: Rect) {
        let start = self.scanner_start.unwrap_or(frame.top);
        let line_height = self.config.laser_line_height;
        if start < self.scanner_end(frame) {
            let color = self.config.laser_color;
            let fill = Fill::Vertical {
                top: start,
                bottom: start + line_height,
                from: color.shade(),
                to: color,
                mirror: true,
            };
            let corner = self.config.frame_corner_size;
            let oval = Rect::new(frame.left + corner, start, frame.right - corner, start + line_height);
            canvas.fill_oval(oval, fill);
        }
        self.advance_laser(frame);
    }

    fn draw_grid_laser(&mut self, canvas: &mut dyn Canvas, frame: Rect) {
        let config = &self.config;
        let start = self.scanner_start.unwrap_or(frame.top);
        let grid_height = config.laser_grid_height;
        let trailing = grid_height > 0.0 && start - frame.top > grid_height;
        let start_y = if trailing { start - grid_height } else { frame.top };

        let fill = Fill::Vertical {
            top: start_y,
            bottom: start,
            from: config.laser_color.shade(),
            to: config.laser_color,
            mirror: false,
        };

        let columns = config.laser_grid_column.max(1);
        let unit = frame.width() / columns as f32;
        for i in 1..columns {
            let x = frame.left + i as f32 * unit;
            canvas.draw_line(Point::new(x, start_y), Point::new(x, start), GRID_STROKE, fill);
        }

        let height = if trailing { grid_height } else { start - frame.top };
        if unit > 0.0 {
            let inset = config.frame_line_stroke_width;
            let rows = (height / unit).floor() as u32;
            for i in 0..=rows {
                let y = start - i as f32 * unit;
                canvas.draw_line(
                    Point::new(frame.left + inset, y),
                    Point::new(frame.right - inset, y),
                    GRID_STROKE,
                    fill,
                );
            }
        }

        self.advance_laser(frame);
    }

    fn draw_image_laser(&mut self, canvas: &mut dyn Canvas, frame: Rect) {
        if let Some(image) = &self.laser_image {
            let start = self.scanner_start.unwrap_or(frame.top);
            let left = (self.width as f32 - image.width() as f32) / 2.0;
            let dest = Rect::new(left, start, left + image.width() as f32, start + image.height() as f32);
            canvas.draw_image(image, dest);
        }
        self.advance_laser(frame);
    }

    fn draw_frame(&self, canvas: &mut dyn Canvas, frame: Rect) {
        if let Some(image) = &self.frame_image {
            canvas.draw_image(image, frame);
            return;
        }

        let stroke = self.config.frame_line_stroke_width;
        let fill: Fill = self.config.frame_color.into();
        canvas.fill_rect(Rect::new(frame.left, frame.top, frame.right, frame.top + stroke), fill);
        canvas.fill_rect(Rect::new(frame.left, frame.top, frame.left + stroke, frame.bottom), fill);
        canvas.fill_rect(Rect::new(frame.right - stroke, frame.top, frame.right, frame.bottom), fill);
        canvas.fill_rect(Rect::new(frame.left, frame.bottom - stroke, frame.right, frame.bottom), fill);

        self.draw_corners(canvas, frame);
    }

    fn draw_corners(&self, canvas: &mut dyn Canvas, frame: Rect) {
        let size = self.config.frame_corner_size;
        let stroke = self.config.frame_corner_stroke_width;
        let fill: Fill = self.config.frame_corner_color.into();
        let Rect {
            left,
            top,
            right,
            bottom,
        } = frame;

        let marks = [
            // top left
            Rect::new(left, top, left + stroke, top + size),
            Rect::new(left, top, left + size, top + stroke),
            // top right
            Rect::new(right - stroke, top, right, top + size),
            Rect::new(right - size, top, right, top + stroke),
            // bottom left
            Rect::new(left, bottom - stroke, left + size, bottom),
            Rect::new(left, bottom - size, left + stroke, bottom),
            // bottom right
            Rect::new(right - stroke, bottom - size, right, bottom),
            Rect::new(right - size, bottom - stroke, right, bottom),
        ];
        for mark in marks {
            canvas.fill_rect(mark, fill);
        }
    }

    fn draw_label(&self, canvas: &mut dyn Canvas, frame: Rect) {
        let Some(text) = self.config.label_text.as_deref().filter(|t| !t.is_empty()) else {
            return;
        };
        let size = self.config.label_text_size;
        let padding = self.config.label_text_padding;
        let line_height = size * LABEL_LINE_SPACING;
        let lines = text.lines().count().max(1) as f32;
        let x = frame.center().x;
        let y = match self.config.label_text_location {
            TextLocation::Bottom => frame.bottom + padding,
            TextLocation::Top => frame.top - padding - line_height * lines,
        };
        canvas.draw_text(text, Point::new(x, y), size, self.config.label_text_color, TextAlign::Center);
    }

    fn draw_result_point(&self, canvas: &mut dyn Canvas, point: Point, ratio: f32) {
        if let Some(image) = &self.point_image {
            let scale = if self.config.point_animation { ratio } else { 1.0 };
            let w = (image.width() as f32 * scale).round();
            let h = (image.height() as f32 * scale).round();
            let left = point.x - (w / 2.0).round();
            let top = point.y - (h / 2.0).round();
            canvas.draw_image(image, Rect::new(left, top, left + w, top + h));
            return;
        }

        canvas.fill_circle(point, self.point_stroke_radius() * ratio, self.config.point_stroke_color);
        canvas.fill_circle(point, self.config.point_radius * ratio, self.config.point_color);
    }
}
