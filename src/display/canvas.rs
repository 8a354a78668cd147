//! Drawing surface for the viewfinder overlay
//!
//! The viewfinder only talks to [`Canvas`]. [`DisplayList`] records the calls
//! for a host toolkit (or a test) to replay, [`RasterCanvas`] blends them into
//! an RGBA image.

use std::fmt;
use std::str::FromStr;

use image::{Rgba, RgbaImage};
use serde::{Deserialize, Serialize};

use crate::geometry::{Point, Rect};

/// 32-bit ARGB color, written as `#RRGGBB` or `#AARRGGBB` in config files
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Color(pub u32);

impl Color {
    pub const TRANSPARENT: Color = Color(0);
    pub const WHITE: Color = Color(0xFFFF_FFFF);

    pub const fn argb(a: u8, r: u8, g: u8, b: u8) -> Self {
        Color((a as u32) << 24 | (r as u32) << 16 | (g as u32) << 8 | b as u32)
    }

    pub fn alpha(self) -> u8 {
        (self.0 >> 24) as u8
    }

    pub fn red(self) -> u8 {
        (self.0 >> 16) as u8
    }

    pub fn green(self) -> u8 {
        (self.0 >> 8) as u8
    }

    pub fn blue(self) -> u8 {
        self.0 as u8
    }

    pub fn is_transparent(self) -> bool {
        self.alpha() == 0
    }

    /// Same color at the lowest visible alpha; the faded end of laser gradients.
    pub fn shade(self) -> Self {
        Color(0x0100_0000 | (self.0 & 0x00FF_FFFF))
    }

    /// Linear interpolation in ARGB space, `t` in 0..=1.
    pub fn lerp(self, other: Color, t: f32) -> Self {
        let t = t.clamp(0.0, 1.0);
        let mix = |a: u8, b: u8| (a as f32 + (b as f32 - a as f32) * t).round() as u8;
        Color::argb(
            mix(self.alpha(), other.alpha()),
            mix(self.red(), other.red()),
            mix(self.green(), other.green()),
            mix(self.blue(), other.blue()),
        )
    }

    pub fn to_rgba(self) -> Rgba<u8> {
        Rgba([self.red(), self.green(), self.blue(), self.alpha()])
    }
}

impl fmt::Debug for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08X}", self.0)
    }
}

impl fmt::Display for Color {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:08X}", self.0)
    }
}

impl FromStr for Color {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let hex = s.trim().trim_start_matches('#');
        let value = u32::from_str_radix(hex, 16).map_err(|e| format!("invalid color {s:?}: {e}"))?;
        match hex.len() {
            6 => Ok(Color(0xFF00_0000 | value)),
            8 => Ok(Color(value)),
            _ => Err(format!("invalid color {s:?}: expected #RRGGBB or #AARRGGBB")),
        }
    }
}

impl TryFrom<String> for Color {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Color> for String {
    fn from(color: Color) -> Self {
        color.to_string()
    }
}

/// Solid color or a vertical gradient between two rows.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Fill {
    Solid(Color),
    /// `from` at `top`, `to` at `bottom`. With `mirror` the gradient repeats
    /// back and forth outside the span, otherwise the end colors extend.
    Vertical {
        top: f32,
        bottom: f32,
        from: Color,
        to: Color,
        mirror: bool,
    },
}

impl Fill {
    pub fn color_at(&self, y: f32) -> Color {
        match *self {
            Fill::Solid(color) => color,
            Fill::Vertical {
                top,
                bottom,
                from,
                to,
                mirror,
            } => {
                let span = bottom - top;
                if span <= f32::EPSILON {
                    return to;
                }
                let mut t = (y - top) / span;
                if mirror {
                    let period = t.rem_euclid(2.0);
                    t = if period > 1.0 { 2.0 - period } else { period };
                }
                from.lerp(to, t)
            }
        }
    }
}

impl From<Color> for Fill {
    fn from(color: Color) -> Self {
        Fill::Solid(color)
    }
}

/// Horizontal placement of label text relative to its anchor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextAlign {
    Left,
    Center,
}

pub trait Canvas {
    fn size(&self) -> (u32, u32);

    fn fill_rect(&mut self, rect: Rect, fill: Fill);

    fn fill_oval(&mut self, bounds: Rect, fill: Fill);

    fn fill_circle(&mut self, center: Point, radius: f32, color: Color);

    fn draw_line(&mut self, from: Point, to: Point, width: f32, fill: Fill);

    fn draw_image(&mut self, image: &RgbaImage, dest: Rect);

    fn draw_text(&mut self, text: &str, anchor: Point, size: f32, color: Color, align: TextAlign);
}

/// One recorded drawing call
#[derive(Debug, Clone, PartialEq)]
pub enum DrawOp {
    Rect { rect: Rect, fill: Fill },
    Oval { bounds: Rect, fill: Fill },
    Circle { center: Point, radius: f32, color: Color },
    Line { from: Point, to: Point, width: f32, fill: Fill },
    Image { width: u32, height: u32, dest: Rect },
    Text { text: String, anchor: Point, size: f32, color: Color },
}

/// Canvas that records drawing calls
#[derive(Debug, Clone, Default)]
pub struct DisplayList {
    width: u32,
    height: u32,
    ops: Vec<DrawOp>,
}

impl DisplayList {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ops: Vec::new(),
        }
    }

    pub fn ops(&self) -> &[DrawOp] {
        &self.ops
    }

    pub fn clear(&mut self) {
        self.ops.clear();
    }

    pub fn take(&mut self) -> Vec<DrawOp> {
        std::mem::take(&mut self.ops)
    }
}

impl Canvas for DisplayList {
    fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn fill_rect(&mut self, rect: Rect, fill: Fill) {
        self.ops.push(DrawOp::Rect { rect, fill });
    }

    fn fill_oval(&mut self, bounds: Rect, fill: Fill) {
        self.ops.push(DrawOp::Oval { bounds, fill });
    }

    fn fill_circle(&mut self, center: Point, radius: f32, color: Color) {
        self.ops.push(DrawOp::Circle { center, radius, color });
    }

    fn draw_line(&mut self, from: Point, to: Point, width: f32, fill: Fill) {
        self.ops.push(DrawOp::Line { from, to, width, fill });
    }

    fn draw_image(&mut self, image: &RgbaImage, dest: Rect) {
        self.ops.push(DrawOp::Image {
            width: image.width(),
            height: image.height(),
            dest,
        });
    }

    fn draw_text(&mut self, text: &str, anchor: Point, size: f32, color: Color, _align: TextAlign) {
        self.ops.push(DrawOp::Text {
            text: text.to_string(),
            anchor,
            size,
            color,
        });
    }
}

/// Software canvas blending into an RGBA image.
///
/// Text is not rasterized; there is no glyph source.
pub struct RasterCanvas {
    image: RgbaImage,
}

impl RasterCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            image: RgbaImage::new(width, height),
        }
    }

    pub fn from_image(image: RgbaImage) -> Self {
        Self { image }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn into_image(self) -> RgbaImage {
        self.image
    }

    fn blend(&mut self, x: i64, y: i64, color: Color) {
        if x < 0 || y < 0 || x >= self.image.width() as i64 || y >= self.image.height() as i64 {
            return;
        }
        let alpha = color.alpha() as u32;
        if alpha == 0 {
            return;
        }
        let pixel = self.image.get_pixel_mut(x as u32, y as u32);
        let src = [color.red(), color.green(), color.blue()];
        for (channel, src) in pixel.0.iter_mut().take(3).zip(src) {
            *channel = ((src as u32 * alpha + *channel as u32 * (255 - alpha)) / 255) as u8;
        }
        pixel.0[3] = (alpha + pixel.0[3] as u32 * (255 - alpha) / 255).min(255) as u8;
    }

    /// Pixel rows/columns whose centers fall inside `rect`, clipped to the image.
    fn span(&self, rect: &Rect) -> (i64, i64, i64, i64) {
        let x0 = (rect.left - 0.5).ceil().max(0.0) as i64;
        let y0 = (rect.top - 0.5).ceil().max(0.0) as i64;
        let x1 = ((rect.right - 0.5).ceil() as i64).min(self.image.width() as i64);
        let y1 = ((rect.bottom - 0.5).ceil() as i64).min(self.image.height() as i64);
        (x0, y0, x1, y1)
    }
}

impl Canvas for RasterCanvas {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn fill_rect(&mut self, rect: Rect, fill: Fill) {
        let (x0, y0, x1, y1) = self.span(&rect);
        for y in y0..y1 {
            let color = fill.color_at(y as f32 + 0.5);
            for x in x0..x1 {
                self.blend(x, y, color);
            }
        }
    }

    fn fill_oval(&mut self, bounds: Rect, fill: Fill) {
        let center = bounds.center();
        let (rx, ry) = (bounds.width() / 2.0, bounds.height() / 2.0);
        if rx <= 0.0 || ry <= 0.0 {
            return;
        }
        let (x0, y0, x1, y1) = self.span(&bounds);
        for y in y0..y1 {
            let dy = (y as f32 + 0.5 - center.y) / ry;
            let color = fill.color_at(y as f32 + 0.5);
            for x in x0..x1 {
                let dx = (x as f32 + 0.5 - center.x) / rx;
                if dx * dx + dy * dy <= 1.0 {
                    self.blend(x, y, color);
                }
            }
        }
    }

    fn fill_circle(&mut self, center: Point, radius: f32, color: Color) {
        let bounds = Rect::new(center.x - radius, center.y - radius, center.x + radius, center.y + radius);
        self.fill_oval(bounds, Fill::Solid(color));
    }

    fn draw_line(&mut self, from: Point, to: Point, width: f32, fill: Fill) {
        let half = (width / 2.0).max(0.5);
        let bounds = Rect::new(
            from.x.min(to.x) - half,
            from.y.min(to.y) - half,
            from.x.max(to.x) + half,
            from.y.max(to.y) + half,
        );
        let (dx, dy) = (to.x - from.x, to.y - from.y);
        let length_sq = dx * dx + dy * dy;
        let (x0, y0, x1, y1) = self.span(&bounds);
        for y in y0..y1 {
            let py = y as f32 + 0.5;
            let color = fill.color_at(py);
            for x in x0..x1 {
                let p = Point::new(x as f32 + 0.5, py);
                let t = if length_sq <= f32::EPSILON {
                    0.0
                } else {
                    (((p.x - from.x) * dx + (p.y - from.y) * dy) / length_sq).clamp(0.0, 1.0)
                };
                let nearest = Point::new(from.x + dx * t, from.y + dy * t);
                if p.distance(nearest) <= half {
                    self.blend(x, y, color);
                }
            }
        }
    }

    fn draw_image(&mut self, image: &RgbaImage, dest: Rect) {
        if image.width() == 0 || image.height() == 0 || dest.width() <= 0.0 || dest.height() <= 0.0 {
            return;
        }
        let sx = image.width() as f32 / dest.width();
        let sy = image.height() as f32 / dest.height();
        let (x0, y0, x1, y1) = self.span(&dest);
        for y in y0..y1 {
            let v = (((y as f32 + 0.5 - dest.top) * sy) as u32).min(image.height() - 1);
            for x in x0..x1 {
                let u = (((x as f32 + 0.5 - dest.left) * sx) as u32).min(image.width() - 1);
                let [r, g, b, a] = image.get_pixel(u, v).0;
                self.blend(x, y, Color::argb(a, r, g, b));
            }
        }
    }

    fn draw_text(&mut self, _text: &str, _anchor: Point, _size: f32, _color: Color, _align: TextAlign) {}
}
