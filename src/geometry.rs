//! Screen and frame geometry, and the frame-to-view coordinate mapper

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: Point) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Axis-aligned rectangle, `left`/`top` inclusive, `right`/`bottom` exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Smallest rectangle covering every point, `None` for an empty slice.
    pub fn bounding(points: impl IntoIterator<Item = Point>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let init = Rect::new(first.x, first.y, first.x, first.y);
        Some(points.fold(init, |r, p| {
            Rect::new(r.left.min(p.x), r.top.min(p.y), r.right.max(p.x), r.bottom.max(p.y))
        }))
    }

    pub fn width(&self) -> f32 {
        self.right - self.left
    }

    pub fn height(&self) -> f32 {
        self.bottom - self.top
    }

    pub fn center(&self) -> Point {
        Point::new((self.left + self.right) / 2.0, (self.top + self.bottom) / 2.0)
    }

    pub fn contains_rect(&self, other: &Rect) -> bool {
        other.left >= self.left
            && other.top >= self.top
            && other.right <= self.right
            && other.bottom <= self.bottom
    }
}

/// How a source image is scaled into a destination view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FitMode {
    /// Uniform scale by the smaller ratio, centred with padding
    Fit,
    /// Uniform scale by the larger ratio, overflowing edges are cropped
    #[default]
    Fill,
}

fn scale_and_offset(src_w: f32, src_h: f32, dest_w: f32, dest_h: f32, mode: FitMode) -> (f32, f32, f32) {
    let width_ratio = dest_w / src_w;
    let height_ratio = dest_h / src_h;
    let ratio = match mode {
        FitMode::Fit => width_ratio.min(height_ratio),
        FitMode::Fill => width_ratio.max(height_ratio),
    };
    // Fit pads inwards, Fill crops: both centre the scaled image.
    let left = (dest_w - src_w * ratio) / 2.0;
    let top = (dest_h - src_h * ratio) / 2.0;
    (ratio, left, top)
}

/// Map a point from a `src_w`x`src_h` frame into a `dest_w`x`dest_h` view.
pub fn transform(
    x: f32,
    y: f32,
    src_w: f32,
    src_h: f32,
    dest_w: f32,
    dest_h: f32,
    mode: FitMode,
) -> Point {
    let (ratio, left, top) = scale_and_offset(src_w, src_h, dest_w, dest_h, mode);
    Point::new(x * ratio + left, y * ratio + top)
}

/// Inverse of [`transform`] for the same dimensions and mode.
pub fn inverse_transform(
    x: f32,
    y: f32,
    src_w: f32,
    src_h: f32,
    dest_w: f32,
    dest_h: f32,
    mode: FitMode,
) -> Point {
    let (ratio, left, top) = scale_and_offset(src_w, src_h, dest_w, dest_h, mode);
    Point::new((x - left) / ratio, (y - top) / ratio)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_fill_centres_square_view() {
        let p = transform(320.0, 240.0, 640.0, 480.0, 800.0, 800.0, FitMode::Fill);
        assert_eq!(p, Point::new(400.0, 400.0));
        let p = transform(320.0, 240.0, 640.0, 480.0, 800.0, 800.0, FitMode::Fit);
        assert_eq!(p, Point::new(400.0, 400.0));
    }

    #[test]
    fn test_fill_crops_and_fit_pads() {
        // 640x480 into 800x800: fill scales by 800/480, fit by 800/640
        let fill = transform(0.0, 0.0, 640.0, 480.0, 800.0, 800.0, FitMode::Fill);
        assert!(fill.x < 0.0);
        assert_eq!(fill.y, 0.0);
        let fit = transform(0.0, 0.0, 640.0, 480.0, 800.0, 800.0, FitMode::Fit);
        assert_eq!(fit.x, 0.0);
        assert_eq!(fit.y, 100.0);
    }

    #[test]
    fn test_bounding_rect() {
        let r = Rect::bounding([Point::new(3.0, 9.0), Point::new(1.0, 4.0), Point::new(7.0, 5.0)]).unwrap();
        assert_eq!(r, Rect::new(1.0, 4.0, 7.0, 9.0));
        assert!(Rect::bounding(Vec::new()).is_none());
    }

    fn mode() -> impl Strategy<Value = FitMode> {
        prop_oneof![Just(FitMode::Fit), Just(FitMode::Fill)]
    }

    proptest! {
        #[test]
        fn prop_round_trip_within_one_unit(
            src_w in 1u32..4000, src_h in 1u32..4000,
            dest_w in 1u32..4000, dest_h in 1u32..4000,
            fx in 0.0f32..1.0, fy in 0.0f32..1.0,
            mode in mode(),
        ) {
            let (sw, sh, dw, dh) = (src_w as f32, src_h as f32, dest_w as f32, dest_h as f32);
            let (x, y) = (fx * sw, fy * sh);
            let p = transform(x, y, sw, sh, dw, dh, mode);
            let back = inverse_transform(p.x, p.y, sw, sh, dw, dh, mode);
            prop_assert!((back.x - x).abs() <= 1.0);
            prop_assert!((back.y - y).abs() <= 1.0);
        }

        #[test]
        fn prop_fit_maps_centre_to_centre(
            src_w in 1u32..4000, src_h in 1u32..4000,
            dest_w in 1u32..4000, dest_h in 1u32..4000,
        ) {
            let (sw, sh, dw, dh) = (src_w as f32, src_h as f32, dest_w as f32, dest_h as f32);
            let p = transform(sw / 2.0, sh / 2.0, sw, sh, dw, dh, FitMode::Fit);
            prop_assert!((p.x - dw / 2.0).abs() < 1e-2);
            prop_assert!((p.y - dh / 2.0).abs() < 1e-2);
        }
    }
}
