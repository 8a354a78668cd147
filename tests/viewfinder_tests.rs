use proptest::prelude::*;

use codescan::display::{
    Canvas, Color, DisplayList, DrawOp, FrameGravity, RasterCanvas, ViewState, Viewfinder, ViewfinderConfig,
    ViewfinderStyle,
};
use codescan::geometry::{Point, Rect};

fn gravity() -> impl Strategy<Value = FrameGravity> {
    prop_oneof![
        Just(FrameGravity::Center),
        Just(FrameGravity::Left),
        Just(FrameGravity::Top),
        Just(FrameGravity::Right),
        Just(FrameGravity::Bottom),
    ]
}

proptest! {
    #[test]
    fn frame_stays_inside_view(
        width in 1u32..3000,
        height in 1u32..3000,
        frame_width in 0u32..3500,
        frame_height in 0u32..3500,
        ratio in 0.05f32..=1.0,
        gravity in gravity(),
        padding in (0f32..400.0, 0f32..400.0, 0f32..400.0, 0f32..400.0),
    ) {
        let config = ViewfinderConfig {
            frame_width,
            frame_height,
            frame_ratio: ratio,
            frame_gravity: gravity,
            frame_padding_left: padding.0,
            frame_padding_top: padding.1,
            frame_padding_right: padding.2,
            frame_padding_bottom: padding.3,
            ..ViewfinderConfig::default()
        };
        let mut vf = Viewfinder::new(config);
        vf.resize(width, height);

        let frame = vf.frame().unwrap();
        let view = Rect::new(0.0, 0.0, width as f32, height as f32);
        prop_assert!(view.contains_rect(&frame), "{:?} outside {:?}", frame, view);
        prop_assert!(frame.width() >= 1.0 && frame.height() >= 1.0);
    }

    #[test]
    fn laser_stays_inside_frame(width in 50u32..1200, height in 50u32..1200, ticks in 1usize..300) {
        let mut vf = Viewfinder::new(ViewfinderConfig::default());
        vf.resize(width, height);
        let frame = vf.frame().unwrap();
        let mut canvas = DisplayList::new(width, height);
        for _ in 0..ticks {
            vf.draw(&mut canvas);
            canvas.clear();
            let position = vf.scanner_position().unwrap();
            prop_assert!(position >= frame.top && position < frame.bottom);
        }
    }
}

#[test]
fn zero_sized_view_has_no_frame() {
    let mut vf = Viewfinder::new(ViewfinderConfig::default());
    vf.resize(0, 600);
    assert!(vf.frame().is_none());
    let mut canvas = DisplayList::new(0, 600);
    assert!(vf.draw(&mut canvas).is_none());
}

#[test]
fn result_markers_replace_laser() {
    let mut vf = Viewfinder::new(ViewfinderConfig::default());
    vf.resize(400, 400);
    vf.show_result_points(vec![Point::new(100.0, 100.0), Point::new(300.0, 300.0)]);
    assert!(matches!(vf.state(), ViewState::ShowingResults(points) if points.len() == 2));

    let mut canvas = DisplayList::new(400, 400);
    let next = vf.draw(&mut canvas).unwrap();
    assert_eq!(next.region, None);
    let circles: Vec<Point> = canvas
        .ops()
        .iter()
        .filter_map(|op| match op {
            DrawOp::Circle { center, .. } => Some(*center),
            _ => None,
        })
        .collect();
    assert!(circles.contains(&Point::new(100.0, 100.0)));
    assert!(circles.contains(&Point::new(300.0, 300.0)));
    assert!(!canvas.ops().iter().any(|op| matches!(op, DrawOp::Oval { .. })));

    assert_eq!(vf.on_tap(305.0, 296.0), Some(1));
    vf.show_scanner();
    assert_eq!(vf.on_tap(305.0, 296.0), None);
}

#[test]
fn raster_overlay_masks_outside_frame() {
    let mut config = ViewfinderConfig::default();
    config.mask_color = Color(0xFF00_0000);
    config.style = ViewfinderStyle::Classic;
    let mut vf = Viewfinder::new(config);
    vf.resize(200, 200);

    let mut canvas = RasterCanvas::new(200, 200);
    vf.draw(&mut canvas);
    assert_eq!(canvas.size(), (200, 200));
    let image = canvas.into_image();
    // Corner is masked, the frame centre is left alone
    assert_eq!(image.get_pixel(2, 2).0, [0, 0, 0, 255]);
    assert_ne!(image.get_pixel(100, 100).0, [0, 0, 0, 255]);
}
