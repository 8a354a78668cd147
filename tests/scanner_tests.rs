mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use image::DynamicImage;

use codescan::camera::{AdaptiveCameraConfig, Camera, CameraConfig, CameraProvider, FrameSink, LensFacing};
use codescan::detect::DetectedSymbol;
use codescan::display::{DisplayList, ViewState};
use codescan::error::CameraError;
use codescan::geometry::{Point, Rect};
use codescan::pipeline::{LifecycleState, MainThread};
use codescan::scanner::{ScanHandler, ScannerController};
use codescan::Config;

use common::{qr, scripted_adapter, RUNTIME};

const WAIT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
enum Event {
    Result(String),
    Choice(usize),
    Failure,
}

#[derive(Clone, Default)]
struct Recorder(Arc<Mutex<Vec<Event>>>);

impl Recorder {
    fn events(&self) -> Vec<Event> {
        self.0.lock().unwrap().clone()
    }
}

impl ScanHandler for Recorder {
    fn on_scan_result(&mut self, symbol: &DetectedSymbol) {
        self.0.lock().unwrap().push(Event::Result(symbol.text.clone()));
    }

    fn on_choice_required(&mut self, symbols: &[DetectedSymbol]) {
        self.0.lock().unwrap().push(Event::Choice(symbols.len()));
    }

    fn on_scan_failure(&mut self) {
        self.0.lock().unwrap().push(Event::Failure);
    }
}

struct NoCamera;

impl CameraProvider for NoCamera {
    fn bind(&self, _config: &dyn CameraConfig, _sink: FrameSink) -> Result<Arc<dyn Camera>, CameraError> {
        Err(CameraError::Bind("no camera attached".into()))
    }

    fn unbind_all(&self) {}
}

struct Fixture {
    main: MainThread,
    recorder: Recorder,
    replies: flume::Sender<Vec<DetectedSymbol>>,
    controller: ScannerController,
}

fn fixture() -> Fixture {
    let main = MainThread::new();
    let recorder = Recorder::default();
    let (adapter, replies) = scripted_adapter();
    let mut config = Config::default();
    config.scanner.play_beep = false;

    let controller = ScannerController::with_adapter(
        &config,
        Arc::new(NoCamera),
        Arc::new(AdaptiveCameraConfig::new(800, 800, LensFacing::Back)),
        main.handle(),
        recorder.clone(),
        RUNTIME.handle().clone(),
        adapter,
    )
    .unwrap();
    controller.resize(800, 800);

    Fixture {
        main,
        recorder,
        replies,
        controller,
    }
}

impl Fixture {
    fn wait_for_events(&self, count: usize) -> bool {
        self.main.run_until(WAIT, || self.recorder.events().len() >= count)
    }
}

#[test]
fn single_symbol_maps_to_view_and_completes() {
    let mut f = fixture();
    f.controller.on_start();
    f.controller.on_resume();

    f.replies.send(vec![qr("hello", Rect::new(300.0, 220.0, 340.0, 260.0))]).unwrap();
    f.controller.analyze_image(DynamicImage::new_rgb8(640, 480));
    assert!(f.wait_for_events(1));

    assert_eq!(f.recorder.events(), vec![Event::Result("hello".into())]);
    let points = f.controller.with_viewfinder(|vf| vf.result_points().to_vec());
    assert_eq!(points.len(), 1);
    assert!(points[0].distance(Point::new(400.0, 400.0)) < 0.01);
    assert!(!f.controller.session().is_analyze_image());
    assert!(f.controller.pending_symbols().is_none());

    f.controller.resume_scanning();
    assert!(f.controller.session().is_analyze_image());
    assert_eq!(f.controller.with_viewfinder(|vf| vf.state().clone()), ViewState::Scanning);
}

#[test]
fn several_symbols_wait_for_a_tap() {
    let mut f = fixture();
    f.controller.on_start();
    f.controller.on_resume();

    f.replies
        .send(vec![
            qr("left", Rect::new(300.0, 220.0, 340.0, 260.0)),
            qr("right", Rect::new(460.0, 220.0, 500.0, 260.0)),
        ])
        .unwrap();
    f.controller.analyze_image(DynamicImage::new_rgb8(640, 480));
    assert!(f.wait_for_events(1));
    assert_eq!(f.recorder.events(), vec![Event::Choice(2)]);
    assert_eq!(f.controller.pending_symbols().map(|s| s.len()), Some(2));

    // Markers keep pulsing while the choice is pending
    let mut canvas = DisplayList::new(800, 800);
    assert!(f.controller.draw(&mut canvas).is_some());

    // Right symbol centre (480, 240) lands at (666.7, 400)
    assert_eq!(f.controller.on_viewfinder_tap(10.0, 10.0), None);
    assert_eq!(f.controller.on_viewfinder_tap(666.0, 401.0), Some(1));
    assert_eq!(
        f.recorder.events(),
        vec![Event::Choice(2), Event::Result("right".into())]
    );
    assert!(f.controller.pending_symbols().is_none());
}

#[test]
fn failures_leave_scanner_animating() {
    let mut f = fixture();
    f.controller.on_start();
    f.controller.on_resume();

    f.replies.send(Vec::new()).unwrap();
    f.controller.analyze_image(DynamicImage::new_rgb8(64, 48));
    assert!(f.wait_for_events(1));

    assert_eq!(f.recorder.events(), vec![Event::Failure]);
    assert_eq!(f.controller.with_viewfinder(|vf| vf.state().clone()), ViewState::Scanning);
    assert!(f.controller.session().is_analyze_image());
}

#[test]
fn results_wait_for_an_active_owner() {
    let mut f = fixture();
    f.controller.on_create();
    assert_eq!(f.controller.lifecycle(), LifecycleState::Created);
    assert!(f.controller.session().camera().is_none());

    f.replies.send(vec![qr("held", Rect::new(0.0, 0.0, 8.0, 8.0))]).unwrap();
    f.controller.analyze_image(DynamicImage::new_rgb8(64, 48));
    f.main.run_until(WAIT, || f.controller.session().bridge().has_pending());
    f.main.run_for(Duration::from_millis(50));
    assert!(f.recorder.events().is_empty());

    f.controller.on_start();
    assert!(f.wait_for_events(1));
    assert_eq!(f.recorder.events(), vec![Event::Result("held".into())]);
}

#[test]
fn destroy_releases_session() {
    let mut f = fixture();
    f.controller.on_start();
    f.controller.on_resume();
    f.controller.on_pause();
    f.controller.on_stop();
    f.controller.on_destroy();

    assert_eq!(f.controller.lifecycle(), LifecycleState::Destroyed);
    assert!(f.controller.session().is_released());
    assert!(f.controller.analyzer().pool().stats().checked_out == 0);
}
