//! Camera session: binding, controls and the analysis worker

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use image::DynamicImage;
use tracing::{debug, error, info, instrument, trace, warn};

use super::beep::{BeepManager, FeedbackSink};
use super::config::CameraConfig;
use super::gesture::{TapDetector, TouchEvent};
use super::light::{AmbientLightManager, FlashlightView, LightLevel};
use super::{Camera, CameraProvider, FrameSink, ZoomState};
use crate::capture::frame::PlanarImage;
use crate::error::SetupError;
use crate::pipeline::{Analyzer, AnalyzeResult, Lifecycle, Listener, MainHandle, Outcome, ResultBridge};

const ZOOM_STEP: f32 = 0.1;

/// Receives scan outcomes on the main thread.
pub trait ScanResultCallback<T>: Send {
    fn on_scan_result(&mut self, result: AnalyzeResult<T>);

    fn on_scan_failure(&mut self) {}
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionOptions {
    /// Analyze live frames from the start
    pub analyze: bool,
    pub auto_stop_analyze: bool,
    pub play_beep: bool,
    pub vibrate: bool,
    pub touch_zoom: bool,
    pub dark_lux: f32,
    pub bright_lux: f32,
    pub light_interval: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            analyze: true,
            auto_stop_analyze: true,
            play_beep: false,
            vibrate: false,
            touch_zoom: true,
            dark_lux: super::light::DEFAULT_DARK_LUX,
            bright_lux: super::light::DEFAULT_BRIGHT_LUX,
            light_interval: super::light::DEFAULT_INTERVAL,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// State shared between the session, its worker and the main-thread observer
struct Shared<T> {
    analyze: AtomicBool,
    auto_stop: AtomicBool,
    handling: AtomicBool,
    stills_pending: AtomicUsize,
    analyzer: ArcSwapOption<Arc<dyn Analyzer<T>>>,
    beep: Mutex<BeepManager>,
    callback: Mutex<Option<Box<dyn ScanResultCallback<T>>>>,
}

impl<T> Shared<T> {
    fn accepts_frames(&self) -> bool {
        self.analyze.load(Ordering::Acquire)
            && !self.handling.load(Ordering::Acquire)
            && self.stills_pending.load(Ordering::Acquire) == 0
    }

    /// Runs on the main thread for every value leaving the bridge.
    fn handle(&self, value: Option<AnalyzeResult<T>>) {
        let Some(result) = value else {
            if let Some(callback) = lock(&self.callback).as_mut() {
                callback.on_scan_failure();
            }
            return;
        };

        if !self.analyze.load(Ordering::Acquire) || self.handling.swap(true, Ordering::AcqRel) {
            trace!("analysis stopped, result discarded");
            return;
        }
        if self.auto_stop.load(Ordering::Acquire) {
            self.analyze.store(false, Ordering::Release);
        }
        lock(&self.beep).play_beep_and_vibrate();
        if let Some(callback) = lock(&self.callback).as_mut() {
            callback.on_scan_result(result);
        }
        self.handling.store(false, Ordering::Release);
    }
}

enum Job {
    Frame(PlanarImage),
    Still(DynamicImage),
}

fn run_worker<T: Send + 'static>(
    shared: Arc<Shared<T>>,
    frames: flume::Receiver<PlanarImage>,
    stills: flume::Receiver<DynamicImage>,
    listener: Listener<T>,
) {
    debug!("analysis worker started");
    loop {
        let job = flume::Selector::new()
            .recv(&stills, |r| r.map(Job::Still))
            .recv(&frames, |r| r.map(Job::Frame))
            .wait();
        let Ok(job) = job else {
            break;
        };

        match job {
            Job::Frame(frame) => {
                if !shared.accepts_frames() {
                    trace!("analysis paused, frame skipped");
                    continue;
                }
                if let Some(analyzer) = shared.analyzer.load_full() {
                    analyzer.analyze_frame(&frame, listener.clone());
                }
            }
            Job::Still(image) => {
                match shared.analyzer.load_full() {
                    Some(analyzer) => {
                        analyzer.analyze_still(&image, listener.clone());
                    }
                    None => {
                        warn!("no analyzer set, still image ignored");
                        listener(Outcome::Failure(None));
                    }
                }
                shared.stills_pending.fetch_sub(1, Ordering::AcqRel);
            }
        }
    }
    debug!("analysis worker stopped");
}

/// Owns one camera binding and the analysis worker that consumes its frames.
///
/// Frames reach the worker through a one-slot channel; the camera thread never
/// blocks and frames are dropped while the worker is busy. Outcomes go through
/// the [`ResultBridge`] and are handled on the main thread.
pub struct CameraSession<T: Send + 'static> {
    provider: Arc<dyn CameraProvider>,
    camera_config: Arc<dyn CameraConfig>,
    camera: Option<Arc<dyn Camera>>,
    shared: Arc<Shared<T>>,
    bridge: ResultBridge<T>,
    frames: flume::Sender<PlanarImage>,
    stills: Option<flume::Sender<DynamicImage>>,
    worker: Option<JoinHandle<()>>,
    light: AmbientLightManager,
    flashlight: Option<Arc<dyn FlashlightView>>,
    tap: TapDetector,
    touch_zoom: bool,
    released: bool,
}

impl<T: Send + 'static> CameraSession<T> {
    pub fn new(
        provider: Arc<dyn CameraProvider>,
        camera_config: Arc<dyn CameraConfig>,
        main: MainHandle,
        lifecycle: &Lifecycle,
        options: SessionOptions,
    ) -> Result<Self, SetupError> {
        let shared = Arc::new(Shared {
            analyze: AtomicBool::new(options.analyze),
            auto_stop: AtomicBool::new(options.auto_stop_analyze),
            handling: AtomicBool::new(false),
            stills_pending: AtomicUsize::new(0),
            analyzer: ArcSwapOption::empty(),
            beep: Mutex::new(BeepManager::new(None, options.play_beep, options.vibrate)),
            callback: Mutex::new(None),
        });

        let bridge = ResultBridge::new(main, lifecycle);
        {
            let shared = shared.clone();
            bridge.observe(move |value| shared.handle(value));
        }

        let listener: Listener<T> = {
            let bridge = bridge.clone();
            Arc::new(move |outcome: Outcome<T>| match outcome {
                Outcome::Success(result) => bridge.post(Some(result)),
                Outcome::Failure(cause) => {
                    if let Some(e) = cause {
                        debug!(error = %e, "analysis failed");
                    }
                    bridge.post(None);
                }
            })
        };

        let (frames_tx, frames_rx) = flume::bounded(1);
        let (stills_tx, stills_rx) = flume::unbounded();
        let worker = {
            let shared = shared.clone();
            std::thread::Builder::new()
                .name("codescan-analysis".into())
                .spawn(move || run_worker(shared, frames_rx, stills_rx, listener))?
        };

        Ok(Self {
            provider,
            camera_config,
            camera: None,
            shared,
            bridge,
            frames: frames_tx,
            stills: Some(stills_tx),
            worker: Some(worker),
            light: AmbientLightManager::new(options.dark_lux, options.bright_lux, options.light_interval),
            flashlight: None,
            tap: TapDetector::default(),
            touch_zoom: options.touch_zoom,
            released: false,
        })
    }

    fn frame_sink(&self) -> FrameSink {
        let frames = self.frames.clone();
        Arc::new(move |frame| {
            if frames.try_send(frame).is_err() {
                metrics::counter!("codescan_frames_dropped").increment(1);
            }
        })
    }

    /// Bind the camera, replacing any previous binding. Failures are logged
    /// and leave the session unbound.
    #[instrument(skip(self))]
    pub fn start_camera(&mut self) {
        if self.released {
            warn!("session released, camera not started");
            return;
        }
        if self.camera.is_some() {
            self.provider.unbind_all();
            self.camera = None;
        }

        match self.provider.bind(self.camera_config.as_ref(), self.frame_sink()) {
            Ok(camera) => {
                info!(flash = camera.has_flash_unit(), "camera bound");
                self.camera = Some(camera);
            }
            Err(e) => error!(error = %e, "failed to bind camera"),
        }
    }

    pub fn stop_camera(&mut self) {
        if self.camera.take().is_some() {
            debug!("camera unbound");
        }
        self.provider.unbind_all();
    }

    /// Tear everything down. Safe to call more than once.
    pub fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        self.shared.analyze.store(false, Ordering::Release);
        self.flashlight = None;
        self.light.set_enabled(false);
        self.light.unregister();
        lock(&self.shared.beep).close();
        self.stop_camera();
        if let Some(analyzer) = self.shared.analyzer.swap(None) {
            analyzer.release();
        }

        self.stills = None;
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("analysis worker panicked");
            }
        }
        info!("camera session released");
    }

    pub fn is_released(&self) -> bool {
        self.released
    }

    pub fn camera(&self) -> Option<&Arc<dyn Camera>> {
        self.camera.as_ref()
    }

    pub fn bridge(&self) -> &ResultBridge<T> {
        &self.bridge
    }

    pub fn zoom_state(&self) -> Option<ZoomState> {
        self.camera.as_ref()?.zoom_state()
    }

    pub fn zoom_to(&self, ratio: f32) {
        let Some(camera) = &self.camera else {
            return;
        };
        let Some(state) = camera.zoom_state() else {
            return;
        };
        if let Err(e) = camera.set_zoom_ratio(state.clamp(ratio)) {
            warn!(error = %e, ratio, "zoom failed");
        }
    }

    pub fn zoom_in(&self) {
        if let Some(state) = self.zoom_state() {
            self.zoom_to(state.ratio + ZOOM_STEP);
        }
    }

    pub fn zoom_out(&self) {
        if let Some(state) = self.zoom_state() {
            self.zoom_to(state.ratio - ZOOM_STEP);
        }
    }

    /// Zoom on the linear 0..=1 scale.
    pub fn line_zoom_to(&self, linear: f32) {
        let Some(camera) = &self.camera else {
            return;
        };
        if let Err(e) = camera.set_linear_zoom(linear.clamp(0.0, 1.0)) {
            warn!(error = %e, linear, "linear zoom failed");
        }
    }

    pub fn line_zoom_in(&self) {
        if let Some(state) = self.zoom_state() {
            self.line_zoom_to(state.linear + ZOOM_STEP);
        }
    }

    pub fn line_zoom_out(&self) {
        if let Some(state) = self.zoom_state() {
            self.line_zoom_to(state.linear - ZOOM_STEP);
        }
    }

    /// Pinch zoom. Returns whether the gesture was consumed.
    pub fn on_scale(&self, factor: f32) -> bool {
        if !self.touch_zoom {
            return false;
        }
        match self.zoom_state() {
            Some(state) => {
                self.zoom_to(state.ratio * factor);
                true
            }
            None => false,
        }
    }

    pub fn set_touch_zoom(&mut self, touch_zoom: bool) {
        self.touch_zoom = touch_zoom;
    }

    /// Feed a touch event. A tap starts focus and metering at the tap point
    /// when the camera supports it; returns whether it did.
    pub fn on_touch(&mut self, event: &TouchEvent) -> bool {
        let Some(point) = self.tap.on_touch(event) else {
            return false;
        };
        let Some(camera) = &self.camera else {
            return false;
        };
        if !camera.focus_and_metering_supported() {
            trace!("focus and metering unsupported");
            return false;
        }
        match camera.start_focus_and_metering(point.x, point.y) {
            Ok(()) => {
                debug!(x = point.x, y = point.y, "focus and metering started");
                true
            }
            Err(e) => {
                warn!(error = %e, "focus and metering failed");
                false
            }
        }
    }

    pub fn enable_torch(&self, on: bool) {
        let Some(camera) = &self.camera else {
            return;
        };
        if !camera.has_flash_unit() {
            return;
        }
        if let Err(e) = camera.enable_torch(on) {
            warn!(error = %e, on, "torch control failed");
        }
    }

    pub fn is_torch_enabled(&self) -> bool {
        self.camera.as_ref().is_some_and(|camera| camera.torch_enabled())
    }

    pub fn has_flash_unit(&self) -> bool {
        self.camera.as_ref().is_some_and(|camera| camera.has_flash_unit())
    }

    /// Attach the torch toggle; ambient light is tracked only while one is bound.
    pub fn bind_flashlight_view(&mut self, view: Option<Arc<dyn FlashlightView>>) {
        self.light.set_enabled(view.is_some());
        self.flashlight = view;
    }

    pub fn on_light_reading(&mut self, lux: f32, at: Instant) {
        let Some(level) = self.light.on_reading(lux, at) else {
            return;
        };
        let Some(view) = &self.flashlight else {
            return;
        };
        let torch = self.is_torch_enabled();
        match level {
            LightLevel::Dark => {
                if !view.is_visible() {
                    view.set_visible(true);
                    view.set_selected(torch);
                }
            }
            LightLevel::Bright => {
                if view.is_visible() && !torch {
                    view.set_visible(false);
                    view.set_selected(false);
                }
            }
        }
    }

    pub fn set_dark_lux(&mut self, lux: f32) {
        self.light.set_dark_lux(lux);
    }

    pub fn set_bright_lux(&mut self, lux: f32) {
        self.light.set_bright_lux(lux);
    }

    /// Swap the analyzer. The previous one is released.
    pub fn set_analyzer(&self, analyzer: Arc<dyn Analyzer<T>>) {
        if let Some(previous) = self.shared.analyzer.swap(Some(Arc::new(analyzer))) {
            previous.release();
        }
    }

    pub fn set_analyze_image(&self, analyze: bool) {
        self.shared.analyze.store(analyze, Ordering::Release);
    }

    pub fn is_analyze_image(&self) -> bool {
        self.shared.analyze.load(Ordering::Acquire)
    }

    pub fn set_auto_stop_analyze(&self, auto_stop: bool) {
        self.shared.auto_stop.store(auto_stop, Ordering::Release);
    }

    pub fn set_play_beep(&self, play_beep: bool) {
        lock(&self.shared.beep).set_play_beep(play_beep);
    }

    pub fn set_vibrate(&self, vibrate: bool) {
        lock(&self.shared.beep).set_vibrate(vibrate);
    }

    pub fn set_feedback_sink(&self, sink: Box<dyn FeedbackSink>) {
        if self.released {
            return;
        }
        lock(&self.shared.beep).set_sink(sink);
    }

    pub fn set_callback(&self, callback: impl ScanResultCallback<T> + 'static) {
        *lock(&self.shared.callback) = Some(Box::new(callback));
    }

    /// Queue a still image for analysis. Live frames pause until it has been
    /// submitted.
    pub fn analyze_image(&self, image: DynamicImage) {
        let Some(stills) = &self.stills else {
            warn!("session released, image not analyzed");
            return;
        };
        self.shared.stills_pending.fetch_add(1, Ordering::AcqRel);
        if stills.send(image).is_err() {
            self.shared.stills_pending.fetch_sub(1, Ordering::AcqRel);
            warn!("analysis worker gone, image not analyzed");
        }
    }
}

impl<T: Send + 'static> Drop for CameraSession<T> {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::config::{AdaptiveCameraConfig, LensFacing};
    use crate::capture::frame::{FrameMetadata, ImageFormat};
    use crate::error::CameraError;
    use crate::pipeline::{FrameBufferPool, LifecycleState, MainThread, Submit};
    use bytes::Bytes;

    struct NoCamera;

    impl CameraProvider for NoCamera {
        fn bind(&self, _config: &dyn CameraConfig, _sink: FrameSink) -> Result<Arc<dyn Camera>, CameraError> {
            Err(CameraError::Bind("no camera attached".into()))
        }

        fn unbind_all(&self) {}
    }

    /// Succeeds on every still with its width as payload; counts frames.
    #[derive(Default)]
    struct CountingAnalyzer {
        pool: FrameBufferPool,
        frames: AtomicUsize,
    }

    impl Analyzer<u32> for CountingAnalyzer {
        fn analyze_frame(&self, _image: &PlanarImage, _listener: Listener<u32>) -> Submit {
            self.frames.fetch_add(1, Ordering::SeqCst);
            Submit::Dispatched
        }

        fn analyze_still(&self, image: &DynamicImage, listener: Listener<u32>) -> Submit {
            let meta = FrameMetadata::new(2, 2, 0);
            let buffer = self.pool.acquire(2, 2);
            listener(Outcome::Success(AnalyzeResult::new(buffer, ImageFormat::Nv21, meta, image.width())));
            Submit::Dispatched
        }

        fn release(&self) {}
    }

    #[derive(Clone, Default)]
    struct Collect(Arc<Mutex<Vec<Option<u32>>>>);

    impl ScanResultCallback<u32> for Collect {
        fn on_scan_result(&mut self, result: AnalyzeResult<u32>) {
            self.0.lock().unwrap().push(Some(*result.result()));
        }

        fn on_scan_failure(&mut self) {
            self.0.lock().unwrap().push(None);
        }
    }

    fn session(main: &MainThread, lifecycle: &Lifecycle) -> CameraSession<u32> {
        let config = Arc::new(AdaptiveCameraConfig::new(720, 1280, LensFacing::Back));
        CameraSession::new(Arc::new(NoCamera), config, main.handle(), lifecycle, SessionOptions::default()).unwrap()
    }

    #[test]
    fn test_bind_failure_leaves_session_unbound() {
        let main = MainThread::new();
        let lifecycle = Lifecycle::new();
        let mut session = session(&main, &lifecycle);
        session.start_camera();
        assert!(session.camera().is_none());
        assert!(!session.has_flash_unit());
        session.zoom_in();
        session.enable_torch(true);
        assert!(!session.is_torch_enabled());
    }

    #[test]
    fn test_auto_stop_after_first_result() {
        let main = MainThread::new();
        let lifecycle = Lifecycle::new();
        lifecycle.set(LifecycleState::Resumed);
        let session = session(&main, &lifecycle);
        let seen = Collect::default();
        session.set_callback(seen.clone());
        session.set_analyzer(Arc::new(CountingAnalyzer::default()));

        session.analyze_image(DynamicImage::new_rgb8(7, 3));
        session.analyze_image(DynamicImage::new_rgb8(9, 3));
        let done = main.run_until(Duration::from_secs(5), || !seen.0.lock().unwrap().is_empty());
        assert!(done);
        main.run_for(Duration::from_millis(50));

        assert_eq!(*seen.0.lock().unwrap(), vec![Some(7)]);
        assert!(!session.is_analyze_image());
    }

    #[test]
    fn test_frames_skipped_while_analysis_disabled() {
        let main = MainThread::new();
        let lifecycle = Lifecycle::new();
        let session = session(&main, &lifecycle);
        let analyzer = Arc::new(CountingAnalyzer::default());
        session.set_analyzer(analyzer.clone());
        let sink = session.frame_sink();

        let frame = || PlanarImage::from_yuyv(Bytes::from(vec![0u8; 16]), 4, 2, 0);
        session.set_analyze_image(false);
        sink(frame());
        std::thread::sleep(Duration::from_millis(50));
        assert_eq!(analyzer.frames.load(Ordering::SeqCst), 0);

        session.set_analyze_image(true);
        let deadline = Instant::now() + Duration::from_secs(5);
        while analyzer.frames.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            sink(frame());
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(analyzer.frames.load(Ordering::SeqCst) > 0);
    }

    #[test]
    fn test_release_is_idempotent() {
        let main = MainThread::new();
        let lifecycle = Lifecycle::new();
        let mut session = session(&main, &lifecycle);
        session.release();
        session.release();
        assert!(session.is_released());
        session.analyze_image(DynamicImage::new_rgb8(1, 1));
    }
}
