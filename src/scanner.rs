//! Scanner controller: one camera session, one viewfinder, one result handler

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use image::DynamicImage;
use tokio::runtime::Handle;
use tracing::{debug, info};

use crate::camera::{
    CameraConfig, CameraProvider, CameraSession, FlashlightView, ScanResultCallback, TouchEvent,
};
use crate::detect::{CodeFormat, DecodeAdapter, DetectedSymbol};
use crate::display::{Canvas, Invalidate, Viewfinder};
use crate::error::SetupError;
use crate::geometry::{transform, FitMode, Point};
use crate::pipeline::{AnalyzeResult, CodeAnalyzer, Lifecycle, LifecycleState, MainHandle};
use crate::Config;

pub type ScanResult = AnalyzeResult<Vec<DetectedSymbol>>;

/// Application-side reaction to scans. Called on the main thread.
pub trait ScanHandler: Send {
    /// A single symbol was found, or the user picked one of several.
    fn on_scan_result(&mut self, symbol: &DetectedSymbol);

    /// Several symbols were found; markers are shown until one is tapped.
    fn on_choice_required(&mut self, _symbols: &[DetectedSymbol]) {}

    fn on_scan_failure(&mut self) {}
}

struct ScanView {
    viewfinder: Viewfinder,
    pending: Option<ScanResult>,
    handler: Box<dyn ScanHandler>,
    fit: FitMode,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Symbol centres mapped from the oriented frame onto the view.
pub fn result_points(result: &ScanResult, view_width: u32, view_height: u32, fit: FitMode) -> Vec<Point> {
    let (src_w, src_h) = (result.bitmap_width() as f32, result.bitmap_height() as f32);
    result
        .result()
        .iter()
        .map(|symbol| {
            let center = symbol.bounds.center();
            transform(center.x, center.y, src_w, src_h, view_width as f32, view_height as f32, fit)
        })
        .collect()
}

struct ViewCallback(Arc<Mutex<ScanView>>);

impl ScanResultCallback<Vec<DetectedSymbol>> for ViewCallback {
    fn on_scan_result(&mut self, result: ScanResult) {
        let mut view = lock(&self.0);
        let (width, height) = view.viewfinder.size();
        let points = result_points(&result, width, height, view.fit);
        view.viewfinder.show_result_points(points);

        match result.result().len() {
            0 => view.handler.on_scan_failure(),
            1 => {
                view.handler.on_scan_result(&result.result()[0]);
                view.pending = None;
            }
            count => {
                info!(count, "several symbols found, waiting for a choice");
                view.handler.on_choice_required(result.result());
                view.pending = Some(result);
            }
        }
    }

    fn on_scan_failure(&mut self) {
        lock(&self.0).handler.on_scan_failure();
    }
}

/// Drives one scanning screen.
///
/// Lifecycle hooks are plain methods called by the host, on the thread that
/// runs the [`crate::pipeline::MainThread`].
pub struct ScannerController {
    session: CameraSession<Vec<DetectedSymbol>>,
    lifecycle: Lifecycle,
    view: Arc<Mutex<ScanView>>,
    analyzer: Arc<CodeAnalyzer>,
    flashlight: Option<Arc<dyn FlashlightView>>,
}

impl ScannerController {
    pub fn new(
        config: &Config,
        provider: Arc<dyn CameraProvider>,
        camera_config: Arc<dyn CameraConfig>,
        main: MainHandle,
        handler: impl ScanHandler + 'static,
        runtime: Handle,
    ) -> Result<Self, SetupError> {
        let adapter = Arc::new(DecodeAdapter::new(config.scanner.format, config.scanner.backend));
        Self::with_adapter(config, provider, camera_config, main, handler, runtime, adapter)
    }

    /// Like [`ScannerController::new`] with a caller-supplied decode adapter.
    pub fn with_adapter(
        config: &Config,
        provider: Arc<dyn CameraProvider>,
        camera_config: Arc<dyn CameraConfig>,
        main: MainHandle,
        handler: impl ScanHandler + 'static,
        runtime: Handle,
        adapter: Arc<DecodeAdapter>,
    ) -> Result<Self, SetupError> {
        config.validate()?;

        let lifecycle = Lifecycle::new();
        let session = CameraSession::new(provider, camera_config, main, &lifecycle, config.session_options())?;
        let analyzer = Arc::new(CodeAnalyzer::new(adapter, runtime).with_still_wait(config.pipeline.still_wait()));
        session.set_analyzer(analyzer.clone());

        let view = Arc::new(Mutex::new(ScanView {
            viewfinder: Viewfinder::new(config.viewfinder.clone()),
            pending: None,
            handler: Box::new(handler),
            fit: config.pipeline.fit_mode,
        }));
        session.set_callback(ViewCallback(view.clone()));

        Ok(Self {
            session,
            lifecycle,
            view,
            analyzer,
            flashlight: None,
        })
    }

    fn transition(&self, state: LifecycleState) {
        self.lifecycle.set(state);
        self.session.bridge().on_lifecycle_changed();
    }

    pub fn on_create(&mut self) {
        self.transition(LifecycleState::Created);
        self.session.start_camera();
    }

    pub fn on_start(&mut self) {
        self.transition(LifecycleState::Started);
    }

    pub fn on_resume(&mut self) {
        self.transition(LifecycleState::Resumed);
    }

    pub fn on_pause(&mut self) {
        self.transition(LifecycleState::Started);
    }

    pub fn on_stop(&mut self) {
        self.transition(LifecycleState::Created);
    }

    pub fn on_destroy(&mut self) {
        self.transition(LifecycleState::Destroyed);
        self.flashlight = None;
        self.session.release();
    }

    pub fn lifecycle(&self) -> LifecycleState {
        self.lifecycle.state()
    }

    pub fn session(&self) -> &CameraSession<Vec<DetectedSymbol>> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut CameraSession<Vec<DetectedSymbol>> {
        &mut self.session
    }

    pub fn analyzer(&self) -> &Arc<CodeAnalyzer> {
        &self.analyzer
    }

    /// Run `f` against the viewfinder.
    pub fn with_viewfinder<R>(&self, f: impl FnOnce(&mut Viewfinder) -> R) -> R {
        f(&mut lock(&self.view).viewfinder)
    }

    pub fn resize(&self, width: u32, height: u32) {
        lock(&self.view).viewfinder.resize(width, height);
    }

    pub fn draw(&self, canvas: &mut dyn Canvas) -> Option<Invalidate> {
        lock(&self.view).viewfinder.draw(canvas)
    }

    /// The result waiting for a marker tap, if any.
    pub fn pending_symbols(&self) -> Option<Vec<DetectedSymbol>> {
        lock(&self.view).pending.as_ref().map(|result| result.result().clone())
    }

    /// Pick a marker. Returns the chosen index and hands that symbol to the
    /// handler.
    pub fn on_viewfinder_tap(&self, x: f32, y: f32) -> Option<usize> {
        let mut view = lock(&self.view);
        let index = view.viewfinder.on_tap(x, y)?;
        if let Some(pending) = view.pending.take() {
            if let Some(symbol) = pending.result().get(index) {
                debug!(index, text = %symbol.text, "result point chosen");
                view.handler.on_scan_result(symbol);
            }
        }
        Some(index)
    }

    /// Back to the laser animation with analysis enabled.
    pub fn resume_scanning(&self) {
        {
            let mut view = lock(&self.view);
            view.pending = None;
            view.viewfinder.show_scanner();
        }
        self.session.set_analyze_image(true);
    }

    /// Analyze a picked image instead of the live feed.
    pub fn analyze_image(&self, image: DynamicImage) {
        self.resume_scanning();
        self.session.analyze_image(image);
    }

    pub fn set_code_format(&self, format: CodeFormat) {
        self.analyzer.adapter().set_code_format(format);
    }

    pub fn set_flashlight_view(&mut self, view: Option<Arc<dyn FlashlightView>>) {
        self.flashlight = view.clone();
        self.session.bind_flashlight_view(view);
    }

    pub fn toggle_torch(&self) {
        let on = !self.session.is_torch_enabled();
        self.session.enable_torch(on);
        if let Some(view) = &self.flashlight {
            view.set_selected(on);
        }
    }

    pub fn on_light_reading(&mut self, lux: f32, at: Instant) {
        self.session.on_light_reading(lux, at);
    }

    pub fn on_touch(&mut self, event: &TouchEvent) -> bool {
        self.session.on_touch(event)
    }

    pub fn on_scale(&self, factor: f32) -> bool {
        self.session.on_scale(factor)
    }
}
