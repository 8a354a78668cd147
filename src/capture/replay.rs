//! File-backed camera: replays one image as a stream of preview frames

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use bytes::Bytes;
use image::DynamicImage;
use tracing::{debug, info, trace};

use super::convert::rgb_to_nv21;
use super::frame::{nv21_len, PlanarImage};
use crate::camera::{Camera, CameraConfig, CameraProvider, FrameSink, ZoomState};
use crate::error::{CameraError, ConvertError};

struct Streaming {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Camera provider that pushes the same frame at a fixed interval.
pub struct ReplayProvider {
    frame: PlanarImage,
    interval: Duration,
    streaming: Mutex<Option<Streaming>>,
}

impl ReplayProvider {
    pub fn new(image: &DynamicImage, interval: Duration) -> Result<Self, ConvertError> {
        let rgb = image.to_rgb8();
        let (width, height) = rgb.dimensions();
        let mut nv21 = vec![0u8; nv21_len(width, height)];
        rgb_to_nv21(&rgb, &mut nv21)?;

        Ok(Self {
            frame: PlanarImage::from_nv21(Bytes::from(nv21), width, height, 0),
            interval,
            streaming: Mutex::new(None),
        })
    }

    pub fn is_streaming(&self) -> bool {
        self.streaming
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn stop(&self) {
        let streaming = self.streaming.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(streaming) = streaming {
            streaming.stop.store(true, Ordering::Release);
            if streaming.thread.join().is_err() {
                tracing::error!("replay thread panicked");
            }
            debug!("replay stopped");
        }
    }
}

impl CameraProvider for ReplayProvider {
    fn bind(&self, config: &dyn CameraConfig, sink: FrameSink) -> Result<Arc<dyn Camera>, CameraError> {
        self.stop();
        info!(
            width = self.frame.width(),
            height = self.frame.height(),
            lens = ?config.lens_facing(),
            interval_ms = self.interval.as_millis(),
            "replay camera bound"
        );

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = stop.clone();
            let frame = self.frame.clone();
            let interval = self.interval;
            std::thread::Builder::new()
                .name("codescan-replay".into())
                .spawn(move || {
                    while !stop.load(Ordering::Acquire) {
                        let mut next = frame.clone();
                        next.timestamp = std::time::Instant::now();
                        sink(next);
                        trace!("replay frame pushed");
                        std::thread::sleep(interval);
                    }
                })?
        };

        *self.streaming.lock().unwrap_or_else(PoisonError::into_inner) = Some(Streaming { stop, thread });
        Ok(Arc::new(ReplayCamera))
    }

    fn unbind_all(&self) {
        self.stop();
    }
}

impl Drop for ReplayProvider {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Fixed-lens camera without flash
#[derive(Debug, Default)]
pub struct ReplayCamera;

impl Camera for ReplayCamera {
    fn zoom_state(&self) -> Option<ZoomState> {
        Some(ZoomState {
            ratio: 1.0,
            min_ratio: 1.0,
            max_ratio: 1.0,
            linear: 0.0,
        })
    }

    fn set_zoom_ratio(&self, _ratio: f32) -> Result<(), CameraError> {
        Ok(())
    }

    fn set_linear_zoom(&self, _linear: f32) -> Result<(), CameraError> {
        Ok(())
    }

    fn enable_torch(&self, _on: bool) -> Result<(), CameraError> {
        Err(CameraError::Unsupported("torch"))
    }

    fn torch_enabled(&self) -> bool {
        false
    }

    fn has_flash_unit(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{AdaptiveCameraConfig, LensFacing};
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_pushes_frames_until_unbound() {
        let provider = ReplayProvider::new(&DynamicImage::new_rgb8(8, 6), Duration::from_millis(2)).unwrap();
        let count = Arc::new(AtomicUsize::new(0));
        let sink: FrameSink = {
            let count = count.clone();
            Arc::new(move |frame: PlanarImage| {
                assert_eq!((frame.width(), frame.height()), (8, 6));
                count.fetch_add(1, Ordering::SeqCst);
            })
        };

        let config = AdaptiveCameraConfig::new(600, 800, LensFacing::Back);
        let camera = provider.bind(&config, sink).unwrap();
        assert!(!camera.has_flash_unit());
        assert!(provider.is_streaming());

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 3 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(1));
        }
        provider.unbind_all();
        assert!(!provider.is_streaming());

        let settled = count.load(Ordering::SeqCst);
        assert!(settled >= 3);
        std::thread::sleep(Duration::from_millis(10));
        assert_eq!(count.load(Ordering::SeqCst), settled);
    }
}
