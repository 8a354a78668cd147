//! V4L2 camera provider streaming YUYV through memory-mapped buffers

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;

use bytes::Bytes;
use tracing::{error, info, instrument, trace, warn};
use v4l::buffer::Type;
use v4l::capability::Flags as CapFlags;
use v4l::framesize::FrameSizeEnum;
use v4l::io::traits::CaptureStream;
use v4l::prelude::MmapStream;
use v4l::video::Capture;
use v4l::{Device, FourCC};

use super::frame::PlanarImage;
use crate::camera::{Camera, CameraConfig, CameraProvider, FrameSink, Size, ZoomState};
use crate::error::CameraError;
use crate::utils::auto_detect_device;

const BUFFER_COUNT: u32 = 4;

struct Streaming {
    stop: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

/// Binds a V4L2 capture node; `None` picks the first YUYV device.
pub struct V4l2Provider {
    path: Option<String>,
    rotation: u32,
    streaming: Mutex<Option<Streaming>>,
}

impl V4l2Provider {
    pub fn new(path: Option<String>, rotation: u32) -> Self {
        Self {
            path,
            rotation,
            streaming: Mutex::new(None),
        }
    }

    fn stop(&self) {
        let streaming = self.streaming.lock().unwrap_or_else(PoisonError::into_inner).take();
        if let Some(streaming) = streaming {
            streaming.stop.store(true, Ordering::Release);
            if streaming.thread.join().is_err() {
                error!("capture thread panicked");
            }
            info!("capture stream stopped");
        }
    }
}

fn supported_sizes(device: &Device, fourcc: FourCC) -> Vec<Size> {
    let Ok(sizes) = device.enum_framesizes(fourcc) else {
        return Vec::new();
    };
    sizes
        .into_iter()
        .flat_map(|size| match size.size {
            FrameSizeEnum::Discrete(d) => vec![Size::new(d.width, d.height)],
            FrameSizeEnum::Stepwise(s) => vec![
                Size::new(s.min_width, s.min_height),
                Size::new(s.max_width, s.max_height),
            ],
        })
        .collect()
}

impl CameraProvider for V4l2Provider {
    #[instrument(skip_all)]
    fn bind(&self, config: &dyn CameraConfig, sink: FrameSink) -> Result<Arc<dyn Camera>, CameraError> {
        self.stop();

        let path = match &self.path {
            Some(path) => path.clone(),
            None => auto_detect_device()?.path,
        };
        let device = Device::with_path(&path)?;
        let caps = device.query_caps()?;
        info!(path, card = %caps.card, driver = %caps.driver, "opening capture device");
        if !caps.capabilities.contains(CapFlags::VIDEO_CAPTURE) {
            return Err(CameraError::Bind(format!("{path} does not support video capture")));
        }

        let yuyv = FourCC::new(b"YUYV");
        let policy = config.analysis();
        let size = policy.select(&supported_sizes(&device, yuyv)).unwrap_or(policy.target);

        let mut fmt = device.format()?;
        fmt.width = size.width;
        fmt.height = size.height;
        fmt.fourcc = yuyv;
        let fmt = device.set_format(&fmt)?;
        if fmt.fourcc != yuyv {
            return Err(CameraError::Bind(format!("{path} refused YUYV, got {}", fmt.fourcc)));
        }
        info!(width = fmt.width, height = fmt.height, "capture format set");

        let stop = Arc::new(AtomicBool::new(false));
        let thread = {
            let stop = stop.clone();
            let (width, height, rotation) = (fmt.width, fmt.height, self.rotation);
            std::thread::Builder::new()
                .name("codescan-v4l2".into())
                .spawn(move || {
                    let mut stream = match MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT) {
                        Ok(stream) => stream,
                        Err(e) => {
                            error!(error = %e, "failed to start capture stream");
                            return;
                        }
                    };
                    info!(buffers = BUFFER_COUNT, "capture stream started");
                    while !stop.load(Ordering::Acquire) {
                        match stream.next() {
                            Ok((buf, meta)) => {
                                trace!(sequence = meta.sequence, "frame captured");
                                let data = Bytes::copy_from_slice(buf);
                                sink(PlanarImage::from_yuyv(data, width, height, rotation));
                            }
                            Err(e) => {
                                warn!(error = %e, "capture error");
                                std::thread::sleep(std::time::Duration::from_millis(10));
                            }
                        }
                    }
                })?
        };

        *self.streaming.lock().unwrap_or_else(PoisonError::into_inner) = Some(Streaming { stop, thread });
        Ok(Arc::new(V4l2Camera))
    }

    fn unbind_all(&self) {
        self.stop();
    }
}

impl Drop for V4l2Provider {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Webcam without zoom or torch controls
#[derive(Debug, Default)]
pub struct V4l2Camera;

impl Camera for V4l2Camera {
    fn zoom_state(&self) -> Option<ZoomState> {
        None
    }

    fn set_zoom_ratio(&self, _ratio: f32) -> Result<(), CameraError> {
        Err(CameraError::Unsupported("zoom"))
    }

    fn set_linear_zoom(&self, _linear: f32) -> Result<(), CameraError> {
        Err(CameraError::Unsupported("zoom"))
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
