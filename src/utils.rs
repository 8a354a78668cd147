use std::path::Path;

use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device, FourCC};

use crate::error::CameraError;

/// A capture node able to deliver YUYV frames
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FoundDevice {
    pub path: String,
    pub card: String,
}

/// Find the first `/dev/videoN` that captures YUYV.
pub fn auto_detect_device() -> Result<FoundDevice, CameraError> {
    info!("auto-detecting capture devices");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        let Ok(dev) = Device::with_path(&path) else {
            continue;
        };
        let Ok(caps) = dev.query_caps() else {
            continue;
        };
        if !caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
            debug!(path, "not a capture device");
            continue;
        }
        let yuyv = FourCC::new(b"YUYV");
        if let Ok(formats) = dev.enum_formats() {
            if formats.iter().any(|fmt| fmt.fourcc == yuyv) {
                info!(path, card = %caps.card, "found YUYV device");
                return Ok(FoundDevice { path, card: caps.card });
            }
        }
    }

    Err(CameraError::Bind("no YUYV capture device found".into()))
}
