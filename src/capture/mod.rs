pub mod convert;
pub mod frame;
pub mod replay;
#[cfg(feature = "v4l2")]
pub mod v4l2;

pub use frame::{FrameMetadata, ImageFormat, PlanarImage, Plane};
pub use replay::{ReplayCamera, ReplayProvider};
