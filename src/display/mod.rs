pub mod canvas;
pub mod viewfinder;

pub use canvas::{Canvas, Color, DisplayList, DrawOp, Fill, RasterCanvas, TextAlign};
pub use viewfinder::{
    FrameGravity, Invalidate, LaserStyle, TextLocation, ViewState, Viewfinder, ViewfinderConfig, ViewfinderStyle,
};
