// src/lib.rs
//
// Lane boundary tracking on rectified top-down binary masks.

pub mod analysis;
pub mod config;
pub mod pipeline;
pub mod types;

pub use pipeline::{FrameReport, LaneContext};
pub use types::{BinaryMask, Config, PixelSample, PolynomialFit, Side};
