// src/pipeline/mod.rs

pub mod lane_context;
pub mod mask_source;
pub mod metrics;

pub use lane_context::{FrameReport, LaneContext, SideReport};
pub use mask_source::{find_mask_files, load_mask, spawn_loader, MaskFrame};
pub use metrics::{RunMetrics, RunSummary};
