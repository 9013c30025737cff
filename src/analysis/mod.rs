// src/analysis/mod.rs
//
// Lane tracking core.
//
// Signal flow per frame:
//   BinaryMask → cluster_locator → PixelSample (L, R)
//              → curve_fitter    → Option<PolynomialFit> (L, R)
//              → line_tracker    → sanity (paired check) → FIFO mean
//              → geometry        → curvature / offset
//
// Orchestrated by pipeline::lane_context::LaneContext.

pub mod cluster_locator;
pub mod curve_fitter;
pub mod geometry;
pub mod line_tracker;
pub mod sanity;

pub use cluster_locator::{locate_clusters, ClusterSearch, ClusterSearchResult, Seed};
pub use curve_fitter::{fit_polynomial, fit_with_diagnostics, FitDiagnostics};
pub use geometry::{LineMetrics, OffsetSide, VehicleOffset};
pub use line_tracker::{LineSnapshot, LineTracker, TrackState, TrackUpdate};
pub use sanity::{SanityCheck, SanityRejection};
