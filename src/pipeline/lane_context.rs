// src/pipeline/lane_context.rs
//
// Per-video processing context. Owns the configuration, both line trackers
// and the frame counter, and runs one mask through
// search → fit → sanity check → smoothing.
//
// Frames must be fed in order: the search strategy and the sanity checks of
// frame N+1 depend on what frame N accepted.

use crate::analysis::cluster_locator::{locate_clusters, ClusterSearch, Seed};
use crate::analysis::curve_fitter::fit_with_diagnostics;
use crate::analysis::geometry::{lane_curvature, vehicle_offset, VehicleOffset};
use crate::analysis::line_tracker::{LineSnapshot, LineTracker, TrackUpdate};
use crate::types::{BinaryMask, BlindStrategy, Config, ScaleConfig, SearchConfig, Side};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SideReport {
    #[serde(flatten)]
    pub line: LineSnapshot,
    pub update: TrackUpdate,
}

/// Everything the overlay consumer needs for one frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub frame_index: u64,
    pub search: &'static str,
    /// No prior fit seeded this frame's search.
    pub blind: bool,
    pub left: SideReport,
    pub right: SideReport,
    /// Mean radius of both lines, metres.
    pub lane_curvature_m: Option<f64>,
    /// None until both sides have accepted at least one fit.
    pub vehicle_offset: Option<VehicleOffset>,
}

impl FrameReport {
    pub fn both_detected(&self) -> bool {
        self.left.line.detected && self.right.line.detected
    }
}

pub struct LaneContext {
    scale: ScaleConfig,
    search: SearchConfig,
    left: LineTracker,
    right: LineTracker,
    /// Index of the next frame.
    frame_index: u64,
}

impl LaneContext {
    pub fn new(config: &Config) -> Self {
        Self {
            scale: config.scale,
            search: config.search.clone(),
            left: LineTracker::new(Side::Left, config.scale, &config.tracker),
            right: LineTracker::new(Side::Right, config.scale, &config.tracker),
            frame_index: 0,
        }
    }

    /// Prior-seeded windows while both sides are tracking, blind otherwise.
    pub fn select_search(&self, mask_height: usize) -> ClusterSearch {
        if self.left.has_prior() && self.right.has_prior() {
            return ClusterSearch::SlidingWindow(Seed::Prior {
                left_x: self.left.prior_base_x(mask_height),
                right_x: self.right.prior_base_x(mask_height),
            });
        }
        match self.search.blind_strategy {
            BlindStrategy::Histogram => ClusterSearch::SlidingWindow(Seed::Histogram),
            BlindStrategy::Convolution => ClusterSearch::Convolution,
        }
    }

    /// Run one frame through both trackers.
    pub fn process_frame(&mut self, mask: &BinaryMask) -> FrameReport {
        let frame_index = self.frame_index;
        self.frame_index += 1;

        let height = mask.height();
        let search = self.select_search(height);
        let clusters = locate_clusters(mask, &search, &self.search);

        let (left_fit, left_diag) = fit_with_diagnostics(&clusters.left);
        let (right_fit, right_diag) = fit_with_diagnostics(&clusters.right);
        debug!(
            "F{} [{}] fits: L={} ({} px, rmse {:.2}) R={} ({} px, rmse {:.2})",
            frame_index,
            search.as_str(),
            left_fit.is_some(),
            left_diag.num_points,
            left_diag.rmse_px,
            right_fit.is_some(),
            right_diag.num_points,
            right_diag.rmse_px,
        );

        // Each side reads the other's raw fit and mutates only itself.
        let left_update = self.left.update(
            left_fit,
            right_fit.as_ref(),
            clusters.left,
            height,
            frame_index,
        );
        let right_update = self.right.update(
            right_fit,
            left_fit.as_ref(),
            clusters.right,
            height,
            frame_index,
        );

        FrameReport {
            frame_index,
            search: search.as_str(),
            blind: search.is_blind(),
            left: SideReport {
                line: self.left.snapshot(),
                update: left_update,
            },
            right: SideReport {
                line: self.right.snapshot(),
                update: right_update,
            },
            lane_curvature_m: self.lane_curvature(),
            vehicle_offset: self.vehicle_offset(mask.width(), height),
        }
    }

    pub fn lane_curvature(&self) -> Option<f64> {
        lane_curvature(
            self.left.radius_of_curvature(),
            self.right.radius_of_curvature(),
        )
    }

    pub fn vehicle_offset(&self, mask_width: usize, mask_height: usize) -> Option<VehicleOffset> {
        if self.left.history_len() == 0 || self.right.history_len() == 0 {
            return None;
        }
        Some(vehicle_offset(
            self.left.best_fit(),
            self.right.best_fit(),
            mask_width,
            mask_height,
            &self.scale,
        ))
    }

    pub fn left(&self) -> &LineTracker {
        &self.left
    }

    pub fn right(&self) -> &LineTracker {
        &self.right
    }

    /// Frames processed so far.
    pub fn frames_processed(&self) -> u64 {
        self.frame_index
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::geometry::OffsetSide;
    use crate::analysis::line_tracker::TrackState;
    use crate::types::PolynomialFit;

    const W: usize = 1280;
    const H: usize = 720;

    /// Draw x = a·y² + b·y + c, `thickness` px wide, into `mask`.
    fn draw(mask: &mut BinaryMask, fit: PolynomialFit, thickness: usize) {
        for y in 0..H {
            let x = fit.x_at(y as f64).round();
            if x < 0.0 {
                continue;
            }
            for dx in 0..thickness {
                mask.set(x as usize + dx, y);
            }
        }
    }

    fn lane_mask(shift: f64) -> BinaryMask {
        let mut mask = BinaryMask::empty(W, H);
        draw(&mut mask, PolynomialFit::new(1e-4, -0.05, 330.0 + shift), 8);
        draw(&mut mask, PolynomialFit::new(1e-4, -0.05, 930.0 + shift), 8);
        mask
    }

    fn config() -> Config {
        let mut cfg = Config::default();
        cfg.tracker.history_depth = 4;
        cfg.tracker.curvature_tolerance = 0.5;
        cfg.tracker.gradient_tolerance = 0.5;
        cfg
    }

    #[test]
    fn test_first_frame_uses_blind_search() {
        let ctx = LaneContext::new(&config());
        assert_eq!(ctx.select_search(H), ClusterSearch::SlidingWindow(Seed::Histogram));

        let mut cfg = config();
        cfg.search.blind_strategy = BlindStrategy::Convolution;
        let ctx = LaneContext::new(&cfg);
        assert_eq!(ctx.select_search(H), ClusterSearch::Convolution);
    }

    #[test]
    fn test_tracks_clean_lane_and_switches_to_prior_search() {
        let mut ctx = LaneContext::new(&config());
        let mask = lane_mask(0.0);

        let first = ctx.process_frame(&mask);
        assert_eq!(first.frame_index, 0);
        assert_eq!(first.search, "histogram");
        assert!(first.both_detected(), "{:?}", first);
        assert!(first.lane_curvature_m.is_some());

        let second = ctx.process_frame(&mask);
        assert_eq!(second.search, "prior");
        assert!(second.both_detected());
        assert_eq!(ctx.frames_processed(), 2);

        let best = ctx.left().best_fit();
        assert!((best.x_at(719.0) - PolynomialFit::new(1e-4, -0.05, 330.0).x_at(719.0)).abs() < 6.0);
    }

    #[test]
    fn test_convolution_blind_search_tracks_lane() {
        let mut cfg = config();
        cfg.search.blind_strategy = BlindStrategy::Convolution;
        let mut ctx = LaneContext::new(&cfg);
        let report = ctx.process_frame(&lane_mask(0.0));
        assert_eq!(report.search, "convolution");
        assert!(report.both_detected(), "{:?}", report);
    }

    #[test]
    fn test_empty_side_is_missed_and_keeps_best_fit() {
        let mut ctx = LaneContext::new(&config());
        ctx.process_frame(&lane_mask(0.0));
        let left_before = *ctx.left().best_fit();
        let right_before = *ctx.right().best_fit();

        let mut only_right = BinaryMask::empty(W, H);
        draw(&mut only_right, PolynomialFit::new(1e-4, -0.05, 930.0), 8);
        let report = ctx.process_frame(&only_right);

        assert_eq!(report.left.update, TrackUpdate::Missed);
        assert!(!report.left.line.detected);
        assert_eq!(report.left.line.state, TrackState::Lost);
        assert_eq!(*ctx.left().best_fit(), left_before);
        // right side has nothing to pair with
        assert!(!report.right.line.detected);
        assert_eq!(*ctx.right().best_fit(), right_before);
    }

    #[test]
    fn test_empty_mask_never_panics() {
        let mut ctx = LaneContext::new(&config());
        let report = ctx.process_frame(&BinaryMask::empty(W, H));
        assert_eq!(report.left.update, TrackUpdate::Missed);
        assert_eq!(report.right.update, TrackUpdate::Missed);
        assert_eq!(report.left.line.state, TrackState::Lost);
        assert!(report.lane_curvature_m.is_none());
        assert!(report.vehicle_offset.is_none());
    }

    #[test]
    fn test_vehicle_offset_reported() {
        let mut ctx = LaneContext::new(&config());
        // lane shifted right by 40 px: centre right of the image centre
        let report = ctx.process_frame(&lane_mask(40.0));
        let offset = report.vehicle_offset.unwrap();
        assert_eq!(offset.side, OffsetSide::Right);
        assert!(offset.meters > 0.0);
    }

    #[test]
    fn test_report_flags_blind_search() {
        let mut ctx = LaneContext::new(&config());
        assert!(ctx.process_frame(&lane_mask(0.0)).blind);
        assert!(!ctx.process_frame(&lane_mask(0.0)).blind);
        // one side lost: back to a blind search
        let report = ctx.process_frame(&BinaryMask::empty(W, H));
        assert!(!report.blind);
        assert!(ctx.process_frame(&lane_mask(0.0)).blind);
    }

    #[test]
    fn test_report_serializes_to_json() {
        let mut ctx = LaneContext::new(&config());
        let report = ctx.process_frame(&lane_mask(0.0));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["search"], "histogram");
        assert_eq!(json["left"]["update"]["outcome"], "accepted");
        assert_eq!(json["left"]["side"], "left");
    }
}
