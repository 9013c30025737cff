// src/pipeline/metrics.rs
//
// Run counters shared between the mask loader task and the tracking loop.
// Logged as a summary at the end of a run.

use super::lane_context::{FrameReport, SideReport};
use crate::analysis::line_tracker::TrackUpdate;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Debug)]
pub struct RunMetrics {
    pub frames_decoded: AtomicU64,
    pub decode_failures: AtomicU64,
    pub frames_processed: AtomicU64,
    pub frames_both_detected: AtomicU64,
    pub left: SideCounters,
    pub right: SideCounters,
    pub prior_searches: AtomicU64,
    pub blind_searches: AtomicU64,
    pub started_at: Instant,
}

#[derive(Debug, Default)]
pub struct SideCounters {
    pub accepted: AtomicU64,
    pub rejected: AtomicU64,
    pub missed: AtomicU64,
}

impl SideCounters {
    fn record(&self, report: &SideReport) {
        let counter = match report.update {
            TrackUpdate::Accepted => &self.accepted,
            TrackUpdate::Rejected(_) => &self.rejected,
            TrackUpdate::Missed => &self.missed,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self) -> SideSummary {
        SideSummary {
            accepted: self.accepted.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
            missed: self.missed.load(Ordering::Relaxed),
        }
    }
}

impl Default for RunMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RunMetrics {
    pub fn new() -> Self {
        Self {
            frames_decoded: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            frames_processed: AtomicU64::new(0),
            frames_both_detected: AtomicU64::new(0),
            left: SideCounters::default(),
            right: SideCounters::default(),
            prior_searches: AtomicU64::new(0),
            blind_searches: AtomicU64::new(0),
            started_at: Instant::now(),
        }
    }

    pub fn inc(&self, counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record(&self, report: &FrameReport) {
        self.inc(&self.frames_processed);
        if report.both_detected() {
            self.inc(&self.frames_both_detected);
        }
        if report.blind {
            self.inc(&self.blind_searches);
        } else {
            self.inc(&self.prior_searches);
        }
        self.left.record(&report.left);
        self.right.record(&report.right);
    }

    pub fn fps(&self) -> f64 {
        let frames = self.frames_processed.load(Ordering::Relaxed);
        let elapsed = self.started_at.elapsed().as_secs_f64();
        if elapsed > 0.01 {
            frames as f64 / elapsed
        } else {
            0.0
        }
    }

    pub fn summary(&self) -> RunSummary {
        RunSummary {
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            frames_processed: self.frames_processed.load(Ordering::Relaxed),
            frames_both_detected: self.frames_both_detected.load(Ordering::Relaxed),
            left: self.left.summary(),
            right: self.right.summary(),
            prior_searches: self.prior_searches.load(Ordering::Relaxed),
            blind_searches: self.blind_searches.load(Ordering::Relaxed),
            fps: self.fps(),
            elapsed_secs: self.started_at.elapsed().as_secs_f64(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize)]
pub struct SideSummary {
    pub accepted: u64,
    pub rejected: u64,
    pub missed: u64,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RunSummary {
    pub frames_decoded: u64,
    pub decode_failures: u64,
    pub frames_processed: u64,
    pub frames_both_detected: u64,
    pub left: SideSummary,
    pub right: SideSummary,
    pub prior_searches: u64,
    pub blind_searches: u64,
    pub fps: f64,
    pub elapsed_secs: f64,
}

impl RunSummary {
    /// Share of processed frames where both lines were accepted.
    pub fn detection_rate(&self) -> f64 {
        if self.frames_processed == 0 {
            0.0
        } else {
            self.frames_both_detected as f64 / self.frames_processed as f64
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::lane_context::LaneContext;
    use crate::types::{BinaryMask, Config, PolynomialFit};

    #[test]
    fn test_record_counts_outcomes() {
        let metrics = RunMetrics::new();
        let mut ctx = LaneContext::new(&Config::default());
        for _ in 0..3 {
            let report = ctx.process_frame(&BinaryMask::empty(64, 48));
            metrics.record(&report);
        }
        let summary = metrics.summary();
        assert_eq!(summary.frames_processed, 3);
        assert_eq!(summary.left.missed, 3);
        assert_eq!(summary.right.missed, 3);
        assert_eq!(summary.blind_searches, 3);
        assert_eq!(summary.prior_searches, 0);
        assert_eq!(summary.detection_rate(), 0.0);
    }

    #[test]
    fn test_record_splits_prior_and_blind_searches() {
        let metrics = RunMetrics::new();
        let mut ctx = LaneContext::new(&Config::default());
        let mut mask = BinaryMask::empty(1280, 720);
        for y in 0..720 {
            let fit = PolynomialFit::new(1e-4, -0.05, 330.0);
            let x = fit.x_at(y as f64).round() as usize;
            for dx in (0..8).chain(600..608) {
                mask.set(x + dx, y);
            }
        }
        for _ in 0..3 {
            metrics.record(&ctx.process_frame(&mask));
        }
        let summary = metrics.summary();
        assert_eq!(summary.blind_searches, 1);
        assert_eq!(summary.prior_searches, 2);
        assert_eq!(summary.frames_both_detected, 3);
    }
}
