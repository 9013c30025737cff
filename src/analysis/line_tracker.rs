// src/analysis/line_tracker.rs
//
// Per-side temporal tracker for one lane boundary.
//
// Each frame the tracker receives its own raw fit and the paired side's raw
// fit. A fit is accepted only when it agrees with the paired fit (curvature,
// parallelism, lane width); accepted fits enter a bounded FIFO whose
// coefficient-wise mean is the best fit. Rejected or missing fits leave the
// history and the best fit untouched, so one noisy frame cannot drag the
// smoothed estimate.
//
// State machine:
//   UNINIT ──accept──▶ TRACKING ◀──accept── LOST
//      │                  │                  ▲
//      └──miss/reject─────┴───miss/reject────┘
//
// Metrics are evaluated at the bottom row (y = H − 1), nearest the vehicle.
// Gradient and base position follow the best fit every accepted frame; the
// radius of curvature refreshes only on every k-th frame and is blended with
// its previous value to damp jitter. A straight best fit clears the radius
// at once and flags it unreliable.

use super::geometry::LineMetrics;
use super::sanity::{SanityCheck, SanityRejection};
use crate::types::{PixelSample, PolynomialFit, ScaleConfig, Side, TrackerConfig};
use serde::Serialize;
use std::collections::VecDeque;
use tracing::debug;

/// Frames between periodic status lines.
const STATUS_LOG_INTERVAL: u64 = 150;

// ============================================================================
// TRACKER STATE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    /// No fit accepted yet.
    Uninitialized,
    /// Last frame's fit was accepted.
    Tracking,
    /// Last frame's fit was missing or rejected; best fit is stale.
    Lost,
}

impl TrackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "UNINIT",
            Self::Tracking => "TRACKING",
            Self::Lost => "LOST",
        }
    }
}

/// What one `update` call did.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "snake_case")]
pub enum TrackUpdate {
    Accepted,
    /// No fit this frame.
    Missed,
    Rejected(SanityRejection),
}

impl TrackUpdate {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Serializable view of a tracker after a frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineSnapshot {
    pub side: Side,
    pub state: TrackState,
    pub detected: bool,
    pub best_fit: PolynomialFit,
    pub current_fit: Option<PolynomialFit>,
    pub fit_delta: PolynomialFit,
    pub radius_of_curvature: Option<f64>,
    pub radius_reliable: bool,
    pub gradient: f64,
    pub base_lateral_position: f64,
    pub history_len: usize,
    pub sample_size: usize,
}

// ============================================================================
// LINE TRACKER
// ============================================================================

#[derive(Debug, Clone)]
pub struct LineTracker {
    side: Side,
    scale: ScaleConfig,
    smoothing_alpha: f64,
    history_depth: usize,
    refresh_interval: u64,
    sanity: SanityCheck,

    /// Accepted fits, oldest first. Never longer than `history_depth`.
    recent_fits: VecDeque<PolynomialFit>,
    /// Mean of `recent_fits`; zero before the first acceptance.
    best_fit: PolynomialFit,
    /// Latest raw attempt, accepted or not.
    current_fit: Option<PolynomialFit>,
    /// `current_fit − best_fit` at the time of the attempt.
    fit_delta: PolynomialFit,
    /// Pixels behind `current_fit`.
    last_sample: PixelSample,

    state: TrackState,
    detected: bool,

    radius_of_curvature: Option<f64>,
    /// False until a curved best fit has been measured, and whenever the
    /// latest best fit was singular.
    radius_reliable: bool,
    gradient: f64,
    base_lateral_position: f64,

    frames_seen: u64,

    // ── Metrics ──
    pub total_accepted: u64,
    pub total_rejected: u64,
    pub total_missed: u64,
}

impl LineTracker {
    pub fn new(side: Side, scale: ScaleConfig, config: &TrackerConfig) -> Self {
        let history_depth = config.history_depth.max(1);
        Self {
            side,
            scale,
            smoothing_alpha: config.smoothing_alpha,
            history_depth,
            refresh_interval: config.curvature_refresh_interval.max(1),
            sanity: SanityCheck::from(config),
            recent_fits: VecDeque::with_capacity(history_depth),
            best_fit: PolynomialFit::default(),
            current_fit: None,
            fit_delta: PolynomialFit::default(),
            last_sample: PixelSample::default(),
            state: TrackState::Uninitialized,
            detected: false,
            radius_of_curvature: None,
            radius_reliable: false,
            gradient: 0.0,
            base_lateral_position: 0.0,
            frames_seen: 0,
            total_accepted: 0,
            total_rejected: 0,
            total_missed: 0,
        }
    }

    /// Process one frame.
    ///
    /// # Arguments
    /// * `new_fit`: this side's raw fit (None if the sample was unfittable)
    /// * `other_fit`: the paired side's raw fit for the same frame
    /// * `sample`: pixels behind `new_fit`, kept for diagnostics
    /// * `mask_height`: evaluation row is `mask_height − 1`
    /// * `frame_index`: drives the curvature refresh cadence
    pub fn update(
        &mut self,
        new_fit: Option<PolynomialFit>,
        other_fit: Option<&PolynomialFit>,
        sample: PixelSample,
        mask_height: usize,
        frame_index: u64,
    ) -> TrackUpdate {
        self.frames_seen += 1;
        self.last_sample = sample;
        self.current_fit = new_fit;

        let outcome = match new_fit {
            None => {
                self.mark_lost();
                self.total_missed += 1;
                debug!(
                    "  ❌ {} F{}: no fit ({} px)",
                    self.side.as_str(),
                    frame_index,
                    self.last_sample.len()
                );
                TrackUpdate::Missed
            }
            Some(fit) => {
                self.fit_delta = fit.delta(&self.best_fit);
                let y_eval = eval_row(mask_height);
                match self.check_pair(&fit, other_fit, y_eval) {
                    Ok(()) => {
                        self.accept(fit, y_eval, frame_index);
                        TrackUpdate::Accepted
                    }
                    Err(reason) => {
                        self.mark_lost();
                        self.total_rejected += 1;
                        debug!(
                            "  🚫 {} F{}: rejected [{}] {}",
                            self.side.as_str(),
                            frame_index,
                            reason.as_str(),
                            reason
                        );
                        TrackUpdate::Rejected(reason)
                    }
                }
            }
        };

        if self.frames_seen % STATUS_LOG_INTERVAL == 0 {
            debug!(
                "📐 {} F{}: {} hist={}/{} R={:?} grad={:.4} base={:.1} | acc={} rej={} miss={}",
                self.side.as_str(),
                frame_index,
                self.state.as_str(),
                self.recent_fits.len(),
                self.history_depth,
                self.radius_of_curvature,
                self.gradient,
                self.base_lateral_position,
                self.total_accepted,
                self.total_rejected,
                self.total_missed,
            );
        }

        outcome
    }

    /// Sanity checks of `fit` against the paired raw fit. No state changes.
    pub fn check_pair(
        &self,
        fit: &PolynomialFit,
        other_fit: Option<&PolynomialFit>,
        y_eval: f64,
    ) -> Result<(), SanityRejection> {
        let other = other_fit.ok_or(SanityRejection::MissingPair)?;
        let own = LineMetrics::compute(fit, y_eval, &self.scale);
        let other = LineMetrics::compute(other, y_eval, &self.scale);
        self.sanity.evaluate(&own, &other)
    }

    fn accept(&mut self, fit: PolynomialFit, y_eval: f64, frame_index: u64) {
        if self.recent_fits.len() == self.history_depth {
            self.recent_fits.pop_front();
        }
        self.recent_fits.push_back(fit);
        self.best_fit = mean_fit(&self.recent_fits);

        self.state = TrackState::Tracking;
        self.detected = true;
        self.total_accepted += 1;

        let metrics = LineMetrics::compute(&self.best_fit, y_eval, &self.scale);
        self.gradient = metrics.gradient;
        self.base_lateral_position = metrics.base_position;

        self.radius_reliable = metrics.reliable;
        let refresh_due = frame_index % self.refresh_interval == 0;
        match (self.radius_of_curvature, metrics.radius) {
            (_, None) => self.radius_of_curvature = None,
            (None, Some(fresh)) => self.radius_of_curvature = Some(fresh),
            (Some(prev), Some(fresh)) if refresh_due => {
                let alpha = self.smoothing_alpha;
                self.radius_of_curvature = Some(alpha * fresh + (1.0 - alpha) * prev);
            }
            (Some(_), Some(_)) => {}
        }
    }

    fn mark_lost(&mut self) {
        self.state = TrackState::Lost;
        self.detected = false;
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn side(&self) -> Side {
        self.side
    }

    pub fn state(&self) -> TrackState {
        self.state
    }

    pub fn detected(&self) -> bool {
        self.detected
    }

    pub fn best_fit(&self) -> &PolynomialFit {
        &self.best_fit
    }

    pub fn current_fit(&self) -> Option<&PolynomialFit> {
        self.current_fit.as_ref()
    }

    pub fn recent_fits(&self) -> impl Iterator<Item = &PolynomialFit> {
        self.recent_fits.iter()
    }

    pub fn history_len(&self) -> usize {
        self.recent_fits.len()
    }

    pub fn last_sample(&self) -> &PixelSample {
        &self.last_sample
    }

    pub fn radius_of_curvature(&self) -> Option<f64> {
        self.radius_of_curvature
    }

    pub fn radius_reliable(&self) -> bool {
        self.radius_reliable
    }

    pub fn gradient(&self) -> f64 {
        self.gradient
    }

    pub fn base_lateral_position(&self) -> f64 {
        self.base_lateral_position
    }

    pub fn fit_delta(&self) -> &PolynomialFit {
        &self.fit_delta
    }

    /// Whether the best fit can seed next frame's search.
    pub fn has_prior(&self) -> bool {
        self.detected && !self.recent_fits.is_empty()
    }

    /// Best fit evaluated at the bottom row.
    pub fn prior_base_x(&self, mask_height: usize) -> f64 {
        self.best_fit.x_at(eval_row(mask_height))
    }

    pub fn snapshot(&self) -> LineSnapshot {
        LineSnapshot {
            side: self.side,
            state: self.state,
            detected: self.detected,
            best_fit: self.best_fit,
            current_fit: self.current_fit,
            fit_delta: self.fit_delta,
            radius_of_curvature: self.radius_of_curvature,
            radius_reliable: self.radius_reliable,
            gradient: self.gradient,
            base_lateral_position: self.base_lateral_position,
            history_len: self.recent_fits.len(),
            sample_size: self.last_sample.len(),
        }
    }
}

/// Row nearest the vehicle.
#[inline]
fn eval_row(mask_height: usize) -> f64 {
    mask_height.saturating_sub(1) as f64
}

fn mean_fit(fits: &VecDeque<PolynomialFit>) -> PolynomialFit {
    if fits.is_empty() {
        return PolynomialFit::default();
    }
    let n = fits.len() as f64;
    let (a, b, c) = fits
        .iter()
        .fold((0.0, 0.0, 0.0), |(a, b, c), f| (a + f.a, b + f.b, c + f.c));
    PolynomialFit::new(a / n, b / n, c / n)
}
