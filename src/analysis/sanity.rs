// src/analysis/sanity.rs
//
// Paired-line plausibility checks that gate a new fit before it may enter a
// tracker's history. Each side is checked against the other side's raw fit
// of the same frame: curvature agreement, parallelism and lane width.

use super::geometry::LineMetrics;
use crate::types::TrackerConfig;
use serde::Serialize;
use std::fmt;

/// Why a structurally valid fit was discarded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SanityRejection {
    /// The other side produced no fit this frame, nothing to compare with.
    MissingPair,
    CurvatureMismatch { own: f64, other: f64, relative: f64 },
    GradientMismatch { own: f64, other: f64, relative: f64 },
    OppositeGradient { own: f64, other: f64 },
    SeparationOutOfRange { separation: f64 },
}

impl SanityRejection {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingPair => "MISSING_PAIR",
            Self::CurvatureMismatch { .. } => "CURVATURE",
            Self::GradientMismatch { .. } => "GRADIENT",
            Self::OppositeGradient { .. } => "OPPOSITE_GRADIENT",
            Self::SeparationOutOfRange { .. } => "SEPARATION",
        }
    }
}

impl fmt::Display for SanityRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingPair => write!(f, "paired line has no fit"),
            Self::CurvatureMismatch {
                own,
                other,
                relative,
            } => write!(
                f,
                "curvature {:.1}m vs {:.1}m (relative diff {:.2})",
                own, other, relative
            ),
            Self::GradientMismatch {
                own,
                other,
                relative,
            } => write!(
                f,
                "gradient {:.4} vs {:.4} (relative diff {:.2})",
                own, other, relative
            ),
            Self::OppositeGradient { own, other } => {
                write!(f, "gradients {:.4} and {:.4} have opposite signs", own, other)
            }
            Self::SeparationOutOfRange { separation } => {
                write!(f, "base separation {:.1}px out of range", separation)
            }
        }
    }
}

/// Tolerances used by [`SanityCheck::evaluate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SanityCheck {
    pub curvature_tolerance: f64,
    pub gradient_tolerance: f64,
    pub min_separation: f64,
    pub max_separation: f64,
}

impl From<&TrackerConfig> for SanityCheck {
    fn from(config: &TrackerConfig) -> Self {
        Self {
            curvature_tolerance: config.curvature_tolerance,
            gradient_tolerance: config.gradient_tolerance,
            min_separation: config.min_separation,
            max_separation: config.max_separation,
        }
    }
}

impl SanityCheck {
    /// Run all checks, first failure wins.
    ///
    /// A singular radius (straight line) counts as infinite in the curvature
    /// check.
    pub fn evaluate(&self, own: &LineMetrics, other: &LineMetrics) -> Result<(), SanityRejection> {
        self.check_curvature(own, other)?;
        self.check_parallel(own, other)?;
        self.check_separation(own, other)
    }

    pub fn check_curvature(
        &self,
        own: &LineMetrics,
        other: &LineMetrics,
    ) -> Result<(), SanityRejection> {
        let relative = match (own.radius, other.radius) {
            (None, None) => return Ok(()),
            // |R − ∞| / R
            (Some(_), None) => f64::MAX,
            // |∞ − R| / ∞
            (None, Some(_)) => 1.0,
            (Some(r_own), Some(r_other)) => relative_difference(r_own, r_other),
        };
        if relative > self.curvature_tolerance {
            return Err(SanityRejection::CurvatureMismatch {
                own: own.radius.unwrap_or(f64::INFINITY),
                other: other.radius.unwrap_or(f64::INFINITY),
                relative,
            });
        }
        Ok(())
    }

    pub fn check_parallel(
        &self,
        own: &LineMetrics,
        other: &LineMetrics,
    ) -> Result<(), SanityRejection> {
        let (g_own, g_other) = (own.gradient, other.gradient);
        if g_own * g_other < 0.0 {
            return Err(SanityRejection::OppositeGradient {
                own: g_own,
                other: g_other,
            });
        }
        let relative = relative_difference(g_own, g_other);
        if relative > self.gradient_tolerance {
            return Err(SanityRejection::GradientMismatch {
                own: g_own,
                other: g_other,
                relative,
            });
        }
        Ok(())
    }

    pub fn check_separation(
        &self,
        own: &LineMetrics,
        other: &LineMetrics,
    ) -> Result<(), SanityRejection> {
        let separation = (own.base_position - other.base_position).abs();
        if !(self.min_separation..=self.max_separation).contains(&separation) {
            return Err(SanityRejection::SeparationOutOfRange { separation });
        }
        Ok(())
    }
}

/// |reference − other| / |reference|.
///
/// Zero reference: 0 when both are zero, `f64::MAX` otherwise so the result
/// always compares against a tolerance without producing NaN.
pub fn relative_difference(reference: f64, other: f64) -> f64 {
    let diff = (reference - other).abs();
    if reference.abs() < f64::EPSILON {
        return if diff < f64::EPSILON { 0.0 } else { f64::MAX };
    }
    let rel = diff / reference.abs();
    if rel.is_finite() {
        rel
    } else {
        f64::MAX
    }
}
