// src/analysis/geometry.rs
//
// Pure conversions from pixel-space polynomial coefficients to the physical
// quantities reported per frame: radius of curvature (metres), tangent
// gradient, base lateral position, vehicle offset and lane curvature.
//
// All functions are total: a near-zero quadratic coefficient or non-finite
// coefficients never produce NaN or infinity. Curvature falls back to `None`
// and the metric record is marked unreliable.

use crate::types::{PolynomialFit, ScaleConfig};
use serde::Serialize;

/// |a| below this is a straight line for curvature purposes.
pub const CURVATURE_EPSILON: f64 = 1e-9;

/// Radius of the osculating circle at row `y_eval`, in metres.
///
/// With pixel coefficients (a, b) and scales (sx, sy) the metric-space
/// coefficients are A = a·sx/sy² and B = b·sx/sy, giving
/// R = (1 + (2·A·y·sy + B)²)^1.5 / |2·A|.
pub fn radius_of_curvature(fit: &PolynomialFit, y_eval: f64, scale: &ScaleConfig) -> Option<f64> {
    if !fit.is_finite() || !y_eval.is_finite() || fit.a.abs() < CURVATURE_EPSILON {
        return None;
    }
    let (sx, sy) = (scale.x_m_per_pix, scale.y_m_per_pix);
    let a_m = fit.a * sx / (sy * sy);
    let b_m = fit.b * sx / sy;
    let denom = (2.0 * a_m).abs();
    if denom < f64::MIN_POSITIVE {
        return None;
    }
    let slope = 2.0 * a_m * y_eval * sy + b_m;
    let radius = (1.0 + slope * slope).powf(1.5) / denom;
    radius.is_finite().then_some(radius)
}

/// Tangent slope dx/dy at `y`, pixel space.
#[inline]
pub fn gradient(fit: &PolynomialFit, y: f64) -> f64 {
    2.0 * fit.a * y + fit.b
}

/// Fitted x at `y`, pixel space.
#[inline]
pub fn base_position(fit: &PolynomialFit, y: f64) -> f64 {
    fit.x_at(y)
}

/// Per-line metrics at the row nearest the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LineMetrics {
    /// Metres. `None` for a straight (singular) or broken fit.
    pub radius: Option<f64>,
    pub gradient: f64,
    /// Pixels.
    pub base_position: f64,
    /// False when the curvature was singular or the fit was not finite.
    pub reliable: bool,
}

impl LineMetrics {
    pub fn compute(fit: &PolynomialFit, y_eval: f64, scale: &ScaleConfig) -> Self {
        if !fit.is_finite() || !y_eval.is_finite() {
            return Self {
                radius: None,
                gradient: 0.0,
                base_position: 0.0,
                reliable: false,
            };
        }
        let radius = radius_of_curvature(fit, y_eval, scale);
        Self {
            radius,
            gradient: gradient(fit, y_eval),
            base_position: base_position(fit, y_eval),
            reliable: radius.is_some(),
        }
    }
}

// ============================================================================
// VEHICLE-CENTRIC OUTPUTS
// ============================================================================

/// Which side of the lane centre the vehicle sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OffsetSide {
    Left,
    Right,
}

impl OffsetSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VehicleOffset {
    /// Signed offset in metres, positive = right of centre.
    pub meters: f64,
    pub side: OffsetSide,
}

/// Offset of the image centre column from the lane centre at the bottom row.
pub fn vehicle_offset(
    left: &PolynomialFit,
    right: &PolynomialFit,
    mask_width: usize,
    mask_height: usize,
    scale: &ScaleConfig,
) -> VehicleOffset {
    let y = mask_height.saturating_sub(1) as f64;
    let px = 0.5 * (left.x_at(y) + right.x_at(y) - mask_width as f64);
    let meters = if px.is_finite() {
        px * scale.x_m_per_pix
    } else {
        0.0
    };
    VehicleOffset {
        meters,
        side: if meters > 0.0 {
            OffsetSide::Right
        } else {
            OffsetSide::Left
        },
    }
}

/// Mean of both radii. One side alone is used as-is.
pub fn lane_curvature(left: Option<f64>, right: Option<f64>) -> Option<f64> {
    match (left, right) {
        (Some(l), Some(r)) => Some(0.5 * (l + r)),
        (Some(v), None) | (None, Some(v)) => Some(v),
        (None, None) => None,
    }
}

/// One (x, y) point per mask row along the fit, for overlay renderers.
pub fn sample_curve(fit: &PolynomialFit, height: usize) -> Vec<(f64, f64)> {
    (0..height)
        .map(|row| {
            let y = row as f64;
            (fit.x_at(y), y)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_scale() -> ScaleConfig {
        ScaleConfig {
            x_m_per_pix: 3.7 / 605.0,
            y_m_per_pix: 15.0 / 1240.0,
        }
    }

    #[test]
    fn test_radius_pinned_reference() {
        let fit = PolynomialFit::new(0.001, 0.0, 600.0);
        let r = radius_of_curvature(&fit, 719.0, &reference_scale()).unwrap();
        assert!((r - 22.608649667504178).abs() < 1e-9, "radius = {}", r);
    }

    #[test]
    fn test_radius_scales_with_curvature() {
        let scale = reference_scale();
        let tight = radius_of_curvature(&PolynomialFit::new(0.001, 0.0, 600.0), 719.0, &scale);
        let loose = radius_of_curvature(&PolynomialFit::new(0.0005, 0.0, 600.0), 719.0, &scale);
        assert!((loose.unwrap() - 28.822986555291784).abs() < 1e-9);
        assert!(loose.unwrap() > tight.unwrap());
    }

    #[test]
    fn test_radius_is_sign_independent() {
        let scale = reference_scale();
        let pos = radius_of_curvature(&PolynomialFit::new(2e-4, 0.1, 300.0), 500.0, &scale);
        let neg = radius_of_curvature(&PolynomialFit::new(-2e-4, -0.1, 300.0), 500.0, &scale);
        assert!((pos.unwrap() - neg.unwrap()).abs() < 1e-9);
    }

    #[test]
    fn test_straight_line_is_singular() {
        let fit = PolynomialFit::new(0.0, 0.2, 300.0);
        assert!(radius_of_curvature(&fit, 719.0, &reference_scale()).is_none());
        let m = LineMetrics::compute(&fit, 719.0, &reference_scale());
        assert!(!m.reliable);
        assert!(m.radius.is_none());
        assert!((m.gradient - 0.2).abs() < 1e-12);
        assert!((m.base_position - 443.8).abs() < 1e-9);
    }

    #[test]
    fn test_non_finite_fit_yields_sentinels() {
        let fit = PolynomialFit::new(f64::NAN, 0.0, 1.0);
        let m = LineMetrics::compute(&fit, 719.0, &reference_scale());
        assert!(!m.reliable);
        assert_eq!(m.gradient, 0.0);
        assert_eq!(m.base_position, 0.0);
    }

    #[test]
    fn test_gradient_and_base_position() {
        let fit = PolynomialFit::new(0.001, -0.5, 200.0);
        assert!((gradient(&fit, 100.0) + 0.3).abs() < 1e-12);
        assert!((base_position(&fit, 100.0) - 160.0).abs() < 1e-9);
    }

    #[test]
    fn test_vehicle_offset_sign() {
        let scale = ScaleConfig::default();
        let left = PolynomialFit::new(0.0, 0.0, 300.0);
        let right = PolynomialFit::new(0.0, 0.0, 1000.0);
        let off = vehicle_offset(&left, &right, 1280, 720, &scale);
        // lane centre at 650 vs image centre 640 → 10 px right
        assert!((off.meters - 10.0 * scale.x_m_per_pix).abs() < 1e-12);
        assert_eq!(off.side, OffsetSide::Right);

        let shifted = PolynomialFit::new(0.0, 0.0, 250.0);
        let off = vehicle_offset(&shifted, &right, 1280, 720, &scale);
        assert_eq!(off.side, OffsetSide::Left);
    }

    #[test]
    fn test_lane_curvature_mean() {
        assert_eq!(lane_curvature(Some(100.0), Some(300.0)), Some(200.0));
        assert_eq!(lane_curvature(None, Some(300.0)), Some(300.0));
        assert_eq!(lane_curvature(None, None), None);
    }

    #[test]
    fn test_sample_curve_covers_rows() {
        let pts = sample_curve(&PolynomialFit::new(0.0, 1.0, 2.0), 4);
        assert_eq!(pts, vec![(2.0, 0.0), (3.0, 1.0), (4.0, 2.0), (5.0, 3.0)]);
    }
}
