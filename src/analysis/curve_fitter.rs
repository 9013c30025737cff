// src/analysis/curve_fitter.rs
//
// Least-squares quadratic fit x = a·y² + b·y + c over one side's pixel sample.
//
// Coordinate system:
//   Mask pixel coordinates, y increasing downward. y is centred on the sample
//   mean and scaled to roughly [-1, 1] before building the normal equations;
//   the solved coefficients are mapped back so callers always receive
//   raw-pixel coefficients.

use crate::types::{PixelSample, PolynomialFit};
use tracing::debug;

/// Normal-equation pivots below this are treated as singular.
const SINGULAR_PIVOT: f64 = 1e-12;

/// Quality record for a fit attempt.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FitDiagnostics {
    pub num_points: usize,
    pub distinct_rows: usize,
    /// RMS residual in pixels. Zero when the fit failed.
    pub rmse_px: f64,
}

/// Fit a 2nd-degree polynomial, or `None` when the sample cannot define one.
pub fn fit_polynomial(sample: &PixelSample) -> Option<PolynomialFit> {
    fit_with_diagnostics(sample).0
}

/// Same as [`fit_polynomial`] but also reports how the sample looked.
pub fn fit_with_diagnostics(sample: &PixelSample) -> (Option<PolynomialFit>, FitDiagnostics) {
    let mut diag = FitDiagnostics {
        num_points: sample.len(),
        distinct_rows: distinct_rows(&sample.points, 3),
        rmse_px: 0.0,
    };

    if diag.distinct_rows < 3 {
        debug!(
            "  ⚠️ Unfittable sample: {} points on {} distinct rows",
            diag.num_points, diag.distinct_rows
        );
        return (None, diag);
    }

    let n = sample.len() as f64;
    let y_mean = sample.points.iter().map(|&(_, y)| y as f64).sum::<f64>() / n;
    let y_scale = sample
        .points
        .iter()
        .map(|&(_, y)| (y as f64 - y_mean).abs())
        .fold(0.0f64, f64::max)
        .max(1.0);

    let mut s1 = 0.0f64;
    let mut s2 = 0.0f64;
    let mut s3 = 0.0f64;
    let mut s4 = 0.0f64;
    let mut sx0 = 0.0f64;
    let mut sx1 = 0.0f64;
    let mut sx2 = 0.0f64;

    for &(x, y) in &sample.points {
        let t = (y as f64 - y_mean) / y_scale;
        let xd = x as f64;
        let t2 = t * t;

        s1 += t;
        s2 += t2;
        s3 += t2 * t;
        s4 += t2 * t2;
        sx0 += xd;
        sx1 += xd * t;
        sx2 += xd * t2;
    }

    //   | s4 s3 s2 | | A |   | sx2 |
    //   | s3 s2 s1 | | B | = | sx1 |
    //   | s2 s1 n  | | C |   | sx0 |
    let Some((ca, cb, cc)) = solve_3x3([[s4, s3, s2], [s3, s2, s1], [s2, s1, n]], [sx2, sx1, sx0])
    else {
        debug!("  ⚠️ Singular normal equations for {} points", diag.num_points);
        return (None, diag);
    };

    // x = A·t² + B·t + C with t = (y − m)/s
    let s_sq = y_scale * y_scale;
    let fit = PolynomialFit {
        a: ca / s_sq,
        b: cb / y_scale - 2.0 * ca * y_mean / s_sq,
        c: ca * y_mean * y_mean / s_sq - cb * y_mean / y_scale + cc,
    };

    if !fit.is_finite() {
        return (None, diag);
    }

    let sse: f64 = sample
        .points
        .iter()
        .map(|&(x, y)| {
            let r = x as f64 - fit.x_at(y as f64);
            r * r
        })
        .sum();
    diag.rmse_px = (sse / n).sqrt();
    diag.distinct_rows = distinct_rows(&sample.points, usize::MAX);

    debug!(
        "  📐 Fit: a={:.6} b={:.4} c={:.1} | RMSE={:.2}px | pts={} rows={}",
        fit.a, fit.b, fit.c, diag.rmse_px, diag.num_points, diag.distinct_rows
    );

    (Some(fit), diag)
}

/// Number of distinct y values, counting stops at `limit`.
fn distinct_rows(points: &[(usize, usize)], limit: usize) -> usize {
    if limit <= 3 {
        let mut seen: Vec<usize> = Vec::with_capacity(3);
        for &(_, y) in points {
            if !seen.contains(&y) {
                seen.push(y);
                if seen.len() >= limit {
                    break;
                }
            }
        }
        return seen.len();
    }
    let mut ys: Vec<usize> = points.iter().map(|&(_, y)| y).collect();
    ys.sort_unstable();
    ys.dedup();
    ys.len().min(limit)
}

/// Gaussian elimination with partial pivoting on the augmented system
/// `[lhs | rhs]`. None when any pivot falls below `SINGULAR_PIVOT` or the
/// solution is not finite.
fn solve_3x3(lhs: [[f64; 3]; 3], rhs: [f64; 3]) -> Option<(f64, f64, f64)> {
    let mut aug = [[0.0f64; 4]; 3];
    for (row, (coeffs, &value)) in aug.iter_mut().zip(lhs.iter().zip(&rhs)) {
        row[..3].copy_from_slice(coeffs);
        row[3] = value;
    }

    for pivot in 0..3 {
        let best = (pivot..3).max_by(|&i, &j| aug[i][pivot].abs().total_cmp(&aug[j][pivot].abs()))?;
        aug.swap(pivot, best);
        if aug[pivot][pivot].abs() < SINGULAR_PIVOT {
            return None;
        }
        for row in (pivot + 1)..3 {
            let factor = aug[row][pivot] / aug[pivot][pivot];
            for col in pivot..4 {
                aug[row][col] -= factor * aug[pivot][col];
            }
        }
    }

    let mut x = [0.0f64; 3];
    for row in (0..3).rev() {
        let known: f64 = ((row + 1)..3).map(|col| aug[row][col] * x[col]).sum();
        x[row] = (aug[row][3] - known) / aug[row][row];
    }

    x.iter()
        .all(|v| v.is_finite())
        .then_some((x[0], x[1], x[2]))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_from(fit: PolynomialFit, ys: impl Iterator<Item = usize>) -> PixelSample {
        PixelSample {
            points: ys
                .map(|y| (fit.x_at(y as f64).round() as usize, y))
                .collect(),
        }
    }

    #[test]
    fn test_solve_3x3_identity() {
        let (a, b, c) = solve_3x3(
            [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
            [1.0, 2.0, 3.0],
        )
        .unwrap();
        assert!((a - 1.0).abs() < 1e-10);
        assert!((b - 2.0).abs() < 1e-10);
        assert!((c - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_solve_3x3_singular() {
        let result = solve_3x3(
            [[1.0, 2.0, 3.0], [1.0, 2.0, 3.0], [4.0, 5.0, 6.0]],
            [1.0, 1.0, 2.0],
        );
        assert!(result.is_none());
    }

    #[test]
    fn test_solve_3x3_needs_row_swap() {
        // zero leading pivot: x = (1, 2, 3)
        let (a, b, c) = solve_3x3(
            [[0.0, 2.0, 1.0], [1.0, 1.0, 0.0], [2.0, 0.0, 1.0]],
            [7.0, 3.0, 5.0],
        )
        .unwrap();
        assert!((a - 1.0).abs() < 1e-10);
        assert!((b - 2.0).abs() < 1e-10);
        assert!((c - 3.0).abs() < 1e-10);
    }

    #[test]
    fn test_fit_vertical_line() {
        let sample = PixelSample {
            points: (0..720).map(|y| (300, y)).collect(),
        };
        let fit = fit_polynomial(&sample).unwrap();
        assert!(fit.a.abs() < 1e-9, "a = {}", fit.a);
        assert!(fit.b.abs() < 1e-6, "b = {}", fit.b);
        assert!((fit.c - 300.0).abs() < 1e-6, "c = {}", fit.c);
    }

    #[test]
    fn test_fit_recovers_parabola_in_pixel_space() {
        let truth = PolynomialFit::new(4e-4, -0.3, 400.0);
        // x is rounded to whole pixels, so tolerances cover ±0.5 px noise.
        let sample = sample_from(truth, (0..720).step_by(3));
        let (fit, diag) = fit_with_diagnostics(&sample);
        let fit = fit.unwrap();
        assert!((fit.a - truth.a).abs() < 2e-6, "a = {}", fit.a);
        assert!((fit.b - truth.b).abs() < 2e-3, "b = {}", fit.b);
        assert!((fit.c - truth.c).abs() < 0.5, "c = {}", fit.c);
        assert!(diag.rmse_px < 0.6);
        assert_eq!(diag.num_points, 240);
        assert_eq!(diag.distinct_rows, 240);
    }

    #[test]
    fn test_two_rows_is_unfittable() {
        let sample = PixelSample {
            points: vec![(10, 5), (12, 5), (14, 9), (20, 9), (22, 5)],
        };
        let (fit, diag) = fit_with_diagnostics(&sample);
        assert!(fit.is_none());
        assert_eq!(diag.distinct_rows, 2);
    }

    #[test]
    fn test_empty_sample_is_unfittable() {
        assert!(fit_polynomial(&PixelSample::default()).is_none());
    }

    #[test]
    fn test_three_rows_fit_exactly() {
        // x = y² − 2y + 5 through y = 1, 2, 3 → x = 4, 5, 8
        let sample = PixelSample {
            points: vec![(4, 1), (5, 2), (8, 3)],
        };
        let fit = fit_polynomial(&sample).unwrap();
        assert!((fit.a - 1.0).abs() < 1e-9);
        assert!((fit.b + 2.0).abs() < 1e-9);
        assert!((fit.c - 5.0).abs() < 1e-9);
    }
}
