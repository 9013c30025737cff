// src/analysis/cluster_locator.rs
//
// Locates the left and right lane-pixel clusters of a top-down binary mask,
// band by band from the bottom of the image upward.
//
// Two ways to find the band centres, one capability:
//   - Convolution: column sums convolved with a flat window; the response
//     peak (minus half the window) is the centre. Used blind.
//   - SlidingWindow: start from a base x per side and recentre each band on
//     the mean x of the pixels it collected. The base comes from a histogram
//     of the bottom half (blind) or from the previous frame's best fits.
//
// Bands are `height / num_bands` rows tall; band 0 is the bottom band. Rows
// left over at the top are not searched.

use crate::types::{BinaryMask, PixelSample, SearchConfig};
use serde::Serialize;
use tracing::debug;

/// Starting point of a sliding-window search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Seed {
    /// Peaks of the bottom-half column histogram, one per image half.
    Histogram,
    /// Known base positions, typically prior best fits at the bottom row.
    Prior { left_x: f64, right_x: f64 },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClusterSearch {
    Convolution,
    SlidingWindow(Seed),
}

impl ClusterSearch {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Convolution => "convolution",
            Self::SlidingWindow(Seed::Histogram) => "histogram",
            Self::SlidingWindow(Seed::Prior { .. }) => "prior",
        }
    }

    /// True for the searches that need no prior estimate.
    pub fn is_blind(&self) -> bool {
        !matches!(self, Self::SlidingWindow(Seed::Prior { .. }))
    }
}

/// One band's outcome.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BandClusters {
    /// 0 = bottom band.
    pub index: usize,
    /// Rows `y_low..y_high`.
    pub y_low: usize,
    pub y_high: usize,
    pub left_center: i64,
    pub right_center: i64,
    pub left_count: usize,
    pub right_count: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClusterSearchResult {
    /// Bottom-first.
    pub bands: Vec<BandClusters>,
    pub left: PixelSample,
    pub right: PixelSample,
}

/// Band layout for a mask: (band height, band count).
fn band_layout(height: usize, num_bands: usize) -> (usize, usize) {
    let bands = num_bands.min(height);
    if bands == 0 {
        return (0, 0);
    }
    (height / bands, bands)
}

/// Run the chosen search over `mask`.
pub fn locate_clusters(
    mask: &BinaryMask,
    search: &ClusterSearch,
    config: &SearchConfig,
) -> ClusterSearchResult {
    let result = match search {
        ClusterSearch::Convolution => convolution_search(mask, config),
        ClusterSearch::SlidingWindow(seed) => {
            let (left_x, right_x) = match seed {
                Seed::Histogram => histogram_bases(mask),
                Seed::Prior { left_x, right_x } => (to_center(*left_x), to_center(*right_x)),
            };
            sliding_window_search(mask, left_x, right_x, config)
        }
    };

    debug!(
        "  🔎 Cluster search [{}]: {} bands, L={}px R={}px",
        search.as_str(),
        result.bands.len(),
        result.left.len(),
        result.right.len()
    );
    result
}

fn to_center(x: f64) -> i64 {
    if x.is_finite() {
        x.round().clamp(i64::MIN as f64 / 2.0, i64::MAX as f64 / 2.0) as i64
    } else {
        0
    }
}

// ============================================================================
// SLIDING WINDOW
// ============================================================================

/// Bottom-half column histogram peaks for the left and right image halves.
pub fn histogram_bases(mask: &BinaryMask) -> (i64, i64) {
    let (w, h) = (mask.width(), mask.height());
    let mid = w / 2;
    let hist = mask.column_sums(h / 2, h, 0, w);
    let left = argmax_first(&hist[..mid]).map(|(i, _)| i).unwrap_or(0);
    let right = argmax_first(&hist[mid..]).map(|(i, _)| i).unwrap_or(0) + mid;
    (left as i64, right as i64)
}

fn sliding_window_search(
    mask: &BinaryMask,
    mut left_x: i64,
    mut right_x: i64,
    config: &SearchConfig,
) -> ClusterSearchResult {
    let (band_h, bands) = band_layout(mask.height(), config.num_bands);
    let margin = config.margin as i64;
    let mut result = ClusterSearchResult::default();

    for band in 0..bands {
        let y_high = mask.height() - band * band_h;
        let y_low = y_high - band_h;

        let left = collect_window(mask, y_low, y_high, left_x - margin, left_x + margin);
        let right = collect_window(mask, y_low, y_high, right_x - margin, right_x + margin);

        result.bands.push(BandClusters {
            index: band,
            y_low,
            y_high,
            left_center: left_x,
            right_center: right_x,
            left_count: left.len(),
            right_count: right.len(),
        });

        if left.len() > config.min_pixels {
            left_x = mean_x(&left);
        }
        if right.len() > config.min_pixels {
            right_x = mean_x(&right);
        }

        result.left.extend_from(&left);
        result.right.extend_from(&right);
    }

    result
}

/// On pixels in rows `y_low..y_high` with x in `[x_low, x_high)`, clamped.
fn collect_window(
    mask: &BinaryMask,
    y_low: usize,
    y_high: usize,
    x_low: i64,
    x_high: i64,
) -> Vec<(usize, usize)> {
    let w = mask.width() as i64;
    let x0 = x_low.clamp(0, w) as usize;
    let x1 = x_high.clamp(0, w) as usize;
    let mut out = Vec::new();
    if x0 >= x1 {
        return out;
    }
    for y in y_low..y_high.min(mask.height()) {
        let row = mask.row(y);
        for (x, &v) in row.iter().enumerate().take(x1).skip(x0) {
            if v != 0 {
                out.push((x, y));
            }
        }
    }
    out
}

/// Mean x, truncated toward zero.
fn mean_x(points: &[(usize, usize)]) -> i64 {
    let sum: usize = points.iter().map(|&(x, _)| x).sum();
    (sum / points.len().max(1)) as i64
}

// ============================================================================
// CONVOLUTION
// ============================================================================

fn convolution_search(mask: &BinaryMask, config: &SearchConfig) -> ClusterSearchResult {
    let (w, h) = (mask.width(), mask.height());
    let (band_h, bands) = band_layout(h, config.num_bands);
    let mut result = ClusterSearchResult::default();
    if bands == 0 || w == 0 {
        return result;
    }

    let window = config.window_width.max(1);
    let offset = (window / 2) as i64;
    let margin = config.margin as i64;
    let mid = w / 2;

    // Seed from the bottom fraction of the image, per half.
    let rows = ((h as f64) * config.blind_search_fraction).round() as usize;
    let y_start = h.saturating_sub(rows.max(1));
    let left_profile = convolve_flat(&mask.column_sums(y_start, h, 0, mid), window);
    let right_profile = convolve_flat(&mask.column_sums(y_start, h, mid, w), window);

    let mut left_x = match argmax_first(&left_profile) {
        Some((i, peak)) if peak > 0 => i as i64 - offset,
        _ => (mid / 2) as i64,
    };
    let mut right_x = match argmax_first(&right_profile) {
        Some((i, peak)) if peak > 0 => i as i64 - offset + mid as i64,
        _ => (mid + (w - mid) / 2) as i64,
    };

    for band in 0..bands {
        let y_high = h - band * band_h;
        let y_low = y_high - band_h;

        if band > 0 {
            let signal = convolve_flat(&mask.column_sums(y_low, y_high, 0, w), window);
            left_x = peak_near(&signal, left_x, offset, margin, w).unwrap_or(left_x);
            right_x = peak_near(&signal, right_x, offset, margin, w).unwrap_or(right_x);
        }

        let left = collect_window(mask, y_low, y_high, left_x - margin, left_x + margin);
        let right = collect_window(mask, y_low, y_high, right_x - margin, right_x + margin);

        result.bands.push(BandClusters {
            index: band,
            y_low,
            y_high,
            left_center: left_x,
            right_center: right_x,
            left_count: left.len(),
            right_count: right.len(),
        });
        result.left.extend_from(&left);
        result.right.extend_from(&right);
    }

    result
}

/// Full discrete convolution of `profile` with a flat window of ones.
/// Output index i covers inputs `i+1-width ..= i`, length `len + width - 1`.
pub fn convolve_flat(profile: &[u32], width: usize) -> Vec<u32> {
    if profile.is_empty() || width == 0 {
        return Vec::new();
    }
    let n = profile.len() + width - 1;
    let mut out = Vec::with_capacity(n);
    let mut acc: u32 = 0;
    for i in 0..n {
        if i < profile.len() {
            acc += profile[i];
        }
        if i >= width {
            acc -= profile[i - width];
        }
        out.push(acc);
    }
    out
}

/// Peak of `signal` within ±margin of the previous centre, as a new centre.
/// `None` when the window is empty or holds no response.
fn peak_near(signal: &[u32], center: i64, offset: i64, margin: i64, width: usize) -> Option<i64> {
    let lo = (center + offset - margin).max(0);
    let hi = (center + offset + margin).min(width as i64).min(signal.len() as i64);
    if lo >= hi {
        return None;
    }
    let (i, peak) = argmax_first(&signal[lo as usize..hi as usize])?;
    (peak > 0).then_some(i as i64 + lo - offset)
}

/// Index and value of the first maximum.
fn argmax_first(values: &[u32]) -> Option<(usize, u32)> {
    let mut best: Option<(usize, u32)> = None;
    for (i, &v) in values.iter().enumerate() {
        if best.map_or(true, |(_, b)| v > b) {
            best = Some((i, v));
        }
    }
    best
}
