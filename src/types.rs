// src/types.rs
//
// Shared data model: configuration sections (YAML), the binary mask input,
// per-frame pixel samples and polynomial fits.

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub scale: ScaleConfig,
    pub search: SearchConfig,
    pub tracker: TrackerConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    pub logging: LoggingConfig,
}

/// Pixel → metre conversion of the rectified top-down view.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScaleConfig {
    /// Metres per pixel along x (lateral).
    pub x_m_per_pix: f64,
    /// Metres per pixel along y (longitudinal).
    pub y_m_per_pix: f64,
}

impl Default for ScaleConfig {
    fn default() -> Self {
        Self {
            x_m_per_pix: 3.7 / 605.0,
            y_m_per_pix: 15.0 / 920.0,
        }
    }
}

/// Which search seeds tracking when no prior estimate exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BlindStrategy {
    /// Bottom-half column histogram peak, then sliding windows.
    Histogram,
    /// Flat-window convolution of column sums per band.
    Convolution,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of equal-height horizontal bands.
    pub num_bands: usize,
    /// Width of the flat convolution window (blind convolution search).
    pub window_width: usize,
    /// Half-width of a search window around the band centre.
    pub margin: usize,
    /// A band recentres only when it collected more pixels than this.
    pub min_pixels: usize,
    /// Fraction of the mask height, measured from the bottom, summed to seed
    /// the convolution search.
    pub blind_search_fraction: f64,
    pub blind_strategy: BlindStrategy,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            num_bands: 9,
            window_width: 50,
            margin: 100,
            min_pixels: 50,
            blind_search_fraction: 0.7,
            blind_strategy: BlindStrategy::Histogram,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Number of accepted fits averaged into the best fit.
    pub history_depth: usize,
    /// Weight of the fresh radius when the curvature refresh blends.
    pub smoothing_alpha: f64,
    /// Max |R_own − R_other| / R_own.
    pub curvature_tolerance: f64,
    /// Max |g_own − g_other| / |g_own|.
    pub gradient_tolerance: f64,
    /// Lane width band at the bottom row, in pixels.
    pub min_separation: f64,
    pub max_separation: f64,
    /// Radius of curvature refreshes on frames where index % interval == 0.
    pub curvature_refresh_interval: u64,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            history_depth: 10,
            smoothing_alpha: 0.1,
            curvature_tolerance: 10.0,
            gradient_tolerance: 10.0,
            min_separation: 250.0,
            max_separation: 750.0,
            curvature_refresh_interval: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InputConfig {
    /// Directory holding pre-thresholded top-down masks, one per frame.
    pub mask_dir: String,
    pub extensions: Vec<String>,
    /// Frames decoded ahead of the tracker.
    pub prefetch: usize,
    /// Grayscale values at or above this are lane pixels.
    pub on_threshold: u8,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            mask_dir: "masks".to_string(),
            extensions: vec!["png".to_string(), "bmp".to_string(), "pgm".to_string()],
            prefetch: 8,
            on_threshold: 128,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// JSON-lines file receiving one report per frame.
    pub report_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// Optional file receiving a copy of the log without colours.
    pub file: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

// ============================================================================
// FRAME DATA
// ============================================================================

/// Lane side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Left,
    Right,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Left => "left",
            Self::Right => "right",
        }
    }
}

/// Rectified top-down binary mask, row-major, one byte per pixel (0 or 1).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryMask {
    data: Vec<u8>,
    width: usize,
    height: usize,
}

impl BinaryMask {
    /// Build from a raw buffer. Any non-zero byte marks a lane pixel.
    pub fn from_raw(width: usize, height: usize, raw: &[u8]) -> Result<Self> {
        if raw.len() != width * height {
            bail!(
                "mask buffer has {} bytes, expected {}x{} = {}",
                raw.len(),
                width,
                height,
                width * height
            );
        }
        let data = raw.iter().map(|&v| u8::from(v != 0)).collect();
        Ok(Self {
            data,
            width,
            height,
        })
    }

    /// Build from a grayscale image, thresholding at `on_threshold`.
    pub fn from_luma(image: &image::GrayImage, on_threshold: u8) -> Self {
        let (w, h) = image.dimensions();
        let data = image
            .as_raw()
            .iter()
            .map(|&v| u8::from(v >= on_threshold))
            .collect();
        Self {
            data,
            width: w as usize,
            height: h as usize,
        }
    }

    /// All-zero mask.
    pub fn empty(width: usize, height: usize) -> Self {
        Self {
            data: vec![0; width * height],
            width,
            height,
        }
    }

    #[inline]
    pub fn width(&self) -> usize {
        self.width
    }

    #[inline]
    pub fn height(&self) -> usize {
        self.height
    }

    #[inline]
    pub fn is_on(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x] != 0
    }

    /// Mark a pixel as lane material (used by callers building masks).
    pub fn set(&mut self, x: usize, y: usize) {
        if x < self.width && y < self.height {
            self.data[y * self.width + x] = 1;
        }
    }

    /// Row slice.
    #[inline]
    pub fn row(&self, y: usize) -> &[u8] {
        &self.data[y * self.width..(y + 1) * self.width]
    }

    /// Column sums over rows `y_start..y_end` and columns `x_start..x_end`.
    pub fn column_sums(&self, y_start: usize, y_end: usize, x_start: usize, x_end: usize) -> Vec<u32> {
        let x_end = x_end.min(self.width);
        let y_end = y_end.min(self.height);
        if x_start >= x_end {
            return Vec::new();
        }
        let mut sums = vec![0u32; x_end - x_start];
        for y in y_start..y_end {
            let row = self.row(y);
            for (sum, &v) in sums.iter_mut().zip(&row[x_start..x_end]) {
                *sum += v as u32;
            }
        }
        sums
    }

    pub fn count_on(&self) -> usize {
        self.data.iter().filter(|&&v| v != 0).count()
    }
}

/// Candidate lane pixels for one side in the current frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelSample {
    pub points: Vec<(usize, usize)>,
}

impl PixelSample {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn extend_from(&mut self, other: &[(usize, usize)]) {
        self.points.extend_from_slice(other);
    }
}

/// x = a·y² + b·y + c, pixel coordinates.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct PolynomialFit {
    pub a: f64,
    pub b: f64,
    pub c: f64,
}

impl PolynomialFit {
    pub fn new(a: f64, b: f64, c: f64) -> Self {
        Self { a, b, c }
    }

    #[inline]
    pub fn x_at(&self, y: f64) -> f64 {
        self.a * y * y + self.b * y + self.c
    }

    pub fn is_finite(&self) -> bool {
        self.a.is_finite() && self.b.is_finite() && self.c.is_finite()
    }

    /// Coefficient-wise difference `self − other`.
    pub fn delta(&self, other: &PolynomialFit) -> PolynomialFit {
        PolynomialFit {
            a: self.a - other.a,
            b: self.b - other.b,
            c: self.c - other.c,
        }
    }
}
