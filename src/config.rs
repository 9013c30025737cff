use crate::types::Config;
use anyhow::{bail, Context, Result};
use std::fs;

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("reading config {}", path))?;
        let config: Config = serde_yaml::from_str(&contents)
            .with_context(|| format!("parsing config {}", path))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the tracker cannot run with.
    pub fn validate(&self) -> Result<()> {
        let s = &self.scale;
        if !(s.x_m_per_pix > 0.0 && s.y_m_per_pix > 0.0) {
            bail!(
                "scale must be positive, got x={} y={}",
                s.x_m_per_pix,
                s.y_m_per_pix
            );
        }

        let search = &self.search;
        if search.num_bands == 0 {
            bail!("search.num_bands must be at least 1");
        }
        if search.window_width == 0 {
            bail!("search.window_width must be at least 1");
        }
        if !(search.blind_search_fraction > 0.0 && search.blind_search_fraction <= 1.0) {
            bail!(
                "search.blind_search_fraction must be in (0, 1], got {}",
                search.blind_search_fraction
            );
        }

        let t = &self.tracker;
        if t.history_depth == 0 {
            bail!("tracker.history_depth must be at least 1");
        }
        if !(t.smoothing_alpha > 0.0 && t.smoothing_alpha <= 1.0) {
            bail!(
                "tracker.smoothing_alpha must be in (0, 1], got {}",
                t.smoothing_alpha
            );
        }
        if t.curvature_tolerance < 0.0 || t.gradient_tolerance < 0.0 {
            bail!("tracker tolerances must be non-negative");
        }
        if t.min_separation < 0.0 || t.min_separation > t.max_separation {
            bail!(
                "tracker separation band [{}, {}] is invalid",
                t.min_separation,
                t.max_separation
            );
        }
        if t.curvature_refresh_interval == 0 {
            bail!("tracker.curvature_refresh_interval must be at least 1");
        }

        if self.input.prefetch == 0 {
            bail!("input.prefetch must be at least 1");
        }
        Ok(())
    }
}
