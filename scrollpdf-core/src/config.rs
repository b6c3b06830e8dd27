use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::observe::ObserverOptions;
use crate::prefs::ZoomStep;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutSettings {
    /// PDF points per terminal row at scale 1.0.
    pub points_per_row: f32,
    /// PDF points per terminal column at scale 1.0.
    pub points_per_column: f32,
    /// Rows left above every page (the page label lives there).
    pub page_gap: f32,
}

impl Default for LayoutSettings {
    fn default() -> Self {
        Self {
            points_per_row: 16.0,
            points_per_column: 7.0,
            page_gap: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    /// Rows moved per line-scroll step.
    pub scroll_step: f32,
    pub zoom: ZoomStep,
    pub observer: ObserverOptions,
    pub layout: LayoutSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            scroll_step: 1.0,
            zoom: ZoomStep::default(),
            observer: ObserverOptions::default(),
            layout: LayoutSettings::default(),
        }
    }
}

impl Config {
    /// Missing files yield the defaults; unreadable or malformed ones are
    /// errors.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {:?}", path))?;
        Self::from_toml_str(&raw).with_context(|| format!("failed to parse config file {:?}", path))
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Config = toml::from_str(raw)?;
        Ok(config.sanitized())
    }

    fn sanitized(mut self) -> Self {
        let defaults = LayoutSettings::default();
        if !(self.layout.points_per_row.is_finite() && self.layout.points_per_row > 0.0) {
            self.layout.points_per_row = defaults.points_per_row;
        }
        if !(self.layout.points_per_column.is_finite() && self.layout.points_per_column > 0.0) {
            self.layout.points_per_column = defaults.points_per_column;
        }
        if !self.layout.page_gap.is_finite() || self.layout.page_gap < 0.0 {
            self.layout.page_gap = defaults.page_gap;
        }
        if !self.scroll_step.is_finite() || self.scroll_step <= 0.0 {
            self.scroll_step = 1.0;
        }
        if !self.zoom.is_usable() {
            self.zoom = ZoomStep::default();
        }
        self.observer.threshold = if self.observer.threshold.is_finite() {
            self.observer.threshold.clamp(0.0, 1.0)
        } else {
            ObserverOptions::default().threshold
        };
        self
    }
}
