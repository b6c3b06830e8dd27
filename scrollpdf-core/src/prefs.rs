use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Error};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::store::KeyValueStore;

pub const SCALE_KEY: &str = "scale";
pub const ALIGN_KEY: &str = "align";
pub const MIN_SCALE: f32 = 0.25;
pub const MAX_SCALE: f32 = 4.0;
pub const MIN_ADDITIVE_STEP: f32 = 0.01;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    Start,
    #[default]
    Center,
    End,
}

impl Alignment {
    pub fn token(self) -> &'static str {
        match self {
            Alignment::Start => "start",
            Alignment::Center => "center",
            Alignment::End => "end",
        }
    }

    pub fn next(self) -> Self {
        match self {
            Alignment::Start => Alignment::Center,
            Alignment::Center => Alignment::End,
            Alignment::End => Alignment::Start,
        }
    }

    /// Left padding for content `content` wide inside `available` columns.
    pub fn offset(self, available: usize, content: usize) -> usize {
        let slack = available.saturating_sub(content);
        match self {
            Alignment::Start => 0,
            Alignment::Center => slack / 2,
            Alignment::End => slack,
        }
    }
}

impl fmt::Display for Alignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.token())
    }
}

impl FromStr for Alignment {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "start" => Ok(Alignment::Start),
            "center" => Ok(Alignment::Center),
            "end" => Ok(Alignment::End),
            other => Err(anyhow!("unknown alignment {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoomMode {
    Additive,
    Multiplicative,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ZoomStep {
    pub mode: ZoomMode,
    pub step: f32,
}

impl Default for ZoomStep {
    fn default() -> Self {
        Self {
            mode: ZoomMode::Additive,
            step: 0.1,
        }
    }
}

impl ZoomStep {
    /// Whether zooming in with this step actually grows the scale.
    pub fn is_usable(&self) -> bool {
        self.step.is_finite()
            && match self.mode {
                ZoomMode::Additive => self.step >= MIN_ADDITIVE_STEP,
                ZoomMode::Multiplicative => self.step > 1.0,
            }
    }

    fn apply(&self, scale: f32, zoom_in: bool) -> f32 {
        let next = match (self.mode, zoom_in) {
            (ZoomMode::Additive, true) => scale + self.step,
            (ZoomMode::Additive, false) => scale - self.step,
            (ZoomMode::Multiplicative, true) => scale * self.step,
            (ZoomMode::Multiplicative, false) => scale / self.step,
        };
        clamp_scale((next * 100.0).round() / 100.0)
    }
}

fn clamp_scale(scale: f32) -> f32 {
    if scale.is_finite() {
        scale.clamp(MIN_SCALE, MAX_SCALE)
    } else {
        1.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewerPreferences {
    pub scale: f32,
    pub align: Alignment,
}

impl Default for ViewerPreferences {
    fn default() -> Self {
        Self {
            scale: 1.0,
            align: Alignment::default(),
        }
    }
}

impl ViewerPreferences {
    /// Reads both preferences, falling back to defaults for anything missing
    /// or malformed.
    pub fn load(store: &dyn KeyValueStore) -> Self {
        let mut prefs = Self::default();
        if let Some(scale) = read(store, SCALE_KEY).and_then(|raw| raw.trim().parse::<f32>().ok())
        {
            if scale.is_finite() && scale > 0.0 {
                prefs.scale = clamp_scale(scale);
            }
        }
        if let Some(align) = read(store, ALIGN_KEY).and_then(|raw| raw.parse().ok()) {
            prefs.align = align;
        }
        prefs
    }

    /// Returns true when the scale changed (and was written back).
    pub fn zoom(&mut self, store: &dyn KeyValueStore, step: &ZoomStep, zoom_in: bool) -> bool {
        let next = step.apply(self.scale, zoom_in);
        if (next - self.scale).abs() < f32::EPSILON {
            return false;
        }
        self.scale = next;
        write(store, SCALE_KEY, &self.scale.to_string());
        true
    }

    pub fn toggle_align(&mut self, store: &dyn KeyValueStore) -> Alignment {
        self.align = self.align.next();
        write(store, ALIGN_KEY, self.align.token());
        self.align
    }

    pub fn save(&self, store: &dyn KeyValueStore) {
        write(store, SCALE_KEY, &self.scale.to_string());
        write(store, ALIGN_KEY, self.align.token());
    }
}

fn read(store: &dyn KeyValueStore, key: &str) -> Option<String> {
    match store.get(key) {
        Ok(value) => value,
        Err(err) => {
            warn!(?err, key, "failed to read preference");
            None
        }
    }
}

fn write(store: &dyn KeyValueStore, key: &str, value: &str) {
    if let Err(err) = store.set(key, value) {
        warn!(?err, key, "failed to persist preference");
    }
}
