use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Working resolution every sampled frame is resized to (width, height).
pub const FRAME_SIZE: (i32, i32) = (640, 480);

pub const DEFAULT_THICKNESS: u32 = 4;
pub const DEFAULT_FRAME_FREQUENCY: u32 = 1;
pub const DEFAULT_SKEW_EFFECT: u32 = 30;
pub const DEFAULT_DUST_THRESHOLD: u32 = 200;
pub const DEFAULT_DUST_MIN_AREA: f64 = 10.0;

const MAX_THICKNESS: u32 = 20;
const MAX_FRAME_FREQUENCY: u32 = 20;
const MAX_SKEW_EFFECT: u32 = 50;
const MIN_DUST_THRESHOLD: u32 = 150;
const MAX_DUST_THRESHOLD: u32 = 255;

/// Parameters for one "compute map" invocation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(default)]
pub struct MapSettings {
    /// Rows taken from each frame border
    pub thickness: u32,
    /// Source frames advanced between two samples
    pub frame_frequency: u32,
    /// Amplitude of the cosine skew correction, in rows
    pub skew_effect: u32,
    /// Intensity cut for dust binarization
    pub dust_threshold: u32,
    /// Contours must enclose strictly more than this area
    pub dust_min_area: f64,
    pub dust_selection_enabled: bool,
    /// Horizontal crop margin (0 together with `crop_y` disables cropping)
    pub crop_x: u32,
    /// Vertical crop margin
    pub crop_y: u32,
}

impl Default for MapSettings {
    fn default() -> Self {
        Self {
            thickness: DEFAULT_THICKNESS,
            frame_frequency: DEFAULT_FRAME_FREQUENCY,
            skew_effect: DEFAULT_SKEW_EFFECT,
            dust_threshold: DEFAULT_DUST_THRESHOLD,
            dust_min_area: DEFAULT_DUST_MIN_AREA,
            dust_selection_enabled: false,
            crop_x: 0,
            crop_y: 0,
        }
    }
}

impl MapSettings {
    /// Reads settings from a JSON file. Missing fields fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read settings file: {:?}", path))?;
        let settings: MapSettings = serde_json::from_str(&content)
            .with_context(|| format!("Invalid settings file: {:?}", path))?;
        Ok(settings)
    }

    /// Returns a copy with every field forced into its legal range.
    pub fn clamped(&self) -> Self {
        let clamp_u32 = |name: &str, value: u32, min: u32, max: u32| {
            let clamped = value.clamp(min, max);
            if clamped != value {
                tracing::warn!("Settings: {}={} out of range, using {}", name, value, clamped);
            }
            clamped
        };

        let dust_min_area = if self.dust_min_area.is_finite() {
            self.dust_min_area.max(DEFAULT_DUST_MIN_AREA)
        } else {
            DEFAULT_DUST_MIN_AREA
        };
        if dust_min_area != self.dust_min_area {
            tracing::warn!(
                "Settings: dust_min_area={} out of range, using {}",
                self.dust_min_area,
                dust_min_area
            );
        }

        Self {
            thickness: clamp_u32("thickness", self.thickness, 1, MAX_THICKNESS),
            frame_frequency: clamp_u32(
                "frame_frequency",
                self.frame_frequency,
                1,
                MAX_FRAME_FREQUENCY,
            ),
            skew_effect: clamp_u32("skew_effect", self.skew_effect, 0, MAX_SKEW_EFFECT),
            dust_threshold: clamp_u32(
                "dust_threshold",
                self.dust_threshold,
                MIN_DUST_THRESHOLD,
                MAX_DUST_THRESHOLD,
            ),
            dust_min_area,
            dust_selection_enabled: self.dust_selection_enabled,
            crop_x: self.crop_x,
            crop_y: self.crop_y,
        }
    }

    pub fn crop_enabled(&self) -> bool {
        self.crop_x > 0 || self.crop_y > 0
    }
}
