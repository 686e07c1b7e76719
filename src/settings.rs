//! Application settings
//!
//! Persisted separately from graphs, as `settings.json` in the user config
//! directory.

use std::path::PathBuf;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::consts::FORCE_NORMALIZATION;
use crate::error::Result;

/// Global simulation bounds, also the visible x-range
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            min_x: -10.0,
            max_x: 10.0,
            min_y: -10.0,
            max_y: 10.0,
        }
    }
}

impl Viewport {
    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn contains(&self, p: DVec2) -> bool {
        p.x >= self.min_x && p.x <= self.max_x && p.y >= self.min_y && p.y <= self.max_y
    }

    /// Multiplier that keeps force magnitude independent of the view size
    pub fn force_scale(&self) -> f64 {
        self.width() * self.height() / FORCE_NORMALIZATION
    }
}

/// Formulas substituted for blank line fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LineDefaults {
    pub formula: String,
    pub graph_if: String,
    pub bounce: String,
    pub min_x: String,
    pub max_x: String,
    pub min_y: String,
    pub max_y: String,
}

impl Default for LineDefaults {
    fn default() -> Self {
        Self {
            formula: "0".to_string(),
            graph_if: "true".to_string(),
            bounce: "1".to_string(),
            min_x: "-10".to_string(),
            max_x: "10".to_string(),
            min_y: "-10".to_string(),
            max_y: "10".to_string(),
        }
    }
}

/// Application settings/preferences
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub viewport: Viewport,
    /// x-step used when sampling curve paths for drawing
    pub sample_increment: f64,
    pub line_defaults: LineDefaults,
    /// Seed for marble display colors
    pub color_seed: u64,
    /// Write the auto-save file after every successful rebuild
    pub autosave: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            viewport: Viewport::default(),
            sample_increment: 0.05,
            line_defaults: LineDefaults::default(),
            color_seed: 0x5eed,
            autosave: true,
        }
    }
}

impl Settings {
    const FILE_NAME: &'static str = "settings.json";

    pub fn path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(crate::APP_DIR).join(Self::FILE_NAME))
    }

    /// Load from the config directory, falling back to defaults
    pub fn load() -> Self {
        let Some(path) = Self::path() else {
            log::info!("No config directory, using default settings");
            return Self::default();
        };

        match std::fs::read_to_string(&path) {
            Ok(json) => match serde_json::from_str(&json) {
                Ok(settings) => {
                    log::info!("Loaded settings from {}", path.display());
                    settings
                }
                Err(e) => {
                    log::warn!("Ignoring unreadable settings {}: {e}", path.display());
                    Self::default()
                }
            },
            Err(_) => {
                log::info!("Using default settings");
                Self::default()
            }
        }
    }

    pub fn save(&self) -> Result<()> {
        let path = Self::path().ok_or(crate::Error::NoDataDir)?;
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        std::fs::write(&path, serde_json::to_string_pretty(self)?)?;
        log::info!("Settings saved");
        Ok(())
    }
}
