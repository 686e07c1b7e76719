//! Marble Graph - marbles falling through user-authored curves
//!
//! Core modules:
//! - `expr`: Formula normalization, compilation and evaluation
//! - `sim`: Curves, marbles, physics stepping and the simulation loop
//! - `persistence`: Graph definition files and auto-save
//! - `settings`: Configured defaults and viewport

pub mod error;
pub mod expr;
pub mod persistence;
pub mod settings;
pub mod sim;

pub use error::{Error, Result};
pub use persistence::{GraphDefinition, LineDefinition};
pub use settings::{LineDefaults, Settings, Viewport};
pub use sim::{Graph, Simulation, Snapshot};

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Directory name used under the user config/data directories
pub const APP_DIR: &str = "marble-graph";

/// Simulation constants
pub mod consts {
    /// Simulation loop rate
    pub const TICK_HZ: f64 = 60.0;
    /// Viewport area that gives a force scale of 1
    pub const FORCE_NORMALIZATION: f64 = 400.0;
    /// Half-width of the secant used for the tangent at an impact point
    pub const TANGENT_OFFSET: f64 = 0.01;
}

/// RGB display color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);
    pub const BLUE: Color = Color::rgb(0x3b, 0x82, 0xf6);
    pub const RED: Color = Color::rgb(0xef, 0x44, 0x44);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// A random, reasonably bright color
    pub fn random(rng: &mut impl Rng) -> Self {
        Self::rgb(
            rng.random_range(64..=255),
            rng.random_range(64..=255),
            rng.random_range(64..=255),
        )
    }
}

impl Default for Color {
    fn default() -> Self {
        Color::WHITE
    }
}
