//! Marble state

use glam::DVec2;
use serde::{Deserialize, Serialize};

use super::params::TrackingConfig;
use crate::Color;

/// Tracking metadata for a marble's trail
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Tracking {
    pub enabled: bool,
    pub last_sample: DVec2,
    pub frames_since_sample: u32,
    /// Step counter value when tracking began
    pub since_step: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Marble {
    pub pos: DVec2,
    pub vel: DVec2,
    /// Position before the last physics pass
    pub prev_pos: DVec2,
    pub color: Color,
    pub tracking: Tracking,
    /// Sampled positions (newest first)
    #[serde(skip)]
    pub trail: Vec<DVec2>,
}

impl Marble {
    pub fn new(pos: DVec2, vel: DVec2, color: Color) -> Self {
        Self {
            pos,
            vel,
            prev_pos: pos,
            color,
            tracking: Tracking::default(),
            trail: Vec::new(),
        }
    }

    pub fn start_tracking(&mut self, step: u64) {
        self.tracking = Tracking {
            enabled: true,
            last_sample: self.pos,
            frames_since_sample: 0,
            since_step: step,
        };
        self.trail.clear();
        self.trail.push(self.pos);
    }

    pub fn stop_tracking(&mut self) {
        self.tracking.enabled = false;
        self.trail.clear();
    }

    /// Record the current position to the trail every `accuracy` calls
    pub fn record_trail(&mut self, config: &TrackingConfig) {
        if !self.tracking.enabled {
            return;
        }
        self.tracking.frames_since_sample += 1;
        if self.tracking.frames_since_sample < config.accuracy.max(1) {
            return;
        }
        self.tracking.frames_since_sample = 0;
        self.tracking.last_sample = self.pos;
        self.trail.insert(0, self.pos);
        self.trail.truncate(config.frame_window as usize);
    }
}
