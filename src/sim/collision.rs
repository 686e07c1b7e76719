//! Collision detection and response against function curves
//!
//! A marble hits a curve when its height relative to the curve changes sign
//! over one pass. The response reflects the velocity about the curve normal
//! at the crossing point.

use std::f64::consts::{FRAC_PI_2, PI};

use glam::DVec2;

/// Curve heights sampled around one marble move
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CurveSamples {
    /// At the old x, previous time
    pub old: f64,
    /// At the candidate x, previous time
    pub new_prev: f64,
    /// At the candidate x, current time
    pub new: f64,
}

impl CurveSamples {
    /// Vertical motion of the curve under the candidate x since the last pass
    pub fn drift(&self) -> f64 {
        self.new - self.new_prev
    }
}

/// Result of a collision check
#[derive(Debug, Clone)]
pub struct CollisionResult {
    /// Whether a collision occurred
    pub hit: bool,
    /// Index of the curve that was hit
    pub line: usize,
    pub samples: CurveSamples,
}

impl CollisionResult {
    pub fn miss() -> Self {
        Self {
            hit: false,
            line: 0,
            samples: CurveSamples {
                old: 0.0,
                new_prev: 0.0,
                new: 0.0,
            },
        }
    }
}

/// Strict sign change of `y - curve` between the old and candidate points,
/// both measured against the curve at the previous time
pub fn crosses(old: DVec2, candidate: DVec2, samples: &CurveSamples) -> bool {
    let before = old.y - samples.old;
    let after = candidate.y - samples.new_prev;
    (before > 0.0 && after < 0.0) || (before < 0.0 && after > 0.0)
}

/// Where the marble's path meets the curve's secant between the two x samples
pub fn intersection(old: DVec2, candidate: DVec2, samples: &CurveSamples) -> DVec2 {
    let before = old.y - samples.old;
    let after = candidate.y - samples.new_prev;
    let denom = before - after;
    // Straight up or down: the curve value under the marble is exact
    if old.x == candidate.x || denom == 0.0 {
        return DVec2::new(candidate.x, samples.new_prev);
    }
    let s = (before / denom).clamp(0.0, 1.0);
    old + (candidate - old) * s
}

/// Reflect `vel` about the normal of a surface with the given tangent angle.
///
/// Angle form of `v - 2(v·n)n`: the reversed incoming direction is mirrored
/// across the normal, speed preserved.
pub fn reflect_velocity(vel: DVec2, tangent_angle: f64) -> DVec2 {
    let speed = vel.length();
    if speed == 0.0 {
        return DVec2::ZERO;
    }
    let normal = tangent_angle + FRAC_PI_2;
    let reversed = vel.y.atan2(vel.x) + PI;
    let out = 2.0 * normal - reversed;
    DVec2::new(out.cos(), out.sin()) * speed
}

/// Tangent angle from a symmetric secant of half-width `offset`
pub fn tangent_angle(y_left: f64, y_right: f64, offset: f64) -> f64 {
    (y_right - y_left).atan2(2.0 * offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn flat(y: f64) -> CurveSamples {
        CurveSamples {
            old: y,
            new_prev: y,
            new: y,
        }
    }

    #[test]
    fn test_crossing_is_strict() {
        let samples = flat(0.0);
        assert!(crosses(DVec2::new(0.0, 1.0), DVec2::new(0.0, -1.0), &samples));
        assert!(crosses(DVec2::new(0.0, -1.0), DVec2::new(0.0, 1.0), &samples));
        assert!(!crosses(DVec2::new(0.0, 1.0), DVec2::new(0.0, 0.0), &samples));
        assert!(!crosses(DVec2::new(0.0, 0.0), DVec2::new(0.0, -1.0), &samples));
        assert!(!crosses(DVec2::new(0.0, 2.0), DVec2::new(0.0, 1.0), &samples));
    }

    #[test]
    fn test_intersection_on_flat_curve() {
        let p = intersection(DVec2::new(0.0, 1.0), DVec2::new(2.0, -3.0), &flat(0.0));
        assert!((p - DVec2::new(0.5, 0.0)).length() < EPS);
    }

    #[test]
    fn test_intersection_on_sloped_curve() {
        // Curve y = x, marble falls straight down through x = 1
        let samples = CurveSamples {
            old: 1.0,
            new_prev: 1.0,
            new: 1.0,
        };
        let p = intersection(DVec2::new(1.0, 3.0), DVec2::new(1.0, -1.0), &samples);
        assert!((p - DVec2::new(1.0, 1.0)).length() < EPS);
    }

    #[test]
    fn test_reflect_off_flat_surface() {
        let out = reflect_velocity(DVec2::new(1.0, -1.0), 0.0);
        assert!((out - DVec2::new(1.0, 1.0)).length() < EPS);

        let out = reflect_velocity(DVec2::new(0.0, -2.0), 0.0);
        assert!((out - DVec2::new(0.0, 2.0)).length() < EPS);
    }

    #[test]
    fn test_reflect_matches_vector_form() {
        let vel = DVec2::new(0.3, -1.7);
        let angle: f64 = 0.4;
        let n = DVec2::new(-angle.sin(), angle.cos());
        let expected = vel - 2.0 * vel.dot(n) * n;
        assert!((reflect_velocity(vel, angle) - expected).length() < EPS);
    }

    #[test]
    fn test_reflect_preserves_speed() {
        let vel = DVec2::new(-2.0, 0.5);
        assert!((reflect_velocity(vel, 1.1).length() - vel.length()).abs() < EPS);
    }

    #[test]
    fn test_tangent_angle() {
        assert!((tangent_angle(-0.01, 0.01, 0.01) - PI / 4.0).abs() < EPS);
        assert_eq!(tangent_angle(3.0, 3.0, 0.01), 0.0);
    }
}
