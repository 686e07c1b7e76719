//! Physics stepper
//!
//! One pass advances every marble once: force integration, position update,
//! collision detection against the curves and bounce response.

use glam::DVec2;

use super::collision::{
    CollisionResult, CurveSamples, crosses, intersection, reflect_velocity, tangent_angle,
};
use super::line::Line;
use super::marble::Marble;
use super::params::ParamFormulas;
use crate::consts::TANGENT_OFFSET;
use crate::expr::{EvalContext, EvalError};
use crate::settings::Viewport;

/// Current and previous simulated time
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Clock {
    pub time: f64,
    pub prev_time: f64,
}

/// Outcome of one pass
#[derive(Debug, Clone, Default)]
pub struct StepReport {
    pub collisions: usize,
    /// Last recoverable error, already replaced by a fallback value
    pub local_error: Option<EvalError>,
}

impl StepReport {
    fn absorb(&mut self, ctx: &EvalContext<'_>) {
        if let Some(e) = ctx.take_local_error() {
            self.local_error = Some(e);
        }
    }
}

/// Pass fatal errors through; swap anything else for `fallback`
pub(crate) fn settle<T>(
    result: Result<T, EvalError>,
    fallback: T,
    local: &mut Option<EvalError>,
) -> Result<T, EvalError> {
    match result {
        Ok(v) => Ok(v),
        Err(e) if e.is_fatal() => Err(e),
        Err(e) => {
            log::debug!("evaluation failed, using fallback: {e}");
            *local = Some(e);
            Ok(fallback)
        }
    }
}

/// Advance all marbles by one pass.
///
/// Returns the first fatal evaluation error; marbles already moved in this
/// pass keep their new state.
pub fn step(
    lines: &mut [Line],
    marbles: &mut [Marble],
    params: &ParamFormulas,
    clock: Clock,
    viewport: &Viewport,
) -> Result<StepReport, EvalError> {
    let mut report = StepReport::default();
    let force_scale = viewport.force_scale();

    for marble in marbles.iter_mut() {
        let old = marble.pos;

        let (vel, candidate) = {
            let curves: &[Line] = lines;
            let ctx = EvalContext::new(&curves, clock.time);
            let (fx, fy) = settle(params.force(&ctx, old.x, old.y), (0.0, 0.0), &mut report.local_error)?;
            let vel = marble.vel + DVec2::new(fx, fy) * force_scale;
            let rate = settle(params.rate(&ctx, old.x, old.y), 0.0, &mut report.local_error)?;
            report.absorb(&ctx);
            (vel, old + vel * rate)
        };

        let hit = detect(lines, old, candidate, clock, viewport, &mut report)?;

        let (vel, pos) = if hit.hit {
            lines[hit.line].hits += 1;
            report.collisions += 1;
            respond(lines, &hit, old, candidate, vel, clock, &mut report)?
        } else {
            (vel, candidate)
        };

        marble.prev_pos = old;
        marble.vel = vel;
        marble.pos = pos;
    }

    Ok(report)
}

/// First curve, in list order, that the move from `old` to `candidate` hits
fn detect(
    lines: &[Line],
    old: DVec2,
    candidate: DVec2,
    clock: Clock,
    viewport: &Viewport,
    report: &mut StepReport,
) -> Result<CollisionResult, EvalError> {
    let prev = EvalContext::new(&lines, clock.prev_time);
    let now = EvalContext::new(&lines, clock.time);
    let mut result = CollisionResult::miss();

    for (index, line) in lines.iter().enumerate() {
        // Lines past the name table are drawn but never collide
        if !line.is_ready() || line.name.is_none() {
            continue;
        }

        // NaN never crosses, so a curve that can't be evaluated is skipped
        let local = &mut report.local_error;
        let samples = CurveSamples {
            old: settle(line.y_at(&prev, old.x, clock.prev_time), f64::NAN, local)?,
            new_prev: settle(line.y_at(&prev, candidate.x, clock.prev_time), f64::NAN, local)?,
            new: settle(line.y_at(&now, candidate.x, clock.time), f64::NAN, local)?,
        };
        if !crosses(old, candidate, &samples) || !viewport.contains(candidate) {
            continue;
        }

        let (x, y, t) = (candidate.x, candidate.y, clock.time);
        if !settle(line.is_active_at(&now, x, y, t), false, local)? {
            continue;
        }
        if !settle(line.contains(&now, x, y, t), false, local)? {
            continue;
        }

        result = CollisionResult {
            hit: true,
            line: index,
            samples,
        };
        break;
    }

    report.absorb(&prev);
    report.absorb(&now);
    Ok(result)
}

/// New velocity and position after bouncing off `hit.line`
fn respond(
    lines: &[Line],
    hit: &CollisionResult,
    old: DVec2,
    candidate: DVec2,
    vel: DVec2,
    clock: Clock,
    report: &mut StepReport,
) -> Result<(DVec2, DVec2), EvalError> {
    let line = &lines[hit.line];
    let ctx = EvalContext::new(&lines, clock.time);
    let t = clock.time;
    let local = &mut report.local_error;

    let point = intersection(old, candidate, &hit.samples);
    let left = settle(line.y_at(&ctx, point.x - TANGENT_OFFSET, t), point.y, local)?;
    let right = settle(line.y_at(&ctx, point.x + TANGENT_OFFSET, t), point.y, local)?;
    let angle = tangent_angle(left, right, TANGENT_OFFSET);
    let bounce = settle(line.bounce_at(&ctx, point.x, point.y, t), 0.0, local)?;

    let vel = reflect_velocity(vel, angle) * bounce;
    // Ride along with a curve that moved under the marble
    let pos = DVec2::new(point.x, point.y + hit.samples.drift());

    report.absorb(&ctx);
    Ok((vel, pos))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Color;
    use crate::settings::LineDefaults;
    use crate::sim::params::Params;
    use crate::sim::registry;

    fn setup(formulas: &[&str], params: Params) -> (Vec<Line>, ParamFormulas) {
        let mut lines: Vec<Line> = formulas.iter().map(|f| Line::new(*f)).collect();
        let (namespace, errors) = registry::rebuild(&mut lines, &LineDefaults::default());
        assert!(errors.is_empty());
        let params = ParamFormulas::compile(&params, &namespace).unwrap();
        (lines, params)
    }

    fn drop_params() -> Params {
        Params {
            force_x: "0".to_string(),
            force_y: "0".to_string(),
            update_rate: "1.5".to_string(),
            ..Default::default()
        }
    }

    fn falling_marble() -> Marble {
        Marble::new(DVec2::new(0.0, 1.0), DVec2::new(0.0, -1.0), Color::WHITE)
    }

    #[test]
    fn test_free_flight() {
        let (mut lines, params) = setup(&[], drop_params());
        let mut marbles = vec![falling_marble()];
        let report = step(&mut lines, &mut marbles, &params, Clock::default(), &Viewport::default()).unwrap();
        assert_eq!(report.collisions, 0);
        assert_eq!(marbles[0].pos, DVec2::new(0.0, -0.5));
        assert_eq!(marbles[0].prev_pos, DVec2::new(0.0, 1.0));
    }

    #[test]
    fn test_force_is_added_to_velocity() {
        let params = Params {
            force_y: "-1".to_string(),
            update_rate: "1".to_string(),
            ..drop_params()
        };
        let (mut lines, params) = setup(&[], params);
        let mut marbles = vec![Marble::new(DVec2::ZERO, DVec2::ZERO, Color::WHITE)];
        step(&mut lines, &mut marbles, &params, Clock::default(), &Viewport::default()).unwrap();
        assert!((marbles[0].vel.y + 1.0).abs() < 1e-12);
        assert!((marbles[0].pos.y + 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_unnamed_line_does_not_collide() {
        let mut formulas = vec!["50"; registry::LINE_NAMES.len()];
        formulas.push("0");
        let (mut lines, params) = setup(&formulas, drop_params());
        assert!(lines[registry::LINE_NAMES.len()].name.is_none());
        assert!(lines.iter().all(|l| l.is_ready()));

        let mut marbles = vec![falling_marble()];
        let report = step(&mut lines, &mut marbles, &params, Clock::default(), &Viewport::default()).unwrap();
        assert_eq!(report.collisions, 0);
        assert!(lines.iter().all(|l| l.hits == 0));
        assert_eq!(marbles[0].pos, DVec2::new(0.0, -0.5));
    }

    #[test]
    fn test_bounce_off_flat_curve() {
        let (mut lines, params) = setup(&["0"], drop_params());
        let mut marbles = vec![falling_marble()];
        let report = step(&mut lines, &mut marbles, &params, Clock::default(), &Viewport::default()).unwrap();

        assert_eq!(report.collisions, 1);
        assert_eq!(lines[0].hits, 1);
        assert!(marbles[0].pos.y >= 0.0);
        assert!((marbles[0].vel.y - 1.0).abs() < 1e-9);
        assert!(marbles[0].vel.x.abs() < 1e-9);
    }

    #[test]
    fn test_out_of_bounds_collision_ignored() {
        let (mut lines, params) = setup(&["0"], drop_params());
        let viewport = Viewport {
            min_y: 5.0,
            ..Default::default()
        };
        let mut marbles = vec![falling_marble()];
        step(&mut lines, &mut marbles, &params, Clock::default(), &viewport).unwrap();
        assert_eq!(lines[0].hits, 0);
        assert_eq!(marbles[0].pos, DVec2::new(0.0, -0.5));
    }

    #[test]
    fn test_gated_curve_is_skipped() {
        let (mut lines, params) = setup(&["0"], drop_params());
        lines[0].graph_if.set_source("x > 1");
        registry::rebuild(&mut lines, &LineDefaults::default());
        let mut marbles = vec![falling_marble()];
        step(&mut lines, &mut marbles, &params, Clock::default(), &Viewport::default()).unwrap();
        assert_eq!(lines[0].hits, 0);
    }

    #[test]
    fn test_first_matching_curve_wins() {
        let (mut lines, params) = setup(&["0.2", "-0.2"], drop_params());
        let mut marbles = vec![falling_marble()];
        step(&mut lines, &mut marbles, &params, Clock::default(), &Viewport::default()).unwrap();
        assert_eq!(lines[0].hits, 1);
        assert_eq!(lines[1].hits, 0);
    }

    #[test]
    fn test_bounce_coefficient_scales_velocity() {
        let (mut lines, _) = setup(&["0"], drop_params());
        lines[0].bounce.set_source("0.5");
        let (namespace, _) = registry::rebuild(&mut lines, &LineDefaults::default());
        let params = ParamFormulas::compile(&drop_params(), &namespace).unwrap();
        let mut marbles = vec![falling_marble()];
        step(&mut lines, &mut marbles, &params, Clock::default(), &Viewport::default()).unwrap();
        assert!((marbles[0].vel.y - 0.5).abs() < 1e-9);
    }

    #[test]
    fn test_moving_curve_carries_marble() {
        // Curve rises by 0.25 between the previous and current time
        let (mut lines, params) = setup(&["t"], drop_params());
        let clock = Clock {
            time: 0.25,
            prev_time: 0.0,
        };
        let mut marbles = vec![falling_marble()];
        step(&mut lines, &mut marbles, &params, clock, &Viewport::default()).unwrap();
        assert_eq!(lines[0].hits, 1);
        assert!((marbles[0].pos.y - 0.25).abs() < 1e-9);
    }

    #[test]
    fn test_fatal_error_stops_pass() {
        let params = Params {
            force_y: "x > 0".to_string(),
            ..drop_params()
        };
        let (mut lines, params) = setup(&[], params);
        let mut marbles = vec![falling_marble()];
        let err = step(&mut lines, &mut marbles, &params, Clock::default(), &Viewport::default()).unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_local_error_falls_back() {
        let params = Params {
            force_y: "sqrt(x > 0)".to_string(),
            update_rate: "1".to_string(),
            ..drop_params()
        };
        let (mut lines, params) = setup(&[], params);
        let mut marbles = vec![falling_marble()];
        let report = step(&mut lines, &mut marbles, &params, Clock::default(), &Viewport::default()).unwrap();
        assert!(report.local_error.is_some());
        assert_eq!(marbles[0].pos, DVec2::new(0.0, 0.0));
    }
}
