//! Published frame: what a renderer may read between ticks

use glam::DVec2;

use super::line::Line;
use crate::Color;
use crate::expr::{EvalContext, EvalError};
use crate::settings::Viewport;

#[derive(Debug, Clone, PartialEq)]
pub struct MarbleView {
    pub pos: DVec2,
    pub color: Color,
    /// Tracking trail, newest first
    pub trail: Vec<DVec2>,
}

/// Sampled drawing path of one line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurvePath {
    pub color: Color,
    pub hit_color: Color,
    pub hits: u64,
    /// Connected runs of points; gaps where the curve leaves its bounds
    pub segments: Vec<Vec<DVec2>>,
}

impl CurvePath {
    /// Color to draw with: the hit color once the line has been hit
    pub fn display_color(&self) -> Color {
        if self.hits > 0 { self.hit_color } else { self.color }
    }

    pub fn point_count(&self) -> usize {
        self.segments.iter().map(Vec::len).sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Snapshot {
    pub marbles: Vec<MarbleView>,
    pub curves: Vec<CurvePath>,
    pub selected: Option<usize>,
    pub step: u64,
    pub time: f64,
    pub running: bool,
    /// Fatal error that halted the run, if any
    pub error: Option<String>,
    pub status: String,
}

/// Most points sampled per line in one frame
pub const MAX_CURVE_SAMPLES: usize = 10_000;

/// Sample every line across the viewport's x-range.
///
/// Sampling stops at the first fatal error; lines not reached keep empty
/// paths and the error is returned alongside.
pub fn sample_curves(
    lines: &[Line],
    viewport: &Viewport,
    increment: f64,
    time: f64,
) -> (Vec<CurvePath>, Option<EvalError>) {
    let ctx = EvalContext::new(&lines, time);
    let mut paths: Vec<CurvePath> = lines
        .iter()
        .map(|line| CurvePath {
            color: line.color,
            hit_color: line.hit_color,
            hits: line.hits,
            segments: Vec::new(),
        })
        .collect();

    let width = viewport.width();
    if increment.is_nan() || increment <= 0.0 || !width.is_finite() || width <= 0.0 {
        return (paths, None);
    }
    // Too fine an increment is widened so a frame stays bounded
    let steps = width / increment;
    let (increment, count) = if steps >= (MAX_CURVE_SAMPLES - 1) as f64 {
        (width / (MAX_CURVE_SAMPLES - 1) as f64, MAX_CURVE_SAMPLES)
    } else {
        (increment, steps.floor() as usize + 1)
    };

    for (line, path) in lines.iter().zip(paths.iter_mut()) {
        if !line.is_ready() {
            continue;
        }
        match sample_line(line, &ctx, viewport.min_x, increment, count, time) {
            Ok(segments) => path.segments = segments,
            Err(e) => {
                log::error!("Curve sampling stopped: {e}");
                return (paths, Some(e));
            }
        }
    }
    // Local call failures already became 0 in the samples
    ctx.take_local_error();
    (paths, None)
}

fn sample_line(
    line: &Line,
    ctx: &EvalContext<'_>,
    min_x: f64,
    increment: f64,
    count: usize,
    t: f64,
) -> Result<Vec<Vec<DVec2>>, EvalError> {
    let mut segments = Vec::new();
    let mut current = Vec::new();

    for i in 0..count {
        let x = min_x + i as f64 * increment;
        let point = match line.y_at(ctx, x, t) {
            Ok(y) if y.is_finite() && line.contains(ctx, x, y, t).unwrap_or(false) => Some(y),
            Ok(_) => None,
            Err(e) if e.is_fatal() => return Err(e),
            Err(_) => None,
        };
        match point {
            Some(y) => current.push(DVec2::new(x, y)),
            None if !current.is_empty() => segments.push(std::mem::take(&mut current)),
            None => {}
        }
    }
    if !current.is_empty() {
        segments.push(current);
    }
    Ok(segments)
}
