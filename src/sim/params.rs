//! Simulation parameters
//!
//! The parameter block is stored as formula text (what gets saved) and
//! compiled into [`ParamFormulas`] on every rebuild.

use serde::{Deserialize, Serialize};

use crate::expr::{CompileError, EvalContext, EvalError, Expression, FunctionTable};

/// Marble trail sampling
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    pub enabled: bool,
    /// Steps between trail samples
    pub accuracy: u32,
    /// Trail points kept per marble
    pub frame_window: u32,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            accuracy: 4,
            frame_window: 60,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Params {
    pub marble_count: usize,
    /// Spawn position, functions of the spawn index `n`
    pub spawn_x: String,
    pub spawn_y: String,
    /// Initial velocity, functions of the spawn position
    pub velocity_x: String,
    pub velocity_y: String,
    /// Per-step force, functions of the current position
    pub force_x: String,
    pub force_y: String,
    /// Position advance per unit of velocity
    pub update_rate: String,
    /// Simulated time added per pass
    pub time_step: String,
    /// Physics passes per published tick
    pub frames_per_tick: u32,
    pub tracking: TrackingConfig,
}

impl Default for Params {
    fn default() -> Self {
        Self {
            marble_count: 10,
            spawn_x: "n - 4.5".to_string(),
            spawn_y: "9".to_string(),
            velocity_x: "0".to_string(),
            velocity_y: "0".to_string(),
            force_x: "0".to_string(),
            force_y: "-0.001".to_string(),
            update_rate: "0.1".to_string(),
            time_step: "0.01".to_string(),
            frames_per_tick: 4,
            tracking: TrackingConfig::default(),
        }
    }
}

/// Compiled parameter formulas
#[derive(Debug, Clone, Default)]
pub struct ParamFormulas {
    pub spawn_x: Expression,
    pub spawn_y: Expression,
    pub velocity_x: Expression,
    pub velocity_y: Expression,
    pub force_x: Expression,
    pub force_y: Expression,
    pub update_rate: Expression,
    pub time_step: Expression,
}

impl ParamFormulas {
    /// Compile every formula; all of them must succeed before a run
    pub fn compile(params: &Params, functions: &dyn FunctionTable) -> Result<Self, CompileError> {
        let build = |text: &str| -> Result<Expression, CompileError> {
            let mut expr = Expression::new(text);
            expr.compile(functions)?;
            Ok(expr)
        };
        Ok(Self {
            spawn_x: build(&params.spawn_x)?,
            spawn_y: build(&params.spawn_y)?,
            velocity_x: build(&params.velocity_x)?,
            velocity_y: build(&params.velocity_y)?,
            force_x: build(&params.force_x)?,
            force_y: build(&params.force_y)?,
            update_rate: build(&params.update_rate)?,
            time_step: build(&params.time_step)?,
        })
    }

    pub fn is_compiled(&self) -> bool {
        [
            &self.spawn_x,
            &self.spawn_y,
            &self.velocity_x,
            &self.velocity_y,
            &self.force_x,
            &self.force_y,
            &self.update_rate,
            &self.time_step,
        ]
        .iter()
        .all(|e| e.is_compiled())
    }

    /// Spawn position of marble `n`
    pub fn spawn_position(&mut self, ctx: &EvalContext<'_>, n: usize) -> Result<(f64, f64), EvalError> {
        let t = ctx.time();
        self.spawn_x.set_param("n", n as f64);
        self.spawn_y.set_param("n", n as f64);
        let x = self.spawn_x.evaluate(ctx, 0.0, t, 0.0)?;
        let y = self.spawn_y.evaluate(ctx, 0.0, t, 0.0)?;
        Ok((x, y))
    }

    /// Initial velocity for a marble spawned at `(x, y)`
    pub fn initial_velocity(&self, ctx: &EvalContext<'_>, x: f64, y: f64) -> Result<(f64, f64), EvalError> {
        let t = ctx.time();
        Ok((
            self.velocity_x.evaluate_with_y(ctx, x, t, 0.0, y)?,
            self.velocity_y.evaluate_with_y(ctx, x, t, 0.0, y)?,
        ))
    }

    pub fn force(&self, ctx: &EvalContext<'_>, x: f64, y: f64) -> Result<(f64, f64), EvalError> {
        let t = ctx.time();
        Ok((
            self.force_x.evaluate_with_y(ctx, x, t, 0.0, y)?,
            self.force_y.evaluate_with_y(ctx, x, t, 0.0, y)?,
        ))
    }

    pub fn rate(&self, ctx: &EvalContext<'_>, x: f64, y: f64) -> Result<f64, EvalError> {
        self.update_rate.evaluate_with_y(ctx, x, ctx.time(), 0.0, y)
    }

    pub fn time_step(&self, ctx: &EvalContext<'_>) -> Result<f64, EvalError> {
        self.time_step.evaluate(ctx, 0.0, ctx.time(), 0.0)
    }
}
