//! Graph state: the simulation context
//!
//! Lines, parameters, the function namespace, marbles and the run
//! bookkeeping all live in one [`Graph`]. Nothing in here does I/O.

use glam::DVec2;
use rand::SeedableRng;
use rand_pcg::Pcg32;

use super::line::{Line, LineField};
use super::marble::Marble;
use super::params::{ParamFormulas, Params};
use super::registry::{self, Namespace};
use super::snapshot::{MarbleView, Snapshot, sample_curves};
use super::step::{self, Clock, StepReport, settle};
use crate::Color;
use crate::error::{Error, Result};
use crate::expr::{CompileError, EvalContext, EvalError, expand_readability};
use crate::persistence::GraphDefinition;
use crate::settings::Settings;

pub struct Graph {
    pub settings: Settings,
    lines: Vec<Line>,
    params: Params,
    formulas: ParamFormulas,
    /// Set when the parameter block failed to compile; blocks running
    params_error: Option<CompileError>,
    namespace: Namespace,
    marbles: Vec<Marble>,
    clock: Clock,
    /// Ticks since the run started
    step: u64,
    running: bool,
    selected: Option<usize>,
    /// Fatal error of the current run
    error: Option<EvalError>,
    status: String,
    published: Snapshot,
    rng: Pcg32,
}

impl Graph {
    /// An empty graph (no lines, default parameters), already built
    pub fn new(settings: Settings) -> Self {
        let definition = GraphDefinition {
            lines: Vec::new(),
            ..Default::default()
        };
        Self::from_definition(&definition, settings)
    }

    /// Build from a saved definition. Compile failures are reported in
    /// [`Graph::status`].
    pub fn from_definition(definition: &GraphDefinition, settings: Settings) -> Self {
        let rng = Pcg32::seed_from_u64(settings.color_seed);
        let mut graph = Self {
            settings,
            lines: Vec::new(),
            params: definition.params.clone(),
            formulas: ParamFormulas::default(),
            params_error: None,
            namespace: Namespace::builtins(),
            marbles: Vec::new(),
            clock: Clock::default(),
            step: 0,
            running: false,
            selected: None,
            error: None,
            status: String::new(),
            published: Snapshot::default(),
            rng,
        };
        graph.lines = definition.lines.iter().map(Line::from_definition).collect();
        // Failures are kept in the status line
        graph.rebuild().ok();
        graph
    }

    /// Saved form of the current graph
    pub fn definition(&self) -> GraphDefinition {
        GraphDefinition {
            lines: self.lines.iter().map(Line::to_definition).collect(),
            params: self.params.clone(),
        }
    }

    /// Replace lines and parameters wholesale, then rebuild
    pub fn load_definition(&mut self, definition: &GraphDefinition) -> Result<()> {
        self.lines = definition.lines.iter().map(Line::from_definition).collect();
        self.params = definition.params.clone();
        self.rebuild()
    }

    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    pub fn namespace(&self) -> &Namespace {
        &self.namespace
    }

    pub fn marbles(&self) -> &[Marble] {
        &self.marbles
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn step_count(&self) -> u64 {
        self.step
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn error(&self) -> Option<&EvalError> {
        self.error.as_ref()
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    /// Replace the status line, in the published frame as well
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.status = status.into();
        self.published.status = self.status.clone();
    }

    pub fn selected_marble(&self) -> Option<usize> {
        self.selected
    }

    /// Last published frame
    pub fn snapshot(&self) -> &Snapshot {
        &self.published
    }

    // --- Editing ---

    /// Append a line and rebuild; returns its index
    pub fn add_line(&mut self, formula: &str) -> Result<usize> {
        let mut line = Line::new(expand_readability(formula));
        line.color = Color::random(&mut self.rng);
        self.lines.push(line);
        let index = self.lines.len() - 1;
        self.rebuild().map(|_| index)
    }

    pub fn remove_line(&mut self, index: usize) -> Result<Line> {
        if index >= self.lines.len() {
            return Err(Error::NoSuchLine(index));
        }
        let line = self.lines.remove(index);
        self.rebuild()?;
        Ok(line)
    }

    /// Replace one formula field of a line and rebuild
    pub fn edit_line(&mut self, index: usize, field: LineField, text: &str) -> Result<()> {
        let line = self.lines.get_mut(index).ok_or(Error::NoSuchLine(index))?;
        line.field_mut(field).set_source(expand_readability(text));
        self.rebuild()
    }

    pub fn set_line_colors(&mut self, index: usize, color: Color, hit_color: Color) -> Result<()> {
        let line = self.lines.get_mut(index).ok_or(Error::NoSuchLine(index))?;
        line.color = color;
        line.hit_color = hit_color;
        Ok(())
    }

    pub fn set_params(&mut self, params: Params) -> Result<()> {
        self.params = params;
        self.rebuild()
    }

    // --- Build ---

    /// Recompile lines and parameters, recreate marbles and reset the run.
    ///
    /// Everything that compiles is kept; the first compile error is returned.
    pub fn rebuild(&mut self) -> Result<()> {
        let (namespace, line_errors) = registry::rebuild(&mut self.lines, &self.settings.line_defaults);
        self.namespace = namespace;

        self.clock = Clock::default();
        self.step = 0;
        self.running = false;
        self.error = None;
        self.selected = None;
        self.marbles.clear();

        let mut result = match line_errors.into_iter().next() {
            Some((index, e)) => {
                self.status = format!("Line {}: {e}", index + 1);
                Err(Error::Compile(e))
            }
            None => {
                self.status = format!("Compiled {} lines", self.lines.len());
                Ok(())
            }
        };

        match ParamFormulas::compile(&self.params, &self.namespace) {
            Ok(formulas) => {
                self.formulas = formulas;
                self.params_error = None;
                if let Err(e) = self.spawn_marbles() {
                    self.status = format!("Error: {e}");
                    self.error = Some(e.clone());
                    result = result.and(Err(Error::Eval(e)));
                }
            }
            Err(e) => {
                log::warn!("Parameters: {e}");
                self.status = format!("Parameters: {e}");
                self.formulas = ParamFormulas::default();
                self.params_error = Some(e.clone());
                result = result.and(Err(Error::Compile(e)));
            }
        }

        log::info!(
            "Rebuilt graph: {} lines, {} marbles",
            self.lines.len(),
            self.marbles.len()
        );
        self.publish();
        result
    }

    fn spawn_marbles(&mut self) -> std::result::Result<(), EvalError> {
        self.rng = Pcg32::seed_from_u64(self.settings.color_seed);
        let curves: &[Line] = &self.lines;
        let ctx = EvalContext::new(&curves, self.clock.time);
        let mut local = None;

        for n in 0..self.params.marble_count {
            let (x, y) = settle(self.formulas.spawn_position(&ctx, n), (0.0, 0.0), &mut local)?;
            let (vx, vy) = settle(self.formulas.initial_velocity(&ctx, x, y), (0.0, 0.0), &mut local)?;
            let mut marble = Marble::new(DVec2::new(x, y), DVec2::new(vx, vy), Color::random(&mut self.rng));
            if self.params.tracking.enabled {
                marble.start_tracking(self.step);
            }
            self.marbles.push(marble);
        }
        Ok(())
    }

    /// Parameters compiled and no fatal error recorded
    pub fn check_runnable(&self) -> Result<()> {
        if let Some(e) = &self.params_error {
            return Err(Error::Compile(e.clone()));
        }
        if let Some(e) = &self.error {
            return Err(Error::Eval(e.clone()));
        }
        Ok(())
    }

    // --- Running ---

    pub(crate) fn begin_run(&mut self) -> Result<()> {
        self.check_runnable()?;
        self.step = 0;
        self.running = true;
        self.status = "Running".to_string();
        Ok(())
    }

    pub(crate) fn end_run(&mut self) {
        if self.running {
            self.running = false;
            self.status = "Stopped".to_string();
            self.publish();
        }
    }

    /// Start a tick: bump the counter and report whether to go on
    pub(crate) fn begin_tick(&mut self) -> bool {
        self.step += 1;
        if self.error.is_some() {
            self.running = false;
            return false;
        }
        true
    }

    /// Physics passes per tick
    pub fn frames_per_tick(&self) -> u32 {
        self.params.frames_per_tick.max(1)
    }

    /// One physics pass over all marbles. A fatal error halts the run.
    pub fn physics_pass(&mut self) -> std::result::Result<StepReport, EvalError> {
        let result = step::step(
            &mut self.lines,
            &mut self.marbles,
            &self.formulas,
            self.clock,
            &self.settings.viewport,
        );
        match result {
            Ok(report) => {
                for marble in &mut self.marbles {
                    marble.record_trail(&self.params.tracking);
                }
                Ok(report)
            }
            Err(e) => {
                self.halt(e.clone());
                self.publish();
                Err(e)
            }
        }
    }

    /// `prev_time = time`, `time += time_step`
    pub fn advance_time(&mut self) -> std::result::Result<(), EvalError> {
        let dt = {
            let curves: &[Line] = &self.lines;
            let ctx = EvalContext::new(&curves, self.clock.time);
            settle(self.formulas.time_step(&ctx), 0.0, &mut None)
        };
        match dt {
            Ok(dt) => {
                self.clock.prev_time = self.clock.time;
                self.clock.time += dt;
                Ok(())
            }
            Err(e) => {
                self.halt(e.clone());
                Err(e)
            }
        }
    }

    /// The one-shot Step: a single pass, published, outside of a run
    pub fn single_step(&mut self) -> Result<StepReport> {
        if self.running {
            return Err(Error::Busy);
        }
        self.check_runnable()?;
        self.step += 1;
        let report = self.physics_pass()?;
        self.publish();
        self.advance_time()?;
        Ok(report)
    }

    fn halt(&mut self, err: EvalError) {
        log::error!("Simulation halted: {err}");
        self.status = format!("Error: {err}");
        self.error = Some(err);
        self.running = false;
    }

    /// Refresh the published snapshot from the current state
    pub fn publish(&mut self) {
        let (curves, fatal) = sample_curves(
            &self.lines,
            &self.settings.viewport,
            self.settings.sample_increment,
            self.clock.time,
        );
        if let Some(e) = fatal
            && self.error.is_none()
        {
            self.halt(e);
        }

        self.published = Snapshot {
            marbles: self
                .marbles
                .iter()
                .map(|m| MarbleView {
                    pos: m.pos,
                    color: m.color,
                    trail: m.trail.clone(),
                })
                .collect(),
            curves,
            selected: self.selected,
            step: self.step,
            time: self.clock.time,
            running: self.running,
            error: self.error.as_ref().map(ToString::to_string),
            status: self.status.clone(),
        };
    }

    // --- Selection ---

    /// Advance the selection to the next marble inside the viewport,
    /// wrapping around. Unchanged when no marble is in bounds.
    pub fn select_next_marble(&mut self) -> Option<usize> {
        let count = self.marbles.len();
        let start = self.selected.map_or(0, |i| i + 1);
        for offset in 0..count {
            let index = (start + offset) % count;
            if self.settings.viewport.contains(self.marbles[index].pos) {
                self.selected = Some(index);
                break;
            }
        }
        self.published.selected = self.selected;
        self.selected
    }

    /// Turn trail tracking on or off for one marble
    pub fn set_tracking(&mut self, index: usize, enabled: bool) -> bool {
        let step = self.step;
        match self.marbles.get_mut(index) {
            Some(marble) if enabled => {
                marble.start_tracking(step);
                true
            }
            Some(marble) => {
                marble.stop_tracking();
                true
            }
            None => false,
        }
    }

    #[cfg(test)]
    pub(crate) fn marbles_mut(&mut self) -> &mut Vec<Marble> {
        &mut self.marbles
    }
}
