//! Simulation loop
//!
//! States: Idle → Running → Idle (stop or fatal error). The graph is shared
//! with a background thread that ticks at [`TICK_HZ`]; every other caller
//! reaches it through [`Simulation`].

use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, select};
use parking_lot::{Mutex, MutexGuard};

use super::line::LineField;
use super::params::Params;
use super::snapshot::Snapshot;
use super::state::Graph;
use crate::consts::TICK_HZ;
use crate::error::{Error, Result};
use crate::persistence::{self, GraphDefinition};
use crate::settings::Settings;

/// Room for formulas nested to the parser limit calling curves to the
/// evaluator's depth limit
const WORKER_STACK: usize = 32 * 1024 * 1024;

struct Worker {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

pub struct Simulation {
    graph: Arc<Mutex<Graph>>,
    worker: Option<Worker>,
}

impl Simulation {
    pub fn new(settings: Settings) -> Self {
        Self::with_graph(Graph::new(settings))
    }

    pub fn with_graph(graph: Graph) -> Self {
        Self {
            graph: Arc::new(Mutex::new(graph)),
            worker: None,
        }
    }

    /// Lock the graph. Hold the guard briefly while running.
    pub fn graph(&self) -> MutexGuard<'_, Graph> {
        self.graph.lock()
    }

    pub fn is_running(&self) -> bool {
        self.graph.lock().is_running()
    }

    /// Copy of the last published frame
    pub fn snapshot(&self) -> Snapshot {
        self.graph.lock().snapshot().clone()
    }

    /// Start ticking. No-op while already running; fails if the parameters
    /// didn't compile or a fatal error is waiting for a rebuild.
    pub fn run(&mut self) -> Result<()> {
        if self.is_running() {
            return Ok(());
        }
        // A loop that ended on its own still needs joining
        self.join_worker();

        self.graph.lock().begin_run()?;

        let (stop_tx, stop_rx) = crossbeam_channel::bounded(1);
        let graph = Arc::clone(&self.graph);
        let spawned = thread::Builder::new()
            .name("marble-graph-sim".to_string())
            .stack_size(WORKER_STACK)
            .spawn(move || run_loop(&graph, &stop_rx));

        match spawned {
            Ok(handle) => {
                self.worker = Some(Worker {
                    stop: stop_tx,
                    handle,
                });
                log::info!("Simulation running");
                Ok(())
            }
            Err(e) => {
                self.graph.lock().end_run();
                Err(e.into())
            }
        }
    }

    /// Ask the loop to stop and wait for the tick in progress to finish
    pub fn stop(&mut self) {
        if self.join_worker() {
            log::info!("Simulation stopped");
        }
        self.graph.lock().end_run();
    }

    fn join_worker(&mut self) -> bool {
        let Some(worker) = self.worker.take() else {
            return false;
        };
        // The loop may already be gone after a fatal error
        worker.stop.send(()).ok();
        if worker.handle.join().is_err() {
            log::error!("Simulation thread panicked");
        }
        true
    }

    /// One physics pass while idle
    pub fn step(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::Busy);
        }
        self.join_worker();
        self.graph.lock().single_step().map(|_| ())
    }

    /// Stop, recompile everything and reset. Auto-saves on success.
    pub fn rebuild(&mut self) -> Result<()> {
        self.edit(Graph::rebuild)
    }

    pub fn add_line(&mut self, formula: &str) -> Result<usize> {
        self.edit(|g| g.add_line(formula))
    }

    pub fn remove_line(&mut self, index: usize) -> Result<()> {
        self.edit(|g| g.remove_line(index).map(|_| ()))
    }

    pub fn edit_line(&mut self, index: usize, field: LineField, text: &str) -> Result<()> {
        self.edit(|g| g.edit_line(index, field, text))
    }

    pub fn set_params(&mut self, params: Params) -> Result<()> {
        self.edit(|g| g.set_params(params))
    }

    /// Replace the graph with the one saved at `path`. A failed read leaves
    /// the current graph untouched.
    pub fn load_graph(&mut self, path: &Path) -> Result<()> {
        let definition = persistence::load(path).inspect_err(|e| self.report_failure("Load", e))?;
        self.load_definition(&definition)
    }

    pub fn load_definition(&mut self, definition: &GraphDefinition) -> Result<()> {
        self.edit(|g| g.load_definition(definition))
    }

    pub fn save_graph(&self, path: &Path) -> Result<()> {
        let definition = self.graph.lock().definition();
        let result = persistence::save(path, &definition);
        match &result {
            Ok(()) => self.graph.lock().set_status(format!("Saved {}", path.display())),
            Err(e) => self.report_failure("Save", e),
        }
        result
    }

    pub fn select_next_marble(&self) -> Option<usize> {
        self.graph.lock().select_next_marble()
    }

    pub fn selected_marble(&self) -> Option<usize> {
        self.graph.lock().selected_marble()
    }

    /// Stop, apply an edit that rebuilds, then auto-save if it succeeded
    fn edit<T>(&mut self, apply: impl FnOnce(&mut Graph) -> Result<T>) -> Result<T> {
        self.stop();
        let result = apply(&mut self.graph.lock());
        if result.is_ok() {
            self.autosave();
        }
        result
    }

    fn autosave(&self) {
        let (enabled, definition) = {
            let graph = self.graph.lock();
            (graph.settings.autosave, graph.definition())
        };
        if enabled && let Err(e) = persistence::autosave(&definition) {
            self.report_failure("Auto-save", &e);
        }
    }

    fn report_failure(&self, action: &str, err: &Error) {
        log::warn!("{action} failed: {err}");
        self.graph.lock().set_status(format!("{action} failed: {err}"));
    }
}

impl Drop for Simulation {
    fn drop(&mut self) {
        self.join_worker();
    }
}

fn run_loop(graph: &Mutex<Graph>, stop: &Receiver<()>) {
    let ticker = crossbeam_channel::tick(Duration::from_secs_f64(1.0 / TICK_HZ));
    loop {
        select! {
            recv(stop) -> _ => break,
            recv(ticker) -> _ => {
                if !tick(graph) {
                    break;
                }
            }
        }
    }
}

/// One loop tick: `frames_per_tick - 1` silent passes, then a published one.
/// Returns false once the run has ended.
pub(crate) fn tick(graph: &Mutex<Graph>) -> bool {
    let passes = {
        let mut g = graph.lock();
        if !g.begin_tick() {
            return false;
        }
        g.frames_per_tick()
    };

    for _ in 1..passes {
        let mut g = graph.lock();
        if g.physics_pass().is_err() || g.advance_time().is_err() {
            return false;
        }
    }

    let mut g = graph.lock();
    if g.physics_pass().is_err() {
        return false;
    }
    g.publish();
    g.advance_time().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::LineDefinition;

    fn settings() -> Settings {
        Settings {
            autosave: false,
            ..Default::default()
        }
    }

    fn definition() -> GraphDefinition {
        GraphDefinition {
            lines: vec![LineDefinition::with_formula("-5")],
            params: Params {
                marble_count: 3,
                frames_per_tick: 3,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_tick_runs_all_passes() {
        let graph = Mutex::new(Graph::from_definition(&definition(), settings()));
        graph.lock().begin_run().unwrap();
        assert!(tick(&graph));

        let g = graph.lock();
        assert_eq!(g.step_count(), 1);
        // Three passes, each followed by a 0.01 time step
        assert!((g.clock().time - 0.03).abs() < 1e-12);
        assert!((g.snapshot().time - 0.02).abs() < 1e-12);
        assert_eq!(g.snapshot().step, 1);
    }

    #[test]
    fn test_tick_stops_on_fatal_error() {
        let mut definition = definition();
        definition.params.update_rate = "x == 0".to_string();
        let graph = Mutex::new(Graph::from_definition(&definition, settings()));
        graph.lock().begin_run().unwrap();

        assert!(!tick(&graph));
        let g = graph.lock();
        assert!(!g.is_running());
        assert!(g.snapshot().error.is_some());
        drop(g);
        assert!(!tick(&graph));
    }

    #[test]
    fn test_step_while_idle() {
        let mut sim = Simulation::with_graph(Graph::from_definition(&definition(), settings()));
        sim.step().unwrap();
        assert_eq!(sim.graph().step_count(), 1);
        assert!(!sim.is_running());
    }

    #[test]
    fn test_run_refuses_uncompiled_params() {
        let mut definition = definition();
        definition.params.spawn_x = "(".to_string();
        let mut sim = Simulation::with_graph(Graph::from_definition(&definition, settings()));
        assert!(sim.run().is_err());
        assert!(!sim.is_running());
    }
}
