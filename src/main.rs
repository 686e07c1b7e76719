//! Marble Graph headless runner
//!
//! Usage: `marble-graph [GRAPH.json] [SECONDS]`
//!
//! Loads the given graph (or the auto-save, or the built-in example), runs
//! it in real time and logs where everything ended up.

use std::path::PathBuf;
use std::time::Duration;

use marble_graph::{Settings, Simulation, persistence};

const DEFAULT_RUN: Duration = Duration::from_secs(5);

/// Seconds from the command line; anything unusable runs the default
fn run_length(arg: Option<&str>) -> Duration {
    arg.and_then(|s| s.parse::<f64>().ok())
        .and_then(|s| Duration::try_from_secs_f64(s).ok())
        .unwrap_or(DEFAULT_RUN)
}

fn main() -> marble_graph::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("Marble Graph (native) starting...");

    let mut args = std::env::args().skip(1);
    let path = args.next().map(PathBuf::from);
    let run_for = run_length(args.next().as_deref());

    let definition = match &path {
        Some(path) => persistence::load(path)?,
        None => persistence::load_autosave().unwrap_or_default(),
    };

    let mut sim = Simulation::new(Settings::load());
    if let Err(e) = sim.load_definition(&definition) {
        // Lines that compiled still run
        log::warn!("{e}");
    }
    sim.run()?;
    std::thread::sleep(run_for);
    sim.stop();

    let frame = sim.snapshot();
    log::info!(
        "{} after {} ticks, t = {:.2}",
        frame.status,
        frame.step,
        frame.time
    );
    for (i, curve) in frame.curves.iter().enumerate() {
        log::info!("line {}: {} hits", i + 1, curve.hits);
    }
    for (i, marble) in frame.marbles.iter().enumerate() {
        log::info!("marble {i}: ({:.3}, {:.3})", marble.pos.x, marble.pos.y);
    }
    Ok(())
}
