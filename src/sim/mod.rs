//! Simulation module
//!
//! Curves, marbles and the physics that connects them. Everything except
//! `runner` is single-threaded and deterministic:
//! - Fixed order: marbles and curves in list order
//! - Seeded RNG only (marble colors)
//! - No rendering or file dependencies

pub mod collision;
pub mod line;
pub mod marble;
pub mod params;
pub mod registry;
pub mod runner;
pub mod snapshot;
pub mod state;
pub mod step;

pub use collision::{CollisionResult, CurveSamples, crosses, intersection, reflect_velocity};
pub use line::{Line, LineField};
pub use marble::{Marble, Tracking};
pub use params::{ParamFormulas, Params, TrackingConfig};
pub use registry::{LINE_NAMES, Namespace, line_name};
pub use runner::Simulation;
pub use snapshot::{CurvePath, MarbleView, Snapshot, sample_curves};
pub use state::Graph;
pub use step::{Clock, StepReport, step};
