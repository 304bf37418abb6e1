mod config;
mod simulation;
mod status;

pub use config::{DumpActiveNetworkDef, ModelScenario, ReseedDef, RunConfig, TraitsDoc};
pub use simulation::Simulation;
pub use status::{preferred_path, Status, StatusKind};
