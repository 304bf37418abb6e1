pub use crate::disease::{DiseaseModel, FactorOperation, HealthState, Progression, Transmission};
pub use crate::error::{Error, Result};
pub use crate::network::{EdgeData, Network, NodeData};
pub use crate::sim::{RunConfig, Simulation};
pub use crate::traits::{Trait, TraitData};
pub use crate::values::{Value, ValueList};

/// One discrete simulation time step. Ticks may be negative: initialization
/// is reported at `startTick - 1`.
pub type Tick = i32;

/// Unique person identifier as it appears in the contact network file.
pub type NodeId = u64;

pub type Real = f64;

/// Index of a health state in the disease model's state table.
pub type StateIndex = usize;
