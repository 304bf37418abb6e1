use crate::disease::distribution::Distribution;
use crate::disease::factor::FactorOperation;
use crate::prelude::{Real, StateIndex};
use serde::{Deserialize, Serialize};

/// JSON form of a progression, with states referenced by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressionDef {
    pub id: String,
    #[serde(default)]
    pub annotation: Option<String>,
    pub entry_state: String,
    pub exit_state: String,
    pub probability: Real,
    pub dwell_time: Distribution,
    #[serde(default)]
    pub susceptibility_factor_operation: Option<FactorOperation>,
    #[serde(default)]
    pub infectivity_factor_operation: Option<FactorOperation>,
}

/// A progression with state references resolved to indices. After entering
/// `entry_state` a node draws one outgoing progression by normalized
/// probability and dwells for a sampled number of ticks before transitioning
/// to `exit_state`.
#[derive(Debug, Clone, PartialEq)]
pub struct Progression {
    pub id: String,
    pub annotation: Option<String>,
    pub entry_state: StateIndex,
    pub exit_state: StateIndex,
    pub probability: Real,
    pub dwell_time: Distribution,
    pub susceptibility_factor_operation: Option<FactorOperation>,
    pub infectivity_factor_operation: Option<FactorOperation>,
}
