use crate::disease::factor::FactorOperation;
use crate::prelude::{Real, StateIndex};
use serde::{Deserialize, Serialize};

/// JSON form of a transmission, with states referenced by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransmissionDef {
    pub id: String,
    #[serde(default)]
    pub annotation: Option<String>,
    pub entry_state: String,
    pub exit_state: String,
    pub contact_state: String,
    pub transmissibility: Real,
    #[serde(default)]
    pub susceptibility_factor_operation: Option<FactorOperation>,
    #[serde(default)]
    pub infectivity_factor_operation: Option<FactorOperation>,
}

/// A transmission with state references resolved to indices. A susceptible
/// in `entry_state` exposed to a contact in `contact_state` over an active
/// edge becomes `exit_state`.
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    pub id: String,
    pub annotation: Option<String>,
    pub entry_state: StateIndex,
    pub exit_state: StateIndex,
    pub contact_state: StateIndex,
    pub transmissibility: Real,
    pub susceptibility_factor_operation: Option<FactorOperation>,
    pub infectivity_factor_operation: Option<FactorOperation>,
}
