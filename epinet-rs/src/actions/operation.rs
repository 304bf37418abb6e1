use crate::changes::Changes;
use crate::disease::{DiseaseModel, Distribution, FactorOperation, StateCounts};
use crate::error::{Error, Result};
use crate::network::Network;
use crate::prelude::{NodeId, Real, StateIndex, Tick};
use crate::traits::TraitValue;
use crate::values::Operator;
use crate::variables::VariableList;
use serde::{Deserialize, Serialize};

/// Output metadata attached to a health-state change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub contact: Option<NodeId>,
    pub location_id: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FactorTarget {
    Susceptibility,
    Infectivity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeNumericTarget {
    Weight,
    Duration,
}

/// A single typed mutation of node, edge or variable state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    SetNodeState {
        node: NodeId,
        state: StateIndex,
        metadata: Metadata,
    },
    NodeFactor {
        node: NodeId,
        target: FactorTarget,
        operator: Operator,
        value: Real,
    },
    SetNodeTrait {
        node: NodeId,
        value: TraitValue,
    },
    SetEdgeActive {
        edge: usize,
        active: bool,
    },
    EdgeNumeric {
        edge: usize,
        target: EdgeNumericTarget,
        operator: Operator,
        value: Real,
    },
    Variable {
        index: usize,
        operator: Operator,
        value: Real,
    },
    /// Edit a health state's baseline susceptibility or infectivity. Nodes
    /// pick the new baseline up on their next state change.
    HealthStateProperty {
        state: StateIndex,
        property: FactorTarget,
        operator: Operator,
        value: Real,
    },
    /// Edit a transmission's base transmissibility.
    TransmissionProperty {
        transmission: usize,
        operator: Operator,
        value: Real,
    },
    /// Install or clear a transmission's factor operation.
    TransmissionFactorOperation {
        transmission: usize,
        which: FactorTarget,
        operation: Option<FactorOperation>,
    },
    /// Edit a progression's propensity.
    ProgressionPropensity {
        progression: usize,
        operator: Operator,
        value: Real,
    },
    /// Replace a progression's dwell-time distribution.
    ProgressionDwellTime {
        progression: usize,
        dwell_time: Distribution,
    },
    /// Install or clear a progression's factor operation.
    ProgressionFactorOperation {
        progression: usize,
        which: FactorTarget,
        operation: Option<FactorOperation>,
    },
}

impl Operation {
    /// The node this operation must be executed on, if it targets one.
    pub fn target_node(&self) -> Option<NodeId> {
        match self {
            Operation::SetNodeState { node, .. }
            | Operation::NodeFactor { node, .. }
            | Operation::SetNodeTrait { node, .. } => Some(*node),
            _ => None,
        }
    }
}

/// A health-state transition that was actually applied; the driver schedules
/// the node's next progression from it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StateChangeEvent {
    pub node: NodeId,
    pub state: StateIndex,
}

/// Everything an operation may mutate, for one partition.
pub struct ExecContext<'a> {
    pub rank: usize,
    pub tick: Tick,
    pub model: &'a mut DiseaseModel,
    pub network: &'a mut Network,
    pub variables: &'a mut VariableList,
    pub counts: &'a mut StateCounts,
    pub changes: &'a mut Changes,
}

impl Operation {
    /// Execute against the owning partition, recording changes. Returns the
    /// applied state transition, if any.
    pub fn execute(&self, ctx: &mut ExecContext) -> Result<Option<StateChangeEvent>> {
        match self {
            Operation::SetNodeState { node, state, metadata } => {
                let susceptibility = ctx.model.state(*state).susceptibility;
                let infectivity = ctx.model.state(*state).infectivity;
                let data = ctx
                    .network
                    .lookup_node_mut(*node)
                    .ok_or_else(|| Error::runtime(format!("unknown node {}", node)))?;
                let old = data.state;
                if old == *state {
                    return Ok(None);
                }
                data.state = *state;
                data.refresh(susceptibility, infectivity);
                ctx.counts.transition(old, *state);
                ctx.changes.record_state_change(
                    ctx.tick,
                    *node,
                    *state,
                    metadata.contact,
                    metadata.location_id,
                );
                ctx.changes.mark_changed(*node);
                Ok(Some(StateChangeEvent { node: *node, state: *state }))
            }
            Operation::NodeFactor { node, target, operator, value } => {
                let model = &*ctx.model;
                let data = ctx
                    .network
                    .lookup_node_mut(*node)
                    .ok_or_else(|| Error::runtime(format!("unknown node {}", node)))?;
                match target {
                    FactorTarget::Susceptibility => {
                        data.susceptibility_factor =
                            operator.apply(data.susceptibility_factor, *value).max(0.0);
                    }
                    FactorTarget::Infectivity => {
                        data.infectivity_factor =
                            operator.apply(data.infectivity_factor, *value).max(0.0);
                    }
                }
                let state = data.state;
                data.refresh(model.state(state).susceptibility, model.state(state).infectivity);
                ctx.changes.mark_changed(*node);
                Ok(None)
            }
            Operation::SetNodeTrait { node, value } => {
                let data = ctx
                    .network
                    .lookup_node_mut(*node)
                    .ok_or_else(|| Error::runtime(format!("unknown node {}", node)))?;
                data.traits = value.apply(data.traits);
                ctx.changes.mark_changed(*node);
                Ok(None)
            }
            Operation::SetEdgeActive { edge, active } => {
                if *edge >= ctx.network.edges().len() {
                    return Err(Error::runtime(format!("unknown edge index {}", edge)));
                }
                ctx.network.edge_mut(*edge).active = *active;
                Ok(None)
            }
            Operation::EdgeNumeric { edge, target, operator, value } => {
                if *edge >= ctx.network.edges().len() {
                    return Err(Error::runtime(format!("unknown edge index {}", edge)));
                }
                let data = ctx.network.edge_mut(*edge);
                match target {
                    EdgeNumericTarget::Weight => {
                        data.weight = operator.apply(data.weight, *value).max(0.0);
                    }
                    EdgeNumericTarget::Duration => {
                        data.duration = operator.apply(data.duration, *value).max(0.0);
                    }
                }
                Ok(None)
            }
            Operation::Variable { index, operator, value } => {
                ctx.variables.modify(*index, ctx.rank, *operator, *value);
                Ok(None)
            }
            Operation::HealthStateProperty { state, property, operator, value } => {
                let data = ctx.model.state_mut(*state);
                match property {
                    FactorTarget::Susceptibility => {
                        data.susceptibility = operator.apply(data.susceptibility, *value).max(0.0);
                    }
                    FactorTarget::Infectivity => {
                        data.infectivity = operator.apply(data.infectivity, *value).max(0.0);
                    }
                }
                Ok(None)
            }
            Operation::TransmissionProperty { transmission, operator, value } => {
                let data = ctx
                    .model
                    .transmissions_mut()
                    .get_mut(*transmission)
                    .ok_or_else(|| Error::runtime(format!("unknown transmission {}", transmission)))?;
                data.transmissibility = operator.apply(data.transmissibility, *value).max(0.0);
                Ok(None)
            }
            Operation::TransmissionFactorOperation { transmission, which, operation } => {
                let data = ctx
                    .model
                    .transmissions_mut()
                    .get_mut(*transmission)
                    .ok_or_else(|| Error::runtime(format!("unknown transmission {}", transmission)))?;
                match which {
                    FactorTarget::Susceptibility => {
                        data.susceptibility_factor_operation = *operation;
                    }
                    FactorTarget::Infectivity => {
                        data.infectivity_factor_operation = *operation;
                    }
                }
                Ok(None)
            }
            Operation::ProgressionPropensity { progression, operator, value } => {
                let data = ctx
                    .model
                    .progressions_mut()
                    .get_mut(*progression)
                    .ok_or_else(|| Error::runtime(format!("unknown progression {}", progression)))?;
                data.probability = operator.apply(data.probability, *value).max(0.0);
                Ok(None)
            }
            Operation::ProgressionDwellTime { progression, dwell_time } => {
                dwell_time.validate()?;
                let data = ctx
                    .model
                    .progressions_mut()
                    .get_mut(*progression)
                    .ok_or_else(|| Error::runtime(format!("unknown progression {}", progression)))?;
                data.dwell_time = dwell_time.clone();
                Ok(None)
            }
            Operation::ProgressionFactorOperation { progression, which, operation } => {
                let data = ctx
                    .model
                    .progressions_mut()
                    .get_mut(*progression)
                    .ok_or_else(|| Error::runtime(format!("unknown progression {}", progression)))?;
                match which {
                    FactorTarget::Susceptibility => {
                        data.susceptibility_factor_operation = *operation;
                    }
                    FactorTarget::Infectivity => {
                        data.infectivity_factor_operation = *operation;
                    }
                }
                Ok(None)
            }
        }
    }
}
