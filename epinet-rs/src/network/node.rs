use crate::prelude::{NodeId, Real, StateIndex};
use crate::traits::TraitData;
use serde::{Deserialize, Serialize};

/// Per-person state. Nodes are allocated once at load time; only the health
/// state, the scaling factors and the trait word mutate afterwards.
///
/// `edges_begin` / `edges_size` describe the contiguous run of incoming edges
/// owned by the node's partition. Remote replicas carry an empty run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NodeData {
    pub id: NodeId,
    pub state: StateIndex,
    pub susceptibility_factor: Real,
    pub susceptibility: Real,
    pub infectivity_factor: Real,
    pub infectivity: Real,
    pub traits: TraitData,
    #[serde(skip)]
    pub edges_begin: usize,
    #[serde(skip)]
    pub edges_size: usize,
}

impl NodeData {
    pub fn new(id: NodeId) -> Self {
        NodeData {
            id,
            state: 0,
            susceptibility_factor: 1.0,
            susceptibility: 0.0,
            infectivity_factor: 1.0,
            infectivity: 0.0,
            traits: 0,
            edges_begin: 0,
            edges_size: 0,
        }
    }

    /// Recompute the effective susceptibility and infectivity from the state
    /// baselines. Called whenever the state or a factor changes.
    pub fn refresh(&mut self, base_susceptibility: Real, base_infectivity: Real) {
        self.susceptibility = base_susceptibility * self.susceptibility_factor;
        self.infectivity = base_infectivity * self.infectivity_factor;
    }

    /// The authoritative post-state shipped to replicas at end of tick.
    pub fn replica(&self) -> NodeData {
        NodeData {
            edges_begin: 0,
            edges_size: 0,
            ..*self
        }
    }

    /// Apply a received authoritative update, keeping the local edge run.
    pub fn apply_replica(&mut self, update: &NodeData) {
        self.state = update.state;
        self.susceptibility_factor = update.susceptibility_factor;
        self.susceptibility = update.susceptibility;
        self.infectivity_factor = update.infectivity_factor;
        self.infectivity = update.infectivity;
        self.traits = update.traits;
    }
}
