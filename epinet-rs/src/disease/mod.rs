mod distribution;
mod factor;
mod progression;
mod state;
mod transmission;

pub use distribution::{DiscretePoint, Distribution};
pub use factor::{apply_factor, FactorOperation, FactorOperator};
pub use progression::{Progression, ProgressionDef};
pub use state::{HealthState, StateCount, StateCounts};
pub use transmission::{Transmission, TransmissionDef};

use crate::error::{Error, Result};
use crate::network::Network;
use crate::plane::RandomStreams;
use crate::prelude::{NodeId, Real, StateIndex, Tick};
use log::debug;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// JSON form of a disease model document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiseaseModelDef {
    #[serde(default)]
    pub annotation: Option<String>,
    pub states: Vec<HealthState>,
    pub initial_state: String,
    #[serde(default)]
    pub transmissions: Vec<TransmissionDef>,
    #[serde(default, alias = "transitions")]
    pub progressions: Vec<ProgressionDef>,
}

/// The resolved disease model: states by index, the transmission lookup by
/// (entry, contact) pair, and outgoing progressions per state.
#[derive(Debug, Clone)]
pub struct DiseaseModel {
    states: Vec<HealthState>,
    initial_state: StateIndex,
    transmissions: Vec<Transmission>,
    progressions: Vec<Progression>,
    possible: Vec<Vec<Option<usize>>>,
    outgoing: Vec<Vec<usize>>,
}

impl DiseaseModel {
    pub fn parse(json: &str) -> Result<DiseaseModel> {
        let def: DiseaseModelDef = serde_json::from_str(json)
            .map_err(|e| Error::configuration(format!("disease model: {}", e)))?;
        DiseaseModel::resolve(&def)
    }

    pub fn resolve(def: &DiseaseModelDef) -> Result<DiseaseModel> {
        if def.states.is_empty() {
            return Err(Error::configuration("disease model: no states"));
        }

        let mut index: HashMap<&str, StateIndex> = HashMap::new();
        for (i, state) in def.states.iter().enumerate() {
            if index.insert(state.id.as_str(), i).is_some() {
                return Err(Error::semantic(format!("disease model: duplicate state '{}'", state.id)));
            }
        }

        let resolve = |id: &str, what: &str| -> Result<StateIndex> {
            index.get(id).copied().ok_or_else(|| {
                Error::semantic(format!("disease model: {} references unknown state '{}'", what, id))
            })
        };

        let initial_state = resolve(&def.initial_state, "initialState")?;

        let mut transmissions = Vec::with_capacity(def.transmissions.len());
        let mut possible = vec![vec![None; def.states.len()]; def.states.len()];
        for t in &def.transmissions {
            let entry_state = resolve(&t.entry_state, &t.id)?;
            let contact_state = resolve(&t.contact_state, &t.id)?;
            possible[entry_state][contact_state] = Some(transmissions.len());
            transmissions.push(Transmission {
                id: t.id.clone(),
                annotation: t.annotation.clone(),
                entry_state,
                exit_state: resolve(&t.exit_state, &t.id)?,
                contact_state,
                transmissibility: t.transmissibility,
                susceptibility_factor_operation: t.susceptibility_factor_operation,
                infectivity_factor_operation: t.infectivity_factor_operation,
            });
        }

        let mut progressions = Vec::with_capacity(def.progressions.len());
        let mut outgoing = vec![Vec::new(); def.states.len()];
        for p in &def.progressions {
            p.dwell_time.validate()?;
            let entry_state = resolve(&p.entry_state, &p.id)?;
            outgoing[entry_state].push(progressions.len());
            progressions.push(Progression {
                id: p.id.clone(),
                annotation: p.annotation.clone(),
                entry_state,
                exit_state: resolve(&p.exit_state, &p.id)?,
                probability: p.probability,
                dwell_time: p.dwell_time.clone(),
                susceptibility_factor_operation: p.susceptibility_factor_operation,
                infectivity_factor_operation: p.infectivity_factor_operation,
            });
        }

        let model = DiseaseModel {
            states: def.states.clone(),
            initial_state,
            transmissions,
            progressions,
            possible,
            outgoing,
        };
        model.validate()?;
        Ok(model)
    }

    /// Progression closure: outgoing probabilities per state sum to 1 within
    /// tolerance; a zero sum marks a terminal state.
    pub fn validate(&self) -> Result<()> {
        for (state, outgoing) in self.outgoing.iter().enumerate() {
            let total: Real = outgoing.iter().map(|&i| self.progressions[i].probability).sum();
            if total != 0.0 && (total - 1.0).abs() > 1e-6 {
                return Err(Error::semantic(format!(
                    "disease model: progressions out of '{}' sum to {}",
                    self.states[state].id, total
                )));
            }
        }
        Ok(())
    }

    pub fn states(&self) -> &[HealthState] {
        &self.states
    }

    pub fn state_count(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, index: StateIndex) -> &HealthState {
        &self.states[index]
    }

    pub fn state_mut(&mut self, index: StateIndex) -> &mut HealthState {
        &mut self.states[index]
    }

    pub fn state_index(&self, id: &str) -> Option<StateIndex> {
        self.states.iter().position(|s| s.id == id)
    }

    pub fn initial_state(&self) -> StateIndex {
        self.initial_state
    }

    pub fn transmissions(&self) -> &[Transmission] {
        &self.transmissions
    }

    pub fn transmissions_mut(&mut self) -> &mut [Transmission] {
        &mut self.transmissions
    }

    pub fn progressions(&self) -> &[Progression] {
        &self.progressions
    }

    pub fn progressions_mut(&mut self) -> &mut [Progression] {
        &mut self.progressions
    }

    pub fn transmission_index(&self, id: &str) -> Option<usize> {
        self.transmissions.iter().position(|t| t.id == id)
    }

    pub fn progression_index(&self, id: &str) -> Option<usize> {
        self.progressions.iter().position(|p| p.id == id)
    }

    /// The transmission applying to a susceptible in `entry` contacted by a
    /// node in `contact`, if any.
    pub fn transmission_for(&self, entry: StateIndex, contact: StateIndex) -> Option<&Transmission> {
        self.possible[entry][contact].map(|i| &self.transmissions[i])
    }

    pub fn transmission_id_for(&self, entry: StateIndex, contact: StateIndex) -> Option<usize> {
        self.possible[entry][contact]
    }

    /// True when some transmission can move a node out of `state`.
    pub fn is_susceptible_state(&self, state: StateIndex) -> bool {
        self.possible[state].iter().any(|t| t.is_some())
    }

    /// Draw the next progression out of `state` by normalized probability,
    /// returning its index.
    pub fn next_progression<R: Rng>(&self, state: StateIndex, rng: &mut R) -> Option<usize> {
        let outgoing = &self.outgoing[state];
        let total: Real = outgoing.iter().map(|&i| self.progressions[i].probability).sum();
        if total <= 0.0 {
            return None;
        }

        let mut draw: Real = rng.gen::<Real>() * total;
        let mut chosen = *outgoing.last()?;
        for &i in outgoing {
            let p = self.progressions[i].probability;
            if draw < p {
                chosen = i;
                break;
            }
            draw -= p;
        }
        Some(chosen)
    }
}

/// One sampled infection: the target node, the transmission taken, and the
/// contact metadata recorded in the change output.
#[derive(Debug, Clone, PartialEq)]
pub struct Infection {
    pub node: NodeId,
    pub entry_state: StateIndex,
    pub exit_state: StateIndex,
    pub transmission: usize,
    pub contact: NodeId,
    pub location_id: Option<u64>,
}

/// A drawn progression for a node that just entered `entry_state`: move to
/// `exit_state` after `delay` ticks, provided the node is still there.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduledProgression {
    pub node: NodeId,
    pub entry_state: StateIndex,
    pub exit_state: StateIndex,
    pub progression: usize,
    pub delay: u32,
}

/// Run the per-tick transmission sampler against one partition.
///
/// For each local node in a susceptible state the hazard is accumulated over
/// its active incoming edges with infective sources, one uniform draw decides
/// infection against `1 - exp(-hazard)`, and the contact edge is picked by
/// categorical sampling weighted by contribution.
pub fn process_transmissions(
    model: &DiseaseModel,
    network: &Network,
    streams: &RandomStreams,
    tick: Tick,
) -> Vec<Infection> {
    let mut infections = Vec::new();
    let (nodes, edges, remotes) = network.parts();
    let time_resolution = network.time_resolution();

    let mut candidates: Vec<(usize, Real)> = Vec::new();

    for node in nodes {
        if !model.is_susceptible_state(node.state) || node.susceptibility <= 0.0 {
            continue;
        }

        candidates.clear();
        let mut hazard: Real = 0.0;
        let run = &edges[node.edges_begin..node.edges_begin + node.edges_size];

        for (offset, edge) in run.iter().enumerate() {
            if !edge.active {
                continue;
            }

            let source = if network.is_local(edge.source) {
                match nodes.binary_search_by(|n| n.id.cmp(&edge.source)) {
                    Ok(i) => &nodes[i],
                    Err(_) => continue,
                }
            } else {
                match remotes.get(&edge.source) {
                    Some(s) => s,
                    None => continue,
                }
            };

            if source.infectivity <= 0.0 {
                continue;
            }

            let transmission = match model.transmission_for(node.state, source.state) {
                Some(t) => t,
                None => continue,
            };

            let susceptibility =
                apply_factor(&transmission.susceptibility_factor_operation, node.susceptibility);
            let infectivity =
                apply_factor(&transmission.infectivity_factor_operation, source.infectivity);
            let contribution = transmission.transmissibility
                * infectivity
                * susceptibility
                * edge.weight
                * (edge.duration / time_resolution);

            if contribution > 0.0 {
                hazard += contribution;
                candidates.push((offset, contribution));
            }
        }

        if hazard <= 0.0 {
            continue;
        }

        let mut rng = streams.entity(tick, node.id);
        let u: Real = rng.gen();
        if u >= 1.0 - (-hazard).exp() {
            continue;
        }

        // pick the contact edge by contribution weight
        let mut draw: Real = rng.gen::<Real>() * hazard;
        let mut picked = candidates.last().map(|c| c.0).unwrap_or(0);
        for &(offset, weight) in &candidates {
            if draw < weight {
                picked = offset;
                break;
            }
            draw -= weight;
        }

        let edge = &run[picked];
        let contact_state = match network.lookup_node(edge.source) {
            Some(s) => s.state,
            None => continue,
        };
        let index = match model.transmission_id_for(node.state, contact_state) {
            Some(i) => i,
            None => continue,
        };
        let transmission = &model.transmissions()[index];

        infections.push(Infection {
            node: node.id,
            entry_state: node.state,
            exit_state: transmission.exit_state,
            transmission: index,
            contact: edge.source,
            location_id: edge.location_id,
        });
    }

    debug!(
        "transmissions: rank {} tick {}: {} infections",
        network.rank(),
        tick,
        infections.len()
    );
    infections
}

/// Draw the progression out of `state` for a node that entered it at `tick`.
pub fn schedule_progression(
    model: &DiseaseModel,
    node: NodeId,
    state: StateIndex,
    streams: &RandomStreams,
    tick: Tick,
) -> Option<ScheduledProgression> {
    let mut rng = streams.progression(tick, node);
    let index = model.next_progression(state, &mut rng)?;
    let progression = &model.progressions()[index];
    let dwell = progression.dwell_time.sample(&mut rng);

    Some(ScheduledProgression {
        node,
        entry_state: state,
        exit_state: progression.exit_state,
        progression: index,
        delay: dwell.round().max(0.0) as u32,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::network::{Boundary, EdgeData, Network};

    pub(crate) fn sir_json() -> &'static str {
        r#"{
          "states": [
            {"id": "S", "susceptibility": 1.0, "infectivity": 0.0},
            {"id": "I", "susceptibility": 0.0, "infectivity": 1.0},
            {"id": "R", "susceptibility": 0.0, "infectivity": 0.0}
          ],
          "initialState": "S",
          "transmissions": [
            {
              "id": "infection",
              "entryState": "S",
              "exitState": "I",
              "contactState": "I",
              "transmissibility": 1.0
            }
          ],
          "progressions": [
            {
              "id": "I_to_R",
              "entryState": "I",
              "exitState": "R",
              "probability": 1.0,
              "dwellTime": {"fixed": 2.0}
            }
          ]
        }"#
    }

    #[test]
    fn parse_and_resolve() {
        let model = DiseaseModel::parse(sir_json()).unwrap();
        assert_eq!(model.state_count(), 3);
        assert_eq!(model.initial_state(), 0);
        assert!(model.is_susceptible_state(0));
        assert!(!model.is_susceptible_state(1));
        assert!(model.transmission_for(0, 1).is_some());
        assert!(model.transmission_for(0, 2).is_none());
    }

    #[test]
    fn closure_is_enforced() {
        let bad = sir_json().replace(r#""probability": 1.0"#, r#""probability": 0.7"#);
        assert!(DiseaseModel::parse(&bad).is_err());
    }

    fn two_node_network(duration: f64) -> Network {
        let mut edge = EdgeData::new(1, 2);
        edge.duration = duration;
        Network::build(
            0,
            Boundary { first: 1, beyond: 3, edges_begin: 0, edges_end: 1 },
            vec![edge],
            duration,
            &[],
        )
    }

    #[test]
    fn certain_exposure_infects() {
        let model = DiseaseModel::parse(sir_json()).unwrap();
        // overwhelming hazard: weight makes 1 - exp(-h) ~ 1
        let mut network = two_node_network(1.0);
        for node in network.nodes_mut() {
            let state = if node.id == 2 { 1 } else { 0 };
            node.state = state;
            node.refresh(model.state(state).susceptibility, model.state(state).infectivity);
        }
        network.edges_mut()[0].weight = 1e9;

        let streams = RandomStreams::new(1, 0);
        let infections = process_transmissions(&model, &network, &streams, 0);
        assert_eq!(infections.len(), 1);
        assert_eq!(infections[0].node, 1);
        assert_eq!(infections[0].contact, 2);
        assert_eq!(infections[0].exit_state, 1);
    }

    #[test]
    fn inactive_edges_do_not_transmit() {
        let model = DiseaseModel::parse(sir_json()).unwrap();
        let mut network = two_node_network(1.0);
        for node in network.nodes_mut() {
            let state = if node.id == 2 { 1 } else { 0 };
            node.state = state;
            node.refresh(model.state(state).susceptibility, model.state(state).infectivity);
        }
        network.edges_mut()[0].weight = 1e9;
        network.edges_mut()[0].active = false;

        let streams = RandomStreams::new(1, 0);
        assert!(process_transmissions(&model, &network, &streams, 0).is_empty());
    }

    #[test]
    fn progression_draw_and_dwell() {
        let model = DiseaseModel::parse(sir_json()).unwrap();
        let streams = RandomStreams::new(1, 0);
        let scheduled = schedule_progression(&model, 7, 1, &streams, 3).unwrap();
        assert_eq!(scheduled.exit_state, 2);
        assert_eq!(scheduled.delay, 2);
        // terminal state has no progression
        assert!(schedule_progression(&model, 7, 2, &streams, 3).is_none());
    }
}
