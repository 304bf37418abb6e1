mod def;
mod ensemble;
mod sampling;

pub use def::{
    ActionDefinitionDef, ActionEnsembleDef, ConditionDef, InitializationDef, InitializationDoc,
    InterventionDoc, ModelPropertyDef, OperandDef, OperationDef, OperationTargetDef,
    OperationValueDef, SamplingDef, SamplingKindDef, SizeOfRef, StatePropertyDef, TriggerDef,
};
pub use ensemble::{
    ActionEnsemble, ActionTemplate, ConditionTemplate, Element, EnsembleResolver, OperandTemplate,
    OperationTemplate, Sampling, SamplingKind,
};
pub use sampling::{proportional_allowances, sample_exact, sample_percent};

use crate::actions::{ActionQueue, Condition};
use crate::error::{Error, Result};
use crate::network::Network;
use crate::plane::RandomStreams;
use crate::prelude::{NodeId, Tick};
use crate::sets::{SetContent, SetId, SetRegistry, SetStore};
use crate::variables::VariableList;
use log::{debug, info};
use std::collections::HashMap;

/// Which element kind an action template binds to, derived from its
/// operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementKind {
    Node,
    Edge,
    Any,
}

impl ActionTemplate {
    /// Node templates instantiate over node elements, edge templates over
    /// edge elements; templates with only variable operations bind to both.
    pub fn element_kind(&self) -> ElementKind {
        for operation in &self.operations {
            match operation {
                OperationTemplate::NodeState { .. }
                | OperationTemplate::NodeFactor { .. }
                | OperationTemplate::NodeTrait { .. } => return ElementKind::Node,
                OperationTemplate::EdgeActive { .. }
                | OperationTemplate::EdgeNumeric { .. } => return ElementKind::Edge,
                OperationTemplate::Variable { .. } | OperationTemplate::ModelEdit(_) => {}
            }
        }
        ElementKind::Any
    }
}

/// A one-shot initialization or a re-firable intervention: a target set and
/// the action ensemble applied to it.
#[derive(Debug, Clone)]
pub struct Initialization {
    pub id: Option<String>,
    pub annotation: Option<String>,
    pub target: SetId,
    pub ensemble: ActionEnsemble,
}

/// A trigger: a condition over global computables and the interventions it
/// fires. All partitions agree on the fired set through a cross-partition OR.
#[derive(Debug, Clone)]
pub struct Trigger {
    pub condition: Condition,
    pub interventions: Vec<usize>,
}

/// The resolved intervention program of a run.
#[derive(Debug, Clone, Default)]
pub struct Program {
    pub initializations: Vec<Initialization>,
    pub interventions: Vec<Initialization>,
    pub triggers: Vec<Trigger>,
    by_id: HashMap<String, usize>,
}

impl Program {
    pub fn intervention_index(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    /// Resolve both documents. Named sets must already be registered with
    /// the resolver backing `ensembles`.
    pub fn resolve(
        ensembles: &mut EnsembleResolver,
        initializations: &InitializationDoc,
        interventions: &InterventionDoc,
    ) -> Result<Program> {
        let mut program = Program::default();

        for def in &initializations.initializations {
            program.initializations.push(Self::resolve_one(ensembles, def)?);
        }
        for def in &interventions.interventions {
            let resolved = Self::resolve_one(ensembles, def)?;
            if let Some(id) = &resolved.id {
                program.by_id.insert(id.clone(), program.interventions.len());
            }
            program.interventions.push(resolved);
        }
        for def in &interventions.triggers {
            let condition = ensembles
                .condition(&def.trigger, false)?
                .instantiate(Element::None)?;
            let mut targets = Vec::with_capacity(def.intervention_ids.len());
            for id in &def.intervention_ids {
                let index = program.intervention_index(id).ok_or_else(|| {
                    Error::semantic(format!("trigger references unknown intervention '{}'", id))
                })?;
                targets.push(index);
            }
            program.triggers.push(Trigger { condition, interventions: targets });
        }

        info!(
            "program: {} initializations, {} interventions, {} triggers",
            program.initializations.len(),
            program.interventions.len(),
            program.triggers.len()
        );
        Ok(program)
    }

    fn resolve_one(
        ensembles: &mut EnsembleResolver,
        def: &InitializationDef,
    ) -> Result<Initialization> {
        let target = ensembles.sets.resolve(&def.target, Default::default())?;
        let scope = ensembles.sets.registry().scope(target);
        let ensemble = ensembles.ensemble(&def.ensemble, scope)?;
        Ok(Initialization {
            id: def.id.clone(),
            annotation: def.annotation.clone(),
            target,
            ensemble,
        })
    }
}

/// Everything ensemble processing touches across all partitions.
pub struct ProcessContext<'a> {
    pub registry: &'a SetRegistry,
    pub stores: &'a mut [SetStore],
    pub queues: &'a mut [ActionQueue],
    pub networks: &'a [Network],
    pub variables: &'a VariableList,
    pub streams: &'a RandomStreams,
    pub tick: Tick,
}

impl<'a> ProcessContext<'a> {
    fn ranks(&self) -> usize {
        self.networks.len()
    }

    /// The elements of `target` owned by `rank`: local member nodes plus
    /// local edges.
    fn local_elements(&self, target: SetId, rank: usize) -> (Vec<NodeId>, Vec<usize>) {
        let network = &self.networks[rank];
        let content = self.stores[rank].get(target);
        let begin = content.nodes.partition_point(|&id| id < network.first_local());
        let end = content.nodes.partition_point(|&id| id < network.beyond_local());
        (content.nodes[begin..end].to_vec(), content.edges.clone())
    }
}

/// Apply one action ensemble to its target set: `once` actions are scheduled
/// a single time, `forEach` actions once per owned element, and sampling
/// splits the target before recursing.
pub fn process_ensemble(
    ensemble: &ActionEnsemble,
    target: SetId,
    ctx: &mut ProcessContext,
) -> Result<()> {
    for template in &ensemble.once {
        let action = template.instantiate(Element::None)?;
        ctx.queues[0].schedule(ctx.tick + template.delay as Tick, action);
    }

    if !ensemble.for_each.is_empty() {
        for rank in 0..ctx.ranks() {
            let (nodes, edges) = ctx.local_elements(target, rank);
            for template in &ensemble.for_each {
                let kind = template.element_kind();
                let tick = ctx.tick + template.delay as Tick;
                if kind != ElementKind::Edge {
                    for &node in &nodes {
                        ctx.queues[rank].schedule(tick, template.instantiate(Element::Node(node))?);
                    }
                }
                if kind != ElementKind::Node {
                    for &edge in &edges {
                        ctx.queues[rank].schedule(tick, template.instantiate(Element::Edge(edge))?);
                    }
                }
            }
        }
    }

    if let Some(sampling) = &ensemble.sampling {
        process_sampling(sampling, target, ctx)?;
    }

    Ok(())
}

/// Split the target into sampled and non-sampled views, then run the
/// respective ensembles against them.
fn process_sampling(sampling: &Sampling, target: SetId, ctx: &mut ProcessContext) -> Result<()> {
    let ranks = ctx.ranks();
    let mut elements: Vec<(Vec<NodeId>, Vec<usize>)> = Vec::with_capacity(ranks);
    for rank in 0..ranks {
        elements.push(ctx.local_elements(target, rank));
    }

    // decide per-rank which elements are taken
    let taken: Vec<Vec<bool>> = match sampling.kind {
        SamplingKind::Percent(percent) => elements
            .iter()
            .enumerate()
            .map(|(rank, (nodes, edges))| {
                let mut rng = ctx.streams.rank(ctx.tick, rank);
                sample_percent(nodes.len() + edges.len(), percent, &mut rng)
            })
            .collect(),
        SamplingKind::Count(_) | SamplingKind::Variable(_) => {
            let count = match sampling.kind {
                SamplingKind::Variable(index) => {
                    let value = ctx.variables.value(index, 0);
                    if value < 0.0 {
                        0
                    } else {
                        value.round() as u64
                    }
                }
                SamplingKind::Count(count) => count,
                SamplingKind::Percent(_) => unreachable!(),
            };
            // rank 0 collects local sizes and computes the allowances
            let sizes: Vec<u64> = elements
                .iter()
                .map(|(nodes, edges)| (nodes.len() + edges.len()) as u64)
                .collect();
            let allowances = proportional_allowances(&sizes, count);
            elements
                .iter()
                .enumerate()
                .map(|(rank, (nodes, edges))| {
                    let mut rng = ctx.streams.rank(ctx.tick, rank);
                    sample_exact(nodes.len() + edges.len(), allowances[rank], &mut rng)
                })
                .collect()
        }
    };

    for rank in 0..ranks {
        let (nodes, edges) = &elements[rank];
        let flags = &taken[rank];
        let mut sampled = SetContent::default();
        let mut nonsampled = SetContent::default();

        for (i, &node) in nodes.iter().enumerate() {
            if flags[i] {
                sampled.nodes.push(node);
            } else {
                nonsampled.nodes.push(node);
            }
        }
        for (j, &edge) in edges.iter().enumerate() {
            if flags[nodes.len() + j] {
                sampled.edges.push(edge);
            } else {
                nonsampled.edges.push(edge);
            }
        }

        debug!(
            "sampling: rank {} tick {}: {} of {} elements",
            rank,
            ctx.tick,
            sampled.nodes.len() + sampled.edges.len(),
            flags.len()
        );
        ctx.stores[rank].ensure(ctx.registry.len());
        ctx.stores[rank].put(sampling.sampled_set, sampled);
        ctx.stores[rank].put(sampling.nonsampled_set, nonsampled);
    }

    if let Some(ensemble) = &sampling.sampled {
        process_ensemble(ensemble, sampling.sampled_set, ctx)?;
    }
    if let Some(ensemble) = &sampling.nonsampled {
        process_ensemble(ensemble, sampling.nonsampled_set, ctx)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{ObservableList, SizeOfList};
    use crate::disease::DiseaseModel;
    use crate::network::{Boundary, EdgeData};
    use crate::sets::{ResolveContext, SetResolver};
    use crate::traits::TraitRegistry;

    fn network_of(ids: &[NodeId], rank: usize, first: NodeId, beyond: NodeId) -> Network {
        // a self-contained ring so every listed node is a target
        let mut edges: Vec<EdgeData> = ids
            .iter()
            .enumerate()
            .map(|(i, &id)| EdgeData::new(id, ids[(i + 1) % ids.len()]))
            .collect();
        edges.sort_by(|a, b| a.compare(b));
        let len = edges.len();
        Network::build(
            rank,
            Boundary { first, beyond, edges_begin: 0, edges_end: len },
            edges,
            1.0,
            &[],
        )
    }

    #[test]
    fn foreach_instantiates_per_owned_element() {
        let model = DiseaseModel::parse(crate::disease::tests::sir_json()).unwrap();
        let traits = TraitRegistry::new();
        let variables = VariableList::new(&[], 2).unwrap();
        let mut observables = ObservableList::new();
        let mut sizeofs = SizeOfList::new();

        let doc: InitializationDoc = serde_json::from_str(
            r#"{
              "initializations": [{
                "target": {"elementType": "node"},
                "foreach": [{
                  "operations": [
                    {"target": {"node": "healthState"}, "operator": "=",
                     "value": {"healthState": "I"}}
                  ]
                }]
              }]
            }"#,
        )
        .unwrap();

        let mut sets = SetResolver::new(ResolveContext { model: &model, traits: &traits }, &[]);
        let mut resolver = EnsembleResolver {
            sets: &mut sets,
            variables: &variables,
            observables: &mut observables,
            sizeofs: &mut sizeofs,
            ranks: 2,
        };
        let program =
            Program::resolve(&mut resolver, &doc, &InterventionDoc::default()).unwrap();
        let registry = sets.finish();

        let networks = vec![network_of(&[1, 2], 0, 1, 3), network_of(&[3, 4], 1, 3, 5)];
        let mut stores = vec![SetStore::new(registry.len()), SetStore::new(registry.len())];
        let target = program.initializations[0].target;
        for (rank, network) in networks.iter().enumerate() {
            crate::sets::compute_set_local(
                target,
                &registry,
                network,
                &crate::db::NoDb,
                &mut stores[rank],
            )
            .unwrap();
        }

        let mut queues = vec![ActionQueue::new(), ActionQueue::new()];
        let streams = RandomStreams::new(1, 0);
        let mut ctx = ProcessContext {
            registry: &registry,
            stores: &mut stores,
            queues: &mut queues,
            networks: &networks,
            variables: &variables,
            streams: &streams,
            tick: 0,
        };
        process_ensemble(&program.initializations[0].ensemble, target, &mut ctx).unwrap();

        assert_eq!(queues[0].pending_at(0), 2);
        assert_eq!(queues[1].pending_at(0), 2);
    }

    #[test]
    fn count_sampling_is_exact_across_ranks() {
        let model = DiseaseModel::parse(crate::disease::tests::sir_json()).unwrap();
        let traits = TraitRegistry::new();
        let variables = VariableList::new(&[], 2).unwrap();
        let mut observables = ObservableList::new();
        let mut sizeofs = SizeOfList::new();

        let doc: InitializationDoc = serde_json::from_str(
            r#"{
              "initializations": [{
                "target": {"elementType": "node"},
                "sampling": {
                  "count": 3,
                  "sampled": {"foreach": [{
                    "operations": [
                      {"target": {"node": "susceptibilityFactor"},
                       "operator": "=", "value": {"number": 0.0}}
                    ]
                  }]}
                }
              }]
            }"#,
        )
        .unwrap();

        let mut sets = SetResolver::new(ResolveContext { model: &model, traits: &traits }, &[]);
        let mut resolver = EnsembleResolver {
            sets: &mut sets,
            variables: &variables,
            observables: &mut observables,
            sizeofs: &mut sizeofs,
            ranks: 2,
        };
        let program =
            Program::resolve(&mut resolver, &doc, &InterventionDoc::default()).unwrap();
        let registry = sets.finish();

        let networks = vec![network_of(&[1, 2, 3], 0, 1, 4), network_of(&[4, 5], 1, 4, 6)];
        let mut stores = vec![SetStore::new(registry.len()), SetStore::new(registry.len())];
        let target = program.initializations[0].target;
        for (rank, network) in networks.iter().enumerate() {
            crate::sets::compute_set_local(
                target,
                &registry,
                network,
                &crate::db::NoDb,
                &mut stores[rank],
            )
            .unwrap();
        }

        let mut queues = vec![ActionQueue::new(), ActionQueue::new()];
        let streams = RandomStreams::new(7, 0);
        let mut ctx = ProcessContext {
            registry: &registry,
            stores: &mut stores,
            queues: &mut queues,
            networks: &networks,
            variables: &variables,
            streams: &streams,
            tick: 0,
        };
        process_ensemble(&program.initializations[0].ensemble, target, &mut ctx).unwrap();

        let sampling = program.initializations[0].ensemble.sampling.as_ref().unwrap();
        let total: usize = stores
            .iter()
            .map(|store| store.get(sampling.sampled_set).nodes.len())
            .sum();
        assert_eq!(total, 3);
        assert_eq!(queues[0].pending_at(0) + queues[1].pending_at(0), 3);
    }
}
