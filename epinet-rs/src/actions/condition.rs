use crate::compute::{ObservableList, SizeOfList};
use crate::network::Network;
use crate::prelude::{NodeId, Real};
use crate::sets::{ComparisonOp, EdgeProperty, NodeProperty, SetRegistry};
use crate::values::{Value, ValueList};
use crate::variables::VariableList;
use serde::{Deserialize, Serialize};

/// Everything a condition may read, for one partition.
pub struct EvalContext<'a> {
    pub rank: usize,
    pub network: &'a Network,
    pub variables: &'a VariableList,
    pub observables: &'a ObservableList,
    pub sizeofs: &'a SizeOfList,
    pub registry: &'a SetRegistry,
}

/// A leaf operand of a comparison.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operand {
    Value(Value),
    Variable(usize),
    Observable(usize),
    SizeOf(usize),
    NodeProperty { node: NodeId, property: NodeProperty },
    EdgeProperty { edge: usize, property: EdgeProperty },
}

impl Operand {
    pub fn resolve(&self, ctx: &EvalContext) -> Option<Value> {
        match self {
            Operand::Value(value) => Some(value.clone()),
            Operand::Variable(index) => Some(Value::Number(ctx.variables.value(*index, ctx.rank))),
            Operand::Observable(index) => Some(Value::Number(ctx.observables.value(*index))),
            Operand::SizeOf(index) => {
                Some(Value::Number(ctx.sizeofs.value(*index, ctx.rank, ctx.registry)))
            }
            Operand::NodeProperty { node, property } => {
                let node = ctx.network.lookup_node(*node)?;
                Some(match property {
                    NodeProperty::Id => Value::Number(node.id as Real),
                    NodeProperty::HealthState => Value::HealthState(node.state),
                    NodeProperty::SusceptibilityFactor => Value::Number(node.susceptibility_factor),
                    NodeProperty::InfectivityFactor => Value::Number(node.infectivity_factor),
                    NodeProperty::NodeTrait => Value::Number(node.traits as Real),
                })
            }
            Operand::EdgeProperty { edge, property } => {
                let edge = ctx.network.edges().get(*edge)?;
                Some(match property {
                    EdgeProperty::TargetId => Value::Number(edge.target as Real),
                    EdgeProperty::SourceId => Value::Number(edge.source as Real),
                    EdgeProperty::TargetActivity => Value::Number(edge.target_activity as Real),
                    EdgeProperty::SourceActivity => Value::Number(edge.source_activity as Real),
                    EdgeProperty::LocationId => {
                        Value::Number(edge.location_id.unwrap_or(0) as Real)
                    }
                    EdgeProperty::Duration => Value::Number(edge.duration),
                    EdgeProperty::Weight => Value::Number(edge.weight),
                    EdgeProperty::Active => Value::Bool(edge.active),
                    EdgeProperty::EdgeTrait => Value::Number(edge.edge_trait as Real),
                })
            }
        }
    }
}

/// A boolean expression over comparisons and trait predicates, evaluated
/// lazily against the just-computed computables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    Bool(bool),
    Compare {
        left: Operand,
        op: ComparisonOp,
        right: Operand,
    },
    InList {
        left: Operand,
        list: ValueList,
        negate: bool,
    },
    /// The node's packed trait word matches (or does not match) the value.
    TraitMatch {
        node: NodeId,
        value: crate::traits::TraitValue,
        negate: bool,
    },
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    /// The condition gating a transmission or progression action: the node
    /// is still in the state it had when the action was created.
    pub fn node_in_state(node: NodeId, state: usize) -> Condition {
        Condition::Compare {
            left: Operand::NodeProperty { node, property: NodeProperty::HealthState },
            op: ComparisonOp::Eq,
            right: Operand::Value(Value::HealthState(state)),
        }
    }

    pub fn evaluate(&self, ctx: &EvalContext) -> bool {
        match self {
            Condition::Bool(b) => *b,
            Condition::Compare { left, op, right } => {
                let (left, right) = match (left.resolve(ctx), right.resolve(ctx)) {
                    (Some(l), Some(r)) => (l, r),
                    _ => return false,
                };
                match op {
                    ComparisonOp::Eq => left == right,
                    ComparisonOp::Ne => left != right,
                    ComparisonOp::Lt => left < right,
                    ComparisonOp::Le => left <= right,
                    ComparisonOp::Gt => left > right,
                    ComparisonOp::Ge => left >= right,
                    ComparisonOp::In | ComparisonOp::NotIn => false,
                }
            }
            Condition::InList { left, list, negate } => match left.resolve(ctx) {
                Some(value) => list.contains(&value) != *negate,
                None => false,
            },
            Condition::TraitMatch { node, value, negate } => match ctx.network.lookup_node(*node) {
                Some(node) => value.matches(node.traits) != *negate,
                None => false,
            },
            Condition::And(terms) => terms.iter().all(|c| c.evaluate(ctx)),
            Condition::Or(terms) => terms.iter().any(|c| c.evaluate(ctx)),
            Condition::Not(term) => !term.evaluate(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::{ObservableKind, SizeOfList};
    use crate::network::{Boundary, EdgeData};
    use crate::variables::{VariableDef, VariableScope};

    fn ctx_fixture() -> (Network, VariableList, ObservableList, SizeOfList, SetRegistry) {
        let mut edges = vec![EdgeData::new(1, 2)];
        edges.sort_by(|a, b| a.compare(b));
        let network = Network::build(
            0,
            Boundary { first: 1, beyond: 3, edges_begin: 0, edges_end: 1 },
            edges,
            1.0,
            &[],
        );
        let variables = VariableList::new(
            &[VariableDef {
                id: "threshold".into(),
                annotation: None,
                scope: VariableScope::Global,
                initial_value: 5.0,
                reset: None,
            }],
            1,
        )
        .unwrap();
        let mut observables = ObservableList::new();
        observables.register(ObservableKind::Time);
        (network, variables, observables, SizeOfList::new(), SetRegistry::default())
    }

    #[test]
    fn comparisons_and_logic() {
        let (network, variables, observables, sizeofs, registry) = ctx_fixture();
        let ctx = EvalContext {
            rank: 0,
            network: &network,
            variables: &variables,
            observables: &observables,
            sizeofs: &sizeofs,
            registry: &registry,
        };

        let threshold = Condition::Compare {
            left: Operand::Variable(0),
            op: ComparisonOp::Ge,
            right: Operand::Value(Value::Number(5.0)),
        };
        assert!(threshold.evaluate(&ctx));

        let in_state = Condition::node_in_state(1, 0);
        assert!(in_state.evaluate(&ctx));
        assert!(!Condition::node_in_state(1, 2).evaluate(&ctx));

        let both = Condition::And(vec![threshold.clone(), in_state]);
        assert!(both.evaluate(&ctx));
        assert!(!Condition::Not(Box::new(both)).evaluate(&ctx));
    }

    #[test]
    fn missing_nodes_evaluate_false() {
        let (network, variables, observables, sizeofs, registry) = ctx_fixture();
        let ctx = EvalContext {
            rank: 0,
            network: &network,
            variables: &variables,
            observables: &observables,
            sizeofs: &sizeofs,
            registry: &registry,
        };
        assert!(!Condition::node_in_state(99, 0).evaluate(&ctx));
    }
}
