use crate::actions::{
    Action, Condition, EdgeNumericTarget, FactorTarget, Metadata, Operand, Operation,
};
use crate::compute::{ObservableList, SizeOfList};
use crate::error::{Error, Result};
use crate::intervention::def::{
    ActionDefinitionDef, ActionEnsembleDef, ConditionDef, ModelPropertyDef, OperandDef,
    OperationDef, OperationTargetDef, OperationValueDef, SamplingDef, SamplingKindDef,
    StatePropertyDef,
};
use crate::prelude::{NodeId, Real, StateIndex};
use crate::sets::{ComparisonOp, EdgeProperty, NodeProperty, SetId, SetResolver, SetScope};
use crate::traits::TraitValue;
use crate::values::{Operator, Value, ValueList};
use crate::variables::VariableList;

/// The element a forEach action definition is bound to during
/// instantiation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Element {
    None,
    Node(NodeId),
    Edge(usize),
}

/// A condition operand that may reference the bound element.
#[derive(Debug, Clone, PartialEq)]
pub enum OperandTemplate {
    Fixed(Operand),
    NodeProperty(NodeProperty),
    EdgeProperty(EdgeProperty),
}

impl OperandTemplate {
    fn instantiate(&self, element: Element) -> Result<Operand> {
        match (self, element) {
            (OperandTemplate::Fixed(operand), _) => Ok(operand.clone()),
            (OperandTemplate::NodeProperty(property), Element::Node(node)) => {
                Ok(Operand::NodeProperty { node, property: *property })
            }
            (OperandTemplate::EdgeProperty(property), Element::Edge(edge)) => {
                Ok(Operand::EdgeProperty { edge, property: *property })
            }
            _ => Err(Error::semantic("condition references an element outside foreach")),
        }
    }
}

/// A condition with element holes.
#[derive(Debug, Clone, PartialEq)]
pub enum ConditionTemplate {
    Bool(bool),
    Compare {
        left: OperandTemplate,
        op: ComparisonOp,
        right: OperandTemplate,
    },
    InList {
        left: OperandTemplate,
        list: ValueList,
        negate: bool,
    },
    And(Vec<ConditionTemplate>),
    Or(Vec<ConditionTemplate>),
    Not(Box<ConditionTemplate>),
}

impl ConditionTemplate {
    pub fn instantiate(&self, element: Element) -> Result<Condition> {
        Ok(match self {
            ConditionTemplate::Bool(b) => Condition::Bool(*b),
            ConditionTemplate::Compare { left, op, right } => {
                // trait predicates compare the packed word by mask
                if let (
                    OperandTemplate::NodeProperty(NodeProperty::NodeTrait),
                    Element::Node(node),
                    OperandTemplate::Fixed(Operand::Value(Value::Trait(value))),
                ) = (left, element, right)
                {
                    let negate = *op == ComparisonOp::Ne;
                    return Ok(Condition::TraitMatch { node, value: *value, negate });
                }
                Condition::Compare {
                    left: left.instantiate(element)?,
                    op: *op,
                    right: right.instantiate(element)?,
                }
            }
            ConditionTemplate::InList { left, list, negate } => Condition::InList {
                left: left.instantiate(element)?,
                list: list.clone(),
                negate: *negate,
            },
            ConditionTemplate::And(terms) => Condition::And(
                terms.iter().map(|t| t.instantiate(element)).collect::<Result<_>>()?,
            ),
            ConditionTemplate::Or(terms) => Condition::Or(
                terms.iter().map(|t| t.instantiate(element)).collect::<Result<_>>()?,
            ),
            ConditionTemplate::Not(term) => Condition::Not(Box::new(term.instantiate(element)?)),
        })
    }
}

/// An operation with the target element left open. Model edits carry the
/// finished operation; they never bind an element.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationTemplate {
    NodeState { state: StateIndex },
    NodeFactor { target: FactorTarget, operator: Operator, value: Real },
    NodeTrait { value: TraitValue },
    EdgeActive { active: bool },
    EdgeNumeric { target: EdgeNumericTarget, operator: Operator, value: Real },
    Variable { index: usize, operator: Operator, value: Real },
    ModelEdit(Operation),
}

impl OperationTemplate {
    pub fn needs_element(&self) -> bool {
        !matches!(
            self,
            OperationTemplate::Variable { .. } | OperationTemplate::ModelEdit(_)
        )
    }

    pub fn instantiate(&self, element: Element) -> Result<Operation> {
        match (self, element) {
            (OperationTemplate::Variable { index, operator, value }, _) => {
                Ok(Operation::Variable { index: *index, operator: *operator, value: *value })
            }
            (OperationTemplate::ModelEdit(operation), _) => Ok(operation.clone()),
            (OperationTemplate::NodeState { state }, Element::Node(node)) => {
                Ok(Operation::SetNodeState { node, state: *state, metadata: Metadata::default() })
            }
            (OperationTemplate::NodeFactor { target, operator, value }, Element::Node(node)) => {
                Ok(Operation::NodeFactor { node, target: *target, operator: *operator, value: *value })
            }
            (OperationTemplate::NodeTrait { value }, Element::Node(node)) => {
                Ok(Operation::SetNodeTrait { node, value: *value })
            }
            (OperationTemplate::EdgeActive { active }, Element::Edge(edge)) => {
                Ok(Operation::SetEdgeActive { edge, active: *active })
            }
            (OperationTemplate::EdgeNumeric { target, operator, value }, Element::Edge(edge)) => {
                Ok(Operation::EdgeNumeric { edge, target: *target, operator: *operator, value: *value })
            }
            _ => Err(Error::semantic("operation target does not match the bound element")),
        }
    }
}

/// A resolved action definition, instantiated per target element (forEach)
/// or once with no element.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionTemplate {
    pub priority: u32,
    pub delay: u32,
    pub condition: Option<ConditionTemplate>,
    pub operations: Vec<OperationTemplate>,
}

impl ActionTemplate {
    pub fn instantiate(&self, element: Element) -> Result<Action> {
        let condition = match &self.condition {
            Some(template) => Some(template.instantiate(element)?),
            None => None,
        };
        let operations = self
            .operations
            .iter()
            .map(|op| op.instantiate(element))
            .collect::<Result<_>>()?;
        Ok(Action::new(self.priority, condition, operations))
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingKind {
    Percent(Real),
    Count(u64),
    Variable(usize),
}

/// A resolved sampling specification with the two placeholder sets its
/// outcome is written into.
#[derive(Debug, Clone)]
pub struct Sampling {
    pub kind: SamplingKind,
    pub sampled_set: SetId,
    pub nonsampled_set: SetId,
    pub sampled: Option<Box<ActionEnsemble>>,
    pub nonsampled: Option<Box<ActionEnsemble>>,
}

/// The resolved `{once, forEach, sampling}` trio.
#[derive(Debug, Clone, Default)]
pub struct ActionEnsemble {
    pub once: Vec<ActionTemplate>,
    pub for_each: Vec<ActionTemplate>,
    pub sampling: Option<Sampling>,
}

/// Resolves intervention documents against the loaded world: sets through
/// the set resolver, symbols through the variable, observable and sizeof
/// registries.
pub struct EnsembleResolver<'a, 'b> {
    pub sets: &'a mut SetResolver<'b>,
    pub variables: &'a VariableList,
    pub observables: &'a mut ObservableList,
    pub sizeofs: &'a mut SizeOfList,
    pub ranks: usize,
}

impl<'a, 'b> EnsembleResolver<'a, 'b> {
    fn operand(&mut self, def: &OperandDef, bound: bool) -> Result<OperandTemplate> {
        Ok(match def {
            OperandDef::Value { value } => {
                OperandTemplate::Fixed(Operand::Value(self.sets.ctx().value(value)?))
            }
            OperandDef::Variable { variable } => {
                let index = self.variables.require(&variable.id_ref)?;
                OperandTemplate::Fixed(Operand::Variable(index))
            }
            OperandDef::Observable { observable } => {
                let model = self.sets.ctx().model;
                let index = self.observables.resolve(observable, model)?;
                OperandTemplate::Fixed(Operand::Observable(index))
            }
            OperandDef::SizeOf { sizeof } => {
                let set = self.sets.resolve_named(&sizeof.set.id_ref)?;
                let index = self.sizeofs.register(set, self.ranks);
                OperandTemplate::Fixed(Operand::SizeOf(index))
            }
            OperandDef::Node { node } => {
                if !bound {
                    return Err(Error::semantic("node operand outside foreach"));
                }
                OperandTemplate::NodeProperty(*node)
            }
            OperandDef::Edge { edge } => {
                if !bound {
                    return Err(Error::semantic("edge operand outside foreach"));
                }
                OperandTemplate::EdgeProperty(*edge)
            }
        })
    }

    pub fn condition(&mut self, def: &ConditionDef, bound: bool) -> Result<ConditionTemplate> {
        Ok(match def {
            ConditionDef::Fixed { value } => ConditionTemplate::Bool(*value),
            ConditionDef::Comparison { left, operator, right } => ConditionTemplate::Compare {
                left: self.operand(left, bound)?,
                op: *operator,
                right: self.operand(right, bound)?,
            },
            ConditionDef::InList { left, operator, value_list } => {
                let negate = match operator {
                    ComparisonOp::In => false,
                    ComparisonOp::NotIn => true,
                    _ => {
                        return Err(Error::configuration(
                            "value list conditions use 'in' or 'not in'",
                        ))
                    }
                };
                ConditionTemplate::InList {
                    left: self.operand(left, bound)?,
                    list: self.sets.ctx().value_list(value_list)?,
                    negate,
                }
            }
            ConditionDef::And { and } => ConditionTemplate::And(
                and.iter().map(|c| self.condition(c, bound)).collect::<Result<_>>()?,
            ),
            ConditionDef::Or { or } => ConditionTemplate::Or(
                or.iter().map(|c| self.condition(c, bound)).collect::<Result<_>>()?,
            ),
            ConditionDef::Not { not } => {
                ConditionTemplate::Not(Box::new(self.condition(not, bound)?))
            }
        })
    }

    fn operation(&mut self, def: &OperationDef) -> Result<OperationTemplate> {
        // model edits carry their own payload kinds
        match &def.target {
            OperationTargetDef::HealthState { health_state, property } => {
                return self.state_operation(health_state, *property, def);
            }
            OperationTargetDef::Transmission { transmission, property } => {
                return self.transmission_operation(transmission, *property, def);
            }
            OperationTargetDef::Progression { progression, property } => {
                return self.progression_operation(progression, *property, def);
            }
            _ => {}
        }

        let value = match &def.value {
            OperationValueDef::Value(value) => self.sets.ctx().value(value)?,
            _ => {
                return Err(Error::semantic(
                    "factor operations and dwell times only apply to model targets",
                ))
            }
        };
        Ok(match &def.target {
            OperationTargetDef::Variable { variable } => {
                let index = self.variables.require(&variable.id_ref)?;
                let value = value
                    .as_number()
                    .ok_or_else(|| Error::semantic("variable operations need a numeric value"))?;
                OperationTemplate::Variable { index, operator: def.operator, value }
            }
            OperationTargetDef::Node { node } => match node {
                NodeProperty::HealthState => match value {
                    Value::HealthState(state) => OperationTemplate::NodeState { state },
                    _ => return Err(Error::semantic("health state operations need a state value")),
                },
                NodeProperty::SusceptibilityFactor => OperationTemplate::NodeFactor {
                    target: FactorTarget::Susceptibility,
                    operator: def.operator,
                    value: value
                        .as_number()
                        .ok_or_else(|| Error::semantic("factor operations need a numeric value"))?,
                },
                NodeProperty::InfectivityFactor => OperationTemplate::NodeFactor {
                    target: FactorTarget::Infectivity,
                    operator: def.operator,
                    value: value
                        .as_number()
                        .ok_or_else(|| Error::semantic("factor operations need a numeric value"))?,
                },
                NodeProperty::NodeTrait => match value {
                    Value::Trait(value) => OperationTemplate::NodeTrait { value },
                    _ => return Err(Error::semantic("trait operations need a trait value")),
                },
                NodeProperty::Id => return Err(Error::semantic("node ids are immutable")),
            },
            OperationTargetDef::Edge { edge } => match edge {
                EdgeProperty::Active => match value {
                    Value::Bool(active) => OperationTemplate::EdgeActive { active },
                    _ => return Err(Error::semantic("edge active operations need a boolean")),
                },
                EdgeProperty::Weight => OperationTemplate::EdgeNumeric {
                    target: EdgeNumericTarget::Weight,
                    operator: def.operator,
                    value: value
                        .as_number()
                        .ok_or_else(|| Error::semantic("edge weight operations need a number"))?,
                },
                EdgeProperty::Duration => OperationTemplate::EdgeNumeric {
                    target: EdgeNumericTarget::Duration,
                    operator: def.operator,
                    value: value
                        .as_number()
                        .ok_or_else(|| Error::semantic("edge duration operations need a number"))?,
                },
                _ => return Err(Error::semantic("edge operations target active, weight or duration")),
            },
            // handled by the early returns above
            _ => unreachable!(),
        })
    }

    fn state_operation(
        &mut self,
        state: &str,
        property: StatePropertyDef,
        def: &OperationDef,
    ) -> Result<OperationTemplate> {
        let model = self.sets.ctx().model;
        let state = model
            .state_index(state)
            .ok_or_else(|| Error::semantic(format!("operation references unknown state '{}'", state)))?;
        let value = match &def.value {
            OperationValueDef::Value(value) => self.sets.ctx().value(value)?.as_number(),
            _ => None,
        }
        .ok_or_else(|| Error::semantic("health state properties need a numeric value"))?;
        let property = match property {
            StatePropertyDef::Susceptibility => FactorTarget::Susceptibility,
            StatePropertyDef::Infectivity => FactorTarget::Infectivity,
        };
        Ok(OperationTemplate::ModelEdit(Operation::HealthStateProperty {
            state,
            property,
            operator: def.operator,
            value,
        }))
    }

    fn transmission_operation(
        &mut self,
        transmission: &str,
        property: ModelPropertyDef,
        def: &OperationDef,
    ) -> Result<OperationTemplate> {
        let model = self.sets.ctx().model;
        let transmission = model.transmission_index(transmission).ok_or_else(|| {
            Error::semantic(format!("operation references unknown transmission '{}'", transmission))
        })?;
        let operation = match (property, &def.value) {
            (ModelPropertyDef::Transmissibility, OperationValueDef::Value(value)) => {
                let value = self
                    .sets
                    .ctx()
                    .value(value)?
                    .as_number()
                    .ok_or_else(|| Error::semantic("transmissibility needs a numeric value"))?;
                Operation::TransmissionProperty { transmission, operator: def.operator, value }
            }
            (
                ModelPropertyDef::SusceptibilityFactorOperation,
                OperationValueDef::FactorOperation { factor_operation },
            ) => Operation::TransmissionFactorOperation {
                transmission,
                which: FactorTarget::Susceptibility,
                operation: *factor_operation,
            },
            (
                ModelPropertyDef::InfectivityFactorOperation,
                OperationValueDef::FactorOperation { factor_operation },
            ) => Operation::TransmissionFactorOperation {
                transmission,
                which: FactorTarget::Infectivity,
                operation: *factor_operation,
            },
            _ => {
                return Err(Error::semantic(
                    "transmission operations target transmissibility or a factor operation",
                ))
            }
        };
        Ok(OperationTemplate::ModelEdit(operation))
    }

    fn progression_operation(
        &mut self,
        progression: &str,
        property: ModelPropertyDef,
        def: &OperationDef,
    ) -> Result<OperationTemplate> {
        let model = self.sets.ctx().model;
        let progression = model.progression_index(progression).ok_or_else(|| {
            Error::semantic(format!("operation references unknown progression '{}'", progression))
        })?;
        let operation = match (property, &def.value) {
            (ModelPropertyDef::Propensity, OperationValueDef::Value(value)) => {
                let value = self
                    .sets
                    .ctx()
                    .value(value)?
                    .as_number()
                    .ok_or_else(|| Error::semantic("propensity needs a numeric value"))?;
                Operation::ProgressionPropensity { progression, operator: def.operator, value }
            }
            (ModelPropertyDef::DwellTime, OperationValueDef::DwellTime { dwell_time }) => {
                Operation::ProgressionDwellTime { progression, dwell_time: dwell_time.clone() }
            }
            (
                ModelPropertyDef::SusceptibilityFactorOperation,
                OperationValueDef::FactorOperation { factor_operation },
            ) => Operation::ProgressionFactorOperation {
                progression,
                which: FactorTarget::Susceptibility,
                operation: *factor_operation,
            },
            (
                ModelPropertyDef::InfectivityFactorOperation,
                OperationValueDef::FactorOperation { factor_operation },
            ) => Operation::ProgressionFactorOperation {
                progression,
                which: FactorTarget::Infectivity,
                operation: *factor_operation,
            },
            _ => {
                return Err(Error::semantic(
                    "progression operations target propensity, dwellTime or a factor operation",
                ))
            }
        };
        Ok(OperationTemplate::ModelEdit(operation))
    }

    fn action(&mut self, def: &ActionDefinitionDef, bound: bool) -> Result<ActionTemplate> {
        let condition = match &def.condition {
            Some(condition) => Some(self.condition(condition, bound)?),
            None => None,
        };
        let operations = def
            .operations
            .iter()
            .map(|op| self.operation(op))
            .collect::<Result<Vec<_>>>()?;

        if !bound {
            if let Some(op) = operations.iter().find(|op| op.needs_element()) {
                return Err(Error::semantic(format!(
                    "once action contains an element-bound operation: {:?}",
                    op
                )));
            }
        }

        Ok(ActionTemplate { priority: def.priority, delay: def.delay, condition, operations })
    }

    pub fn ensemble(&mut self, def: &ActionEnsembleDef, scope: SetScope) -> Result<ActionEnsemble> {
        let once = def
            .once
            .iter()
            .map(|a| self.action(a, false))
            .collect::<Result<Vec<_>>>()?;
        let for_each = def
            .for_each
            .iter()
            .map(|a| self.action(a, true))
            .collect::<Result<Vec<_>>>()?;
        let sampling = match &def.sampling {
            Some(sampling) => Some(self.sampling(sampling, scope)?),
            None => None,
        };
        Ok(ActionEnsemble { once, for_each, sampling })
    }

    fn sampling(&mut self, def: &SamplingDef, scope: SetScope) -> Result<Sampling> {
        let kind = match &def.kind {
            SamplingKindDef::Percent { percent } => {
                if *percent < 0.0 || *percent > 100.0 {
                    return Err(Error::configuration("sampling percent must be within [0, 100]"));
                }
                SamplingKind::Percent(*percent)
            }
            SamplingKindDef::Count { count } => SamplingKind::Count(*count),
            SamplingKindDef::Variable { variable } => {
                SamplingKind::Variable(self.variables.require(&variable.id_ref)?)
            }
        };

        // absolute counts need every partition's local size
        let scope = match kind {
            SamplingKind::Percent(_) => scope,
            _ => SetScope::Global,
        };
        let sampled_set = self.sets.registry_mut().add_sampled(scope);
        let nonsampled_set = self.sets.registry_mut().add_sampled(scope);

        let sampled = match &def.sampled {
            Some(ensemble) => Some(Box::new(self.ensemble(ensemble, scope)?)),
            None => None,
        };
        let nonsampled = match &def.nonsampled {
            Some(ensemble) => Some(Box::new(self.ensemble(ensemble, scope)?)),
            None => None,
        };

        if sampled.is_none() && nonsampled.is_none() {
            return Err(Error::configuration("sampling without sampled or nonsampled ensemble"));
        }

        Ok(Sampling { kind, sampled_set, nonsampled_set, sampled, nonsampled })
    }
}
