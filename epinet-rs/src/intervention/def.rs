use crate::compute::ObservableDef;
use crate::prelude::Real;
use crate::sets::{
    ComparisonOp, EdgeProperty, IdRef, NodeProperty, SetContentDef, SetDef, ValueListDef,
};
use crate::values::{Operator, ValueDef};
use crate::variables::VariableDef;
use serde::{Deserialize, Serialize};

/// JSON form of a condition operand.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperandDef {
    Value { value: ValueDef },
    Variable { variable: IdRef },
    Observable { observable: ObservableDef },
    SizeOf { sizeof: SizeOfRef },
    /// Property of the element a forEach action is bound to.
    Node { node: NodeProperty },
    Edge { edge: EdgeProperty },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SizeOfRef {
    pub set: IdRef,
}

/// JSON form of a boolean condition expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionDef {
    Fixed {
        value: bool,
    },
    Comparison {
        left: OperandDef,
        operator: ComparisonOp,
        right: OperandDef,
    },
    InList {
        left: OperandDef,
        operator: ComparisonOp,
        #[serde(rename = "valueList")]
        value_list: ValueListDef,
    },
    And {
        and: Vec<ConditionDef>,
    },
    Or {
        or: Vec<ConditionDef>,
    },
    Not {
        not: Box<ConditionDef>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum StatePropertyDef {
    Susceptibility,
    Infectivity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ModelPropertyDef {
    Transmissibility,
    #[serde(alias = "probability")]
    Propensity,
    DwellTime,
    SusceptibilityFactorOperation,
    InfectivityFactorOperation,
}

/// JSON form of an operation target. Besides nodes, edges and variables,
/// operations may edit the disease model itself: state baselines,
/// transmission and progression properties.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationTargetDef {
    Node {
        node: NodeProperty,
    },
    Edge {
        edge: EdgeProperty,
    },
    Variable {
        variable: IdRef,
    },
    HealthState {
        #[serde(rename = "healthState")]
        health_state: String,
        property: StatePropertyDef,
    },
    Transmission {
        transmission: String,
        property: ModelPropertyDef,
    },
    Progression {
        progression: String,
        property: ModelPropertyDef,
    },
}

/// JSON form of an operation's right-hand side: a plain value, a factor
/// operation (null clears the installed one), or a dwell-time distribution.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OperationValueDef {
    FactorOperation {
        #[serde(rename = "factorOperation")]
        factor_operation: Option<crate::disease::FactorOperation>,
    },
    DwellTime {
        #[serde(rename = "dwellTime")]
        dwell_time: crate::disease::Distribution,
    },
    Value(ValueDef),
}

fn assign() -> Operator {
    Operator::Assign
}

/// JSON form of a single operation inside an action definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDef {
    pub target: OperationTargetDef,
    #[serde(default = "assign")]
    pub operator: Operator,
    pub value: OperationValueDef,
}

/// JSON form of an action definition: priority, scheduling delay, an
/// optional gating condition, and the operations to execute.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinitionDef {
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default)]
    pub delay: u32,
    #[serde(default)]
    pub condition: Option<ConditionDef>,
    pub operations: Vec<OperationDef>,
}

fn default_priority() -> u32 {
    1
}

/// JSON form of a sampling specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SamplingDef {
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(flatten)]
    pub kind: SamplingKindDef,
    #[serde(default)]
    pub sampled: Option<Box<ActionEnsembleDef>>,
    #[serde(default, alias = "nonSampled")]
    pub nonsampled: Option<Box<ActionEnsembleDef>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SamplingKindDef {
    /// Independent per-item Bernoulli with probability percent/100.
    Percent { percent: Real },
    /// Absolute count across all partitions, met exactly.
    Count { count: u64 },
    /// Absolute count read from a variable when the ensemble fires.
    Variable { variable: IdRef },
}

/// JSON form of the `{once, foreach, sampling}` trio.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActionEnsembleDef {
    #[serde(default)]
    pub once: Vec<ActionDefinitionDef>,
    #[serde(default, rename = "foreach")]
    pub for_each: Vec<ActionDefinitionDef>,
    #[serde(default)]
    pub sampling: Option<SamplingDef>,
}

/// One initialization: a target set and the ensemble applied to it, run
/// exactly once before the first tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InitializationDef {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub annotation: Option<String>,
    pub target: SetContentDef,
    #[serde(flatten)]
    pub ensemble: ActionEnsembleDef,
}

/// A trigger: a condition over global computables plus the interventions it
/// fires.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TriggerDef {
    #[serde(default)]
    pub annotation: Option<String>,
    pub trigger: ConditionDef,
    pub intervention_ids: Vec<String>,
}

/// The initialization document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitializationDoc {
    #[serde(default)]
    pub sets: Vec<SetDef>,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub initializations: Vec<InitializationDef>,
}

/// The intervention document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InterventionDoc {
    #[serde(default)]
    pub sets: Vec<SetDef>,
    #[serde(default)]
    pub variables: Vec<VariableDef>,
    #[serde(default)]
    pub triggers: Vec<TriggerDef>,
    #[serde(default)]
    pub interventions: Vec<InitializationDef>,
}
