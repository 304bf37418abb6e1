use crate::prelude::Real;
use crate::values::ValueDef;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetScope {
    Global,
    Local,
}

impl Default for SetScope {
    fn default() -> Self {
        SetScope::Local
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SetOpKind {
    Union,
    Intersection,
}

/// A named set declaration from the sets list of an initialization or
/// intervention document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SetDef {
    pub id: String,
    #[serde(default)]
    pub annotation: Option<String>,
    #[serde(default)]
    pub scope: SetScope,
    pub content: SetContentDef,
}

/// The algebraic expression tree of a set. The JSON layout keys decide the
/// variant: `operation` + `sets`, `set.idRef`, or `elementType`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SetContentDef {
    Operation(OperationDef),
    Reference(ReferenceDef),
    Selector(SelectorDef),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperationDef {
    pub operation: SetOpKind,
    pub sets: Vec<SetContentDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReferenceDef {
    pub set: IdRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdRef {
    pub id_ref: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ElementType {
    Node,
    Edge,
    DbField,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOp {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not in")]
    NotIn,
}

/// Left operand of a selector predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyRef {
    Node { node: NodeProperty },
    Edge { edge: EdgeProperty },
    Field { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeProperty {
    Id,
    HealthState,
    SusceptibilityFactor,
    InfectivityFactor,
    NodeTrait,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeProperty {
    TargetId,
    SourceId,
    TargetActivity,
    SourceActivity,
    LocationId,
    Duration,
    Weight,
    Active,
    EdgeTrait,
}

/// Right operand of a selector predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RightDef {
    Value {
        value: ValueDef,
    },
    ValueList {
        #[serde(rename = "valueList")]
        value_list: ValueListDef,
    },
    Set {
        set: IdRef,
    },
}

/// Literal value lists, grouped by type as they appear in JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueListDef {
    Boolean(Vec<bool>),
    Number(Vec<Real>),
    HealthState(Vec<String>),
    Text(Vec<String>),
}

/// An element selector: `elementType` plus an optional predicate. A node
/// selector without a predicate selects every local node; an edge selector
/// without one selects every local edge. A dbField selector names a person
/// trait table and field, optionally constrained by the predicate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectorDef {
    pub element_type: ElementType,
    #[serde(default)]
    pub scope: Option<SetScope>,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub field: Option<String>,
    #[serde(default)]
    pub left: Option<PropertyRef>,
    #[serde(default)]
    pub operator: Option<ComparisonOp>,
    #[serde(default)]
    pub right: Option<RightDef>,
}
