mod def;

pub use def::{
    ComparisonOp, EdgeProperty, ElementType, IdRef, NodeProperty, OperationDef, PropertyRef,
    ReferenceDef, RightDef, SelectorDef, SetContentDef, SetDef, SetOpKind, SetScope, ValueListDef,
};

use crate::db::{FieldQuery, PersonTraitDb};
use crate::disease::DiseaseModel;
use crate::error::{Error, Result};
use crate::network::Network;
use crate::prelude::{NodeId, Real};
use crate::traits::TraitRegistry;
use crate::values::{Value, ValueDef, ValueList};
use log::debug;
use std::collections::{HashMap, HashSet};

pub type SetId = usize;

/// A selector predicate with resolved operands.
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare(ComparisonOp, Value),
    InList { list: ValueList, negate: bool },
    InSet { set: SetId, negate: bool },
}

impl Predicate {
    fn holds_value(&self, value: &Value, store: &SetStore) -> bool {
        match self {
            Predicate::Compare(op, right) => compare_values(*op, value, right),
            Predicate::InList { list, negate } => list.contains(value) != *negate,
            Predicate::InSet { set, negate } => match value {
                Value::Number(x) => {
                    let id = *x as NodeId;
                    store.get(*set).contains_node(id) != *negate
                }
                _ => *negate,
            },
        }
    }

    fn holds_id(&self, id: NodeId, store: &SetStore) -> bool {
        match self {
            Predicate::InSet { set, negate } => store.get(*set).contains_node(id) != *negate,
            _ => self.holds_value(&Value::Number(id as Real), store),
        }
    }
}

fn compare_values(op: ComparisonOp, left: &Value, right: &Value) -> bool {
    match op {
        ComparisonOp::Eq => match (left, right) {
            // a packed word matches a trait value by mask
            (Value::Trait(l), Value::Trait(t)) => t.matches(l.value) || l == t,
            _ => left == right,
        },
        ComparisonOp::Ne => !compare_values(ComparisonOp::Eq, left, right),
        ComparisonOp::Lt => left < right,
        ComparisonOp::Le => left <= right,
        ComparisonOp::Gt => left > right,
        ComparisonOp::Ge => left >= right,
        ComparisonOp::In | ComparisonOp::NotIn => false,
    }
}

/// A resolved node selector.
#[derive(Debug, Clone)]
pub struct NodeSelector {
    pub property: NodeProperty,
    pub predicate: Option<Predicate>,
}

/// A resolved edge selector.
#[derive(Debug, Clone)]
pub struct EdgeSelector {
    pub property: EdgeProperty,
    pub predicate: Option<Predicate>,
}

/// A resolved db-field selector.
#[derive(Debug, Clone)]
pub struct DbSelector {
    pub table: String,
    pub field: String,
    pub constraint: Option<ValueList>,
    pub negate: bool,
}

/// The resolved variants of set content.
#[derive(Debug, Clone)]
pub enum ResolvedContent {
    NodeSelector(NodeSelector),
    EdgeSelector(EdgeSelector),
    DbSelector(DbSelector),
    Operation { op: SetOpKind, operands: Vec<SetId> },
    Reference(SetId),
    /// Filled externally by ensemble sampling; never interned.
    Sampled,
}

#[derive(Debug, Clone)]
pub struct ResolvedSet {
    pub name: Option<String>,
    pub scope: SetScope,
    pub content: ResolvedContent,
    /// Statically determined content, evaluated once at initialization.
    pub compute_once: bool,
}

impl ResolvedSet {
    /// Set ids this set reads; the dependency graph orders them first.
    pub fn prerequisites(&self) -> Vec<SetId> {
        match &self.content {
            ResolvedContent::Operation { operands, .. } => operands.clone(),
            ResolvedContent::Reference(target) => vec![*target],
            ResolvedContent::NodeSelector(NodeSelector {
                predicate: Some(Predicate::InSet { set, .. }),
                ..
            })
            | ResolvedContent::EdgeSelector(EdgeSelector {
                predicate: Some(Predicate::InSet { set, .. }),
                ..
            }) => vec![*set],
            _ => vec![],
        }
    }
}

/// All sets of a run, interned by structural fingerprint so identical JSON
/// expressions share one computable.
#[derive(Debug, Clone, Default)]
pub struct SetRegistry {
    sets: Vec<ResolvedSet>,
    by_name: HashMap<String, SetId>,
    intern: HashMap<String, SetId>,
}

impl SetRegistry {
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn get(&self, id: SetId) -> &ResolvedSet {
        &self.sets[id]
    }

    pub fn by_name(&self, name: &str) -> Option<SetId> {
        self.by_name.get(name).copied()
    }

    pub fn require(&self, name: &str) -> Result<SetId> {
        self.by_name(name)
            .ok_or_else(|| Error::semantic(format!("unresolved set id '{}'", name)))
    }

    pub fn scope(&self, id: SetId) -> SetScope {
        self.sets[id].scope
    }

    /// Force a set and, transitively, its operands to global scope.
    pub fn promote_global(&mut self, id: SetId) {
        if self.sets[id].scope == SetScope::Global {
            return;
        }
        self.sets[id].scope = SetScope::Global;
        for operand in self.sets[id].prerequisites() {
            self.promote_global(operand);
        }
    }

    /// Register a sampled view; sampled contents are written directly by the
    /// sampling pass and are never interned.
    pub fn add_sampled(&mut self, scope: SetScope) -> SetId {
        self.sets.push(ResolvedSet {
            name: None,
            scope,
            content: ResolvedContent::Sampled,
            compute_once: false,
        });
        self.sets.len() - 1
    }

    pub fn ids(&self) -> impl Iterator<Item = SetId> {
        0..self.sets.len()
    }
}

/// Context needed to resolve symbolic references inside set definitions.
pub struct ResolveContext<'a> {
    pub model: &'a DiseaseModel,
    pub traits: &'a TraitRegistry,
}

impl<'a> ResolveContext<'a> {
    pub fn value(&self, def: &ValueDef) -> Result<Value> {
        match def {
            ValueDef::Boolean(b) => Ok(Value::Bool(*b)),
            ValueDef::Number(x) => Ok(Value::Number(*x)),
            ValueDef::Text(s) => Ok(Value::Text(s.clone())),
            ValueDef::HealthState(id) => self
                .model
                .state_index(id)
                .map(Value::HealthState)
                .ok_or_else(|| Error::semantic(format!("unknown health state '{}'", id))),
            ValueDef::TraitValue { trait_id, feature, enum_id } => {
                let t = self.traits.require(trait_id)?;
                let f = t.feature(feature).ok_or_else(|| {
                    Error::semantic(format!("trait '{}': unknown feature '{}'", trait_id, feature))
                })?;
                f.value_by_id(enum_id).map(Value::Trait).ok_or_else(|| {
                    Error::semantic(format!(
                        "trait '{}': feature '{}': unknown enum '{}'",
                        trait_id, feature, enum_id
                    ))
                })
            }
        }
    }

    pub fn value_list(&self, def: &ValueListDef) -> Result<ValueList> {
        let values: Result<Vec<Value>> = match def {
            ValueListDef::Boolean(bs) => Ok(bs.iter().map(|b| Value::Bool(*b)).collect()),
            ValueListDef::Number(xs) => Ok(xs.iter().map(|x| Value::Number(*x)).collect()),
            ValueListDef::Text(ss) => Ok(ss.iter().map(|s| Value::Text(s.clone())).collect()),
            ValueListDef::HealthState(ids) => ids
                .iter()
                .map(|id| {
                    self.model
                        .state_index(id)
                        .map(Value::HealthState)
                        .ok_or_else(|| Error::semantic(format!("unknown health state '{}'", id)))
                })
                .collect(),
        };
        Ok(ValueList::from_values(values?))
    }
}

/// Builds the registry from named definitions and ad-hoc content expressions
/// (intervention targets), interning structurally identical expressions.
pub struct SetResolver<'a> {
    ctx: ResolveContext<'a>,
    named: HashMap<String, SetDef>,
    registry: SetRegistry,
    resolving: HashSet<String>,
}

impl<'a> SetResolver<'a> {
    pub fn new(ctx: ResolveContext<'a>, named_defs: &[SetDef]) -> Self {
        let named = named_defs
            .iter()
            .map(|def| (def.id.clone(), def.clone()))
            .collect();
        SetResolver {
            ctx,
            named,
            registry: SetRegistry::default(),
            resolving: HashSet::new(),
        }
    }

    pub fn finish(self) -> SetRegistry {
        self.registry
    }

    pub fn registry(&self) -> &SetRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut SetRegistry {
        &mut self.registry
    }

    pub fn ctx(&self) -> &ResolveContext<'a> {
        &self.ctx
    }

    /// Resolve every named set, in declaration-independent order.
    pub fn resolve_all_named(&mut self) -> Result<()> {
        let mut names: Vec<String> = self.named.keys().cloned().collect();
        names.sort();
        for name in names {
            self.resolve_named(&name)?;
        }
        Ok(())
    }

    pub fn resolve_named(&mut self, name: &str) -> Result<SetId> {
        if let Some(id) = self.registry.by_name(name) {
            return Ok(id);
        }
        if !self.resolving.insert(name.to_string()) {
            return Err(Error::semantic(format!("circular set reference through '{}'", name)));
        }

        let def = self
            .named
            .get(name)
            .cloned()
            .ok_or_else(|| Error::semantic(format!("unresolved set id '{}'", name)))?;

        let id = self.resolve(&def.content, def.scope)?;
        self.resolving.remove(name);

        if self.registry.sets[id].name.is_none() {
            self.registry.sets[id].name = Some(name.to_string());
        }
        self.registry.by_name.insert(name.to_string(), id);
        Ok(id)
    }

    /// Resolve one content expression under the requested scope. Identical
    /// expressions yield the same id; a global request promotes an existing
    /// local entry and its operands.
    pub fn resolve(&mut self, def: &SetContentDef, scope: SetScope) -> Result<SetId> {
        let key = serde_json::to_string(def)?;
        if let Some(&id) = self.registry.intern.get(&key) {
            if scope == SetScope::Global {
                self.registry.promote_global(id);
            }
            return Ok(id);
        }

        let (content, scope) = match def {
            SetContentDef::Reference(reference) => {
                let target = self.resolve_named(&reference.set.id_ref)?;
                let scope = match (scope, self.registry.scope(target)) {
                    (SetScope::Global, _) | (_, SetScope::Global) => SetScope::Global,
                    _ => SetScope::Local,
                };
                (ResolvedContent::Reference(target), scope)
            }
            SetContentDef::Operation(operation) => {
                let mut operands = Vec::with_capacity(operation.sets.len());
                for operand in &operation.sets {
                    operands.push(self.resolve(operand, scope)?);
                }
                if operands.is_empty() {
                    return Err(Error::semantic("set operation without operands"));
                }
                (ResolvedContent::Operation { op: operation.operation, operands }, scope)
            }
            SetContentDef::Selector(selector) => {
                let scope = selector.scope.unwrap_or(scope);
                (self.resolve_selector(selector)?, scope)
            }
        };

        let compute_once = matches!(content, ResolvedContent::DbSelector(_));
        let id = self.registry.sets.len();
        self.registry.sets.push(ResolvedSet {
            name: None,
            scope,
            content,
            compute_once,
        });
        self.registry.intern.insert(key, id);
        if scope == SetScope::Global {
            self.registry.promote_global(id);
        }
        debug!("set #{} resolved ({:?})", id, scope);
        Ok(id)
    }

    fn resolve_predicate(
        &mut self,
        operator: Option<ComparisonOp>,
        right: Option<&RightDef>,
    ) -> Result<Option<Predicate>> {
        let operator = match operator {
            Some(op) => op,
            None => return Ok(None),
        };
        let right = right.ok_or_else(|| Error::configuration("selector operator without right operand"))?;

        let negate = operator == ComparisonOp::NotIn;
        match (operator, right) {
            (ComparisonOp::In, RightDef::Set { set }) | (ComparisonOp::NotIn, RightDef::Set { set }) => {
                let target = self.resolve_named(&set.id_ref)?;
                Ok(Some(Predicate::InSet { set: target, negate }))
            }
            (ComparisonOp::In, RightDef::ValueList { value_list })
            | (ComparisonOp::NotIn, RightDef::ValueList { value_list }) => {
                let list = self.ctx.value_list(value_list)?;
                Ok(Some(Predicate::InList { list, negate }))
            }
            (op, RightDef::Value { value }) => {
                let value = self.ctx.value(value)?;
                Ok(Some(Predicate::Compare(op, value)))
            }
            _ => Err(Error::configuration("selector operand does not match its operator")),
        }
    }

    fn resolve_selector(&mut self, selector: &SelectorDef) -> Result<ResolvedContent> {
        match selector.element_type {
            ElementType::Node => {
                let property = match &selector.left {
                    Some(PropertyRef::Node { node }) => *node,
                    None => NodeProperty::Id,
                    _ => return Err(Error::configuration("node selector needs a node property")),
                };
                let predicate = self.resolve_predicate(selector.operator, selector.right.as_ref())?;
                Ok(ResolvedContent::NodeSelector(NodeSelector { property, predicate }))
            }
            ElementType::Edge => {
                let property = match &selector.left {
                    Some(PropertyRef::Edge { edge }) => *edge,
                    None => EdgeProperty::TargetId,
                    _ => return Err(Error::configuration("edge selector needs an edge property")),
                };
                let predicate = self.resolve_predicate(selector.operator, selector.right.as_ref())?;
                Ok(ResolvedContent::EdgeSelector(EdgeSelector { property, predicate }))
            }
            ElementType::DbField => {
                let table = selector
                    .table
                    .clone()
                    .ok_or_else(|| Error::configuration("dbField selector needs a table"))?;
                let field = match (&selector.field, &selector.left) {
                    (Some(field), _) => field.clone(),
                    (None, Some(PropertyRef::Field { field })) => field.clone(),
                    _ => return Err(Error::configuration("dbField selector needs a field")),
                };
                let (constraint, negate) =
                    match self.resolve_predicate(selector.operator, selector.right.as_ref())? {
                        None => (None, false),
                        Some(Predicate::InList { list, negate }) => (Some(list), negate),
                        Some(Predicate::Compare(ComparisonOp::Eq, value)) => {
                            (Some(ValueList::from_values(vec![value])), false)
                        }
                        Some(Predicate::Compare(ComparisonOp::Ne, value)) => {
                            (Some(ValueList::from_values(vec![value])), true)
                        }
                        Some(_) => {
                            return Err(Error::configuration(
                                "dbField selector supports ==, != and (not) in",
                            ))
                        }
                    };
                Ok(ResolvedContent::DbSelector(DbSelector { table, field, constraint, negate }))
            }
        }
    }
}

/// One partition's computed content of one set: sorted unique node ids,
/// sorted local edge indices, and observed db-field values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SetContent {
    pub nodes: Vec<NodeId>,
    pub edges: Vec<usize>,
    pub values: ValueList,
}

impl SetContent {
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.binary_search(&id).is_ok()
    }

    /// Count of member nodes owned by this partition.
    pub fn local_node_count(&self, network: &Network) -> usize {
        let begin = self.nodes.partition_point(|&id| id < network.first_local());
        let end = self.nodes.partition_point(|&id| id < network.beyond_local());
        end - begin
    }

    /// Local size: owned nodes plus owned edges plus values. Value lists of
    /// global sets are replicated on every partition, so only rank 0 counts
    /// them.
    pub fn local_size(&self, network: &Network) -> usize {
        let values = if network.rank() == 0 { self.values.len() } else { 0 };
        self.local_node_count(network) + self.edges.len() + values
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.edges.clear();
        self.values = ValueList::new();
    }
}

/// Per-partition storage of computed set contents, indexed by set id.
#[derive(Debug, Clone, Default)]
pub struct SetStore {
    contents: Vec<SetContent>,
}

impl SetStore {
    pub fn new(sets: usize) -> Self {
        SetStore {
            contents: vec![SetContent::default(); sets],
        }
    }

    /// Grow to cover sets registered after construction (sampled views).
    pub fn ensure(&mut self, sets: usize) {
        if self.contents.len() < sets {
            self.contents.resize(sets, SetContent::default());
        }
    }

    pub fn get(&self, id: SetId) -> &SetContent {
        &self.contents[id]
    }

    pub fn get_mut(&mut self, id: SetId) -> &mut SetContent {
        &mut self.contents[id]
    }

    pub fn put(&mut self, id: SetId, content: SetContent) {
        self.contents[id] = content;
    }
}

/// Compute one set's content for one partition, reading operand contents
/// from the store. The dependency graph guarantees operands are fresh.
pub fn compute_set_local(
    id: SetId,
    registry: &SetRegistry,
    network: &Network,
    db: &dyn PersonTraitDb,
    store: &mut SetStore,
) -> Result<()> {
    let set = registry.get(id);
    let mut content = SetContent::default();

    match &set.content {
        ResolvedContent::Sampled => return Ok(()),
        ResolvedContent::Reference(target) => {
            content = store.get(*target).clone();
        }
        ResolvedContent::NodeSelector(selector) => {
            for node in network.nodes() {
                let keep = match &selector.predicate {
                    None => true,
                    Some(predicate) => match selector.property {
                        NodeProperty::Id => predicate.holds_id(node.id, store),
                        NodeProperty::HealthState => {
                            predicate.holds_value(&Value::HealthState(node.state), store)
                        }
                        NodeProperty::SusceptibilityFactor => predicate
                            .holds_value(&Value::Number(node.susceptibility_factor), store),
                        NodeProperty::InfectivityFactor => {
                            predicate.holds_value(&Value::Number(node.infectivity_factor), store)
                        }
                        NodeProperty::NodeTrait => match &selector.predicate {
                            Some(Predicate::Compare(ComparisonOp::Eq, Value::Trait(t))) => {
                                t.matches(node.traits)
                            }
                            Some(Predicate::Compare(ComparisonOp::Ne, Value::Trait(t))) => {
                                !t.matches(node.traits)
                            }
                            _ => false,
                        },
                    },
                };
                if keep {
                    content.nodes.push(node.id);
                }
            }
        }
        ResolvedContent::EdgeSelector(selector) => {
            for (index, edge) in network.edges().iter().enumerate() {
                let keep = match &selector.predicate {
                    None => true,
                    Some(predicate) => match selector.property {
                        EdgeProperty::TargetId => predicate.holds_id(edge.target, store),
                        EdgeProperty::SourceId => predicate.holds_id(edge.source, store),
                        EdgeProperty::TargetActivity => match predicate {
                            Predicate::Compare(ComparisonOp::Eq, Value::Trait(t)) => {
                                t.matches(edge.target_activity)
                            }
                            Predicate::Compare(ComparisonOp::Ne, Value::Trait(t)) => {
                                !t.matches(edge.target_activity)
                            }
                            _ => false,
                        },
                        EdgeProperty::SourceActivity => match predicate {
                            Predicate::Compare(ComparisonOp::Eq, Value::Trait(t)) => {
                                t.matches(edge.source_activity)
                            }
                            Predicate::Compare(ComparisonOp::Ne, Value::Trait(t)) => {
                                !t.matches(edge.source_activity)
                            }
                            _ => false,
                        },
                        EdgeProperty::EdgeTrait => match predicate {
                            Predicate::Compare(ComparisonOp::Eq, Value::Trait(t)) => {
                                t.matches(edge.edge_trait)
                            }
                            Predicate::Compare(ComparisonOp::Ne, Value::Trait(t)) => {
                                !t.matches(edge.edge_trait)
                            }
                            _ => false,
                        },
                        EdgeProperty::LocationId => predicate.holds_value(
                            &Value::Number(edge.location_id.unwrap_or(0) as Real),
                            store,
                        ),
                        EdgeProperty::Duration => {
                            predicate.holds_value(&Value::Number(edge.duration), store)
                        }
                        EdgeProperty::Weight => {
                            predicate.holds_value(&Value::Number(edge.weight), store)
                        }
                        EdgeProperty::Active => {
                            predicate.holds_value(&Value::Bool(edge.active), store)
                        }
                    },
                };
                if keep {
                    content.edges.push(index);
                }
            }
        }
        ResolvedContent::DbSelector(selector) => {
            let rows = db.fetch(&FieldQuery {
                table: selector.table.clone(),
                field: selector.field.clone(),
                constraint: selector.constraint.clone(),
                negate: selector.negate,
            })?;
            let mut values = Vec::with_capacity(rows.len());
            for row in rows {
                if network.is_local(row.pid) && network.node_index(row.pid).is_some() {
                    content.nodes.push(row.pid);
                }
                values.push(row.value);
            }
            content.nodes.sort_unstable();
            content.nodes.dedup();
            content.values = ValueList::from_values(values);
        }
        ResolvedContent::Operation { op, operands } => {
            let mut iter = operands.iter();
            let first = iter
                .next()
                .ok_or_else(|| Error::semantic("set operation without operands"))?;
            content = store.get(*first).clone();
            for operand in iter {
                let other = store.get(*operand);
                content = match op {
                    SetOpKind::Union => SetContent {
                        nodes: merge_union(&content.nodes, &other.nodes),
                        edges: merge_union(&content.edges, &other.edges),
                        values: content.values.union(&other.values),
                    },
                    SetOpKind::Intersection => SetContent {
                        nodes: merge_intersection(&content.nodes, &other.nodes),
                        edges: merge_intersection(&content.edges, &other.edges),
                        values: content.values.intersection(&other.values),
                    },
                };
            }
        }
    }

    store.put(id, content);
    Ok(())
}

/// Merge the per-partition node memberships of a global-scope set so every
/// partition agrees on the full (sorted) membership, and union the values.
pub fn synchronize_global(id: SetId, stores: &mut [SetStore]) {
    let mut nodes: Vec<NodeId> = Vec::new();
    let mut values = ValueList::new();
    for store in stores.iter() {
        nodes = merge_union(&nodes, &store.get(id).nodes);
        values = values.union(&store.get(id).values);
    }
    for store in stores.iter_mut() {
        let content = store.get_mut(id);
        content.nodes = nodes.clone();
        content.values = values.clone();
    }
}

pub fn merge_union<T: Ord + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len() + b.len());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => {
                out.push(a[i]);
                i += 1;
            }
            std::cmp::Ordering::Greater => {
                out.push(b[j]);
                j += 1;
            }
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out.extend_from_slice(&a[i..]);
    out.extend_from_slice(&b[j..]);
    out
}

pub fn merge_intersection<T: Ord + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::NoDb;
    use crate::network::{Boundary, EdgeData};
    use crate::traits::TraitRegistry;

    fn model() -> DiseaseModel {
        DiseaseModel::parse(crate::disease::tests::sir_json()).unwrap()
    }

    fn network() -> Network {
        let mut edges = vec![
            EdgeData::new(1, 2),
            EdgeData::new(2, 1),
            EdgeData::new(2, 3),
            EdgeData::new(3, 1),
        ];
        edges.sort_by(|a, b| a.compare(b));
        Network::build(
            0,
            Boundary { first: 1, beyond: 4, edges_begin: 0, edges_end: 4 },
            edges,
            86400.0,
            &[],
        )
    }

    fn resolver<'a>(model: &'a DiseaseModel, traits: &'a TraitRegistry, defs: &[SetDef]) -> SetResolver<'a> {
        SetResolver::new(ResolveContext { model, traits }, defs)
    }

    #[test]
    fn interning_reuses_identical_expressions() {
        let model = model();
        let traits = TraitRegistry::new();
        let mut resolver = resolver(&model, &traits, &[]);

        let def: SetContentDef = serde_json::from_str(
            r#"{"elementType": "node", "left": {"node": "healthState"},
                "operator": "==", "right": {"value": {"healthState": "I"}}}"#,
        )
        .unwrap();

        let a = resolver.resolve(&def, SetScope::Local).unwrap();
        let b = resolver.resolve(&def, SetScope::Local).unwrap();
        assert_eq!(a, b);
        assert_eq!(resolver.registry().len(), 1);
    }

    #[test]
    fn scope_propagates_to_operands() {
        let model = model();
        let traits = TraitRegistry::new();
        let defs: Vec<SetDef> = serde_json::from_str(
            r#"[
              {"id": "infectious", "scope": "local", "content":
                {"elementType": "node", "left": {"node": "healthState"},
                 "operator": "==", "right": {"value": {"healthState": "I"}}}},
              {"id": "both", "scope": "global", "content":
                {"operation": "union", "sets": [
                  {"set": {"idRef": "infectious"}},
                  {"elementType": "node"}
                ]}}
            ]"#,
        )
        .unwrap();
        let mut resolver = resolver(&model, &traits, &defs);
        resolver.resolve_all_named().unwrap();
        let registry = resolver.finish();

        let both = registry.by_name("both").unwrap();
        assert_eq!(registry.scope(both), SetScope::Global);
        let infectious = registry.by_name("infectious").unwrap();
        assert_eq!(registry.scope(infectious), SetScope::Global);
    }

    #[test]
    fn circular_references_error() {
        let model = model();
        let traits = TraitRegistry::new();
        let defs: Vec<SetDef> = serde_json::from_str(
            r#"[
              {"id": "a", "content": {"set": {"idRef": "b"}}},
              {"id": "b", "content": {"set": {"idRef": "a"}}}
            ]"#,
        )
        .unwrap();
        let mut resolver = resolver(&model, &traits, &defs);
        assert!(resolver.resolve_all_named().is_err());
    }

    fn compute_all(registry: &SetRegistry, network: &Network, store: &mut SetStore) {
        // registration order is already dependency order for these tests
        for id in registry.ids() {
            compute_set_local(id, registry, network, &NoDb, store).unwrap();
        }
    }

    #[test]
    fn selectors_and_operations() {
        let model = model();
        let traits = TraitRegistry::new();
        let defs: Vec<SetDef> = serde_json::from_str(
            r#"[
              {"id": "population", "content":
                {"elementType": "node", "left": {"node": "id"},
                 "operator": "in", "right": {"valueList": {"number": [1, 2]}}}},
              {"id": "edges_into", "content":
                {"elementType": "edge", "left": {"edge": "targetId"},
                 "operator": "in", "right": {"set": {"idRef": "population"}}}},
              {"id": "edges_outof", "content":
                {"elementType": "edge", "left": {"edge": "sourceId"},
                 "operator": "not in", "right": {"set": {"idRef": "population"}}}}
            ]"#,
        )
        .unwrap();
        let mut resolver = resolver(&model, &traits, &defs);
        resolver.resolve_all_named().unwrap();
        let registry = resolver.finish();

        let network = network();
        let mut store = SetStore::new(registry.len());
        compute_all(&registry, &network, &mut store);

        let population = registry.by_name("population").unwrap();
        assert_eq!(store.get(population).nodes, vec![1, 2]);

        // edges: (1,2), (2,1), (2,3), (3,1) sorted by (target, source)
        let into = registry.by_name("edges_into").unwrap();
        assert_eq!(store.get(into).edges.len(), 3);

        let outof = registry.by_name("edges_outof").unwrap();
        assert_eq!(store.get(outof).edges.len(), 1);
    }

    #[test]
    fn algebra_laws() {
        let a = vec![1u64, 3, 5];
        let b = vec![2u64, 3, 4];
        let c = vec![3u64, 4, 5];

        assert_eq!(merge_union(&a, &a), a);
        assert_eq!(merge_intersection(&a, &a), a);
        assert_eq!(merge_union(&a, &b), merge_union(&b, &a));
        assert_eq!(merge_intersection(&a, &b), merge_intersection(&b, &a));

        let left = merge_intersection(&merge_union(&a, &b), &c);
        let right = merge_union(&merge_intersection(&a, &c), &merge_intersection(&b, &c));
        assert_eq!(left, right);
    }

    #[test]
    fn global_sync_agrees() {
        let mut left = SetStore::new(1);
        let mut right = SetStore::new(1);
        left.get_mut(0).nodes = vec![1, 2];
        right.get_mut(0).nodes = vec![2, 9];

        let mut stores = vec![left, right];
        synchronize_global(0, &mut stores);
        assert_eq!(stores[0].get(0).nodes, vec![1, 2, 9]);
        assert_eq!(stores[1].get(0).nodes, vec![1, 2, 9]);
    }
}
