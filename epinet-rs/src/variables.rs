use crate::error::{Error, Result};
use crate::plane::Context;
use crate::prelude::{Real, Tick};
use crate::values::Operator;
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VariableScope {
    Global,
    Local,
}

/// JSON form of a variable declaration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VariableDef {
    pub id: String,
    #[serde(default)]
    pub annotation: Option<String>,
    pub scope: VariableScope,
    pub initial_value: Real,
    /// Reset to the initial value every `reset` ticks; absent means never.
    #[serde(default)]
    pub reset: Option<u32>,
}

/// A named scalar. Global variables hold one master value every partition
/// agrees on; local variables hold one value per partition.
#[derive(Debug, Clone)]
pub struct Variable {
    id: String,
    scope: VariableScope,
    initial: Real,
    reset: Option<u32>,
    value: Context<Real>,
    changed: bool,
}

impl Variable {
    fn new(def: &VariableDef, ranks: usize) -> Self {
        Variable {
            id: def.id.clone(),
            scope: def.scope,
            initial: def.initial_value,
            reset: def.reset,
            value: Context::new(def.initial_value, ranks),
            changed: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn scope(&self) -> VariableScope {
        self.scope
    }

    pub fn value(&self, rank: usize) -> Real {
        match self.scope {
            VariableScope::Global => *self.value.master(),
            VariableScope::Local => *self.value.slot(rank),
        }
    }

    pub fn modify(&mut self, rank: usize, operator: Operator, operand: Real) {
        let slot = match self.scope {
            VariableScope::Global => self.value.master_mut(),
            VariableScope::Local => self.value.slot_mut(rank),
        };
        *slot = operator.apply(*slot, operand);
        self.changed = true;
    }

    fn reset(&mut self, force: bool, tick: Tick) {
        let due = match self.reset {
            Some(every) if every > 0 => tick >= 0 && (tick as u32) % every == 0,
            _ => false,
        };
        if force || due {
            *self.value.master_mut() = self.initial;
            self.value.publish();
            self.changed = false;
        }
    }
}

/// The variable registry of a run.
#[derive(Debug, Clone, Default)]
pub struct VariableList {
    variables: Vec<Variable>,
    by_id: HashMap<String, usize>,
}

impl VariableList {
    pub fn new(defs: &[VariableDef], ranks: usize) -> Result<VariableList> {
        let mut list = VariableList::default();
        for def in defs {
            if list.by_id.contains_key(&def.id) {
                return Err(Error::semantic(format!("duplicate variable '{}'", def.id)));
            }
            list.by_id.insert(def.id.clone(), list.variables.len());
            list.variables.push(Variable::new(def, ranks));
        }
        Ok(list)
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variables.is_empty()
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.by_id.get(id).copied()
    }

    pub fn require(&self, id: &str) -> Result<usize> {
        self.index_of(id)
            .ok_or_else(|| Error::semantic(format!("unknown variable '{}'", id)))
    }

    pub fn get(&self, index: usize) -> &Variable {
        &self.variables[index]
    }

    pub fn value(&self, index: usize, rank: usize) -> Real {
        self.variables[index].value(rank)
    }

    pub fn modify(&mut self, index: usize, rank: usize, operator: Operator, operand: Real) {
        self.variables[index].modify(rank, operator, operand);
    }

    /// Reset variables to their initial values: all of them when `force`,
    /// otherwise those whose reset interval divides the tick.
    pub fn reset_all(&mut self, force: bool, tick: Tick) {
        for variable in &mut self.variables {
            variable.reset(force, tick);
        }
    }

    /// End-of-phase synchronization: every partition observes the agreed
    /// master value of changed global variables.
    pub fn synchronize_changed(&mut self) {
        for variable in &mut self.variables {
            if variable.changed {
                if variable.scope == VariableScope::Global {
                    let master = *variable.value.master();
                    variable.value.publish();
                    debug!("variable '{}' synchronized to {}", variable.id, master);
                }
                variable.changed = false;
            }
        }
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.variables.iter().map(|v| v.id())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn defs() -> Vec<VariableDef> {
        serde_json::from_str(
            r#"[
              {"id": "edges_cut", "scope": "global", "initialValue": 0.0},
              {"id": "daily_budget", "scope": "local", "initialValue": 10.0, "reset": 1}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn scopes() {
        let mut vars = VariableList::new(&defs(), 2).unwrap();
        let g = vars.require("edges_cut").unwrap();
        let l = vars.require("daily_budget").unwrap();

        vars.modify(g, 1, Operator::Add, 5.0);
        assert_eq!(vars.value(g, 0), 5.0);
        assert_eq!(vars.value(g, 1), 5.0);

        vars.modify(l, 0, Operator::Subtract, 4.0);
        assert_eq!(vars.value(l, 0), 6.0);
        assert_eq!(vars.value(l, 1), 10.0);
    }

    #[test]
    fn reset_policy() {
        let mut vars = VariableList::new(&defs(), 1).unwrap();
        let g = vars.require("edges_cut").unwrap();
        let l = vars.require("daily_budget").unwrap();

        vars.modify(g, 0, Operator::Assign, 3.0);
        vars.modify(l, 0, Operator::Assign, 3.0);

        // tick reset only touches variables with an interval
        vars.reset_all(false, 5);
        assert_eq!(vars.value(g, 0), 3.0);
        assert_eq!(vars.value(l, 0), 10.0);

        vars.reset_all(true, 5);
        assert_eq!(vars.value(g, 0), 0.0);
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut d = defs();
        d.push(d[0].clone());
        assert!(VariableList::new(&d, 1).is_err());
    }
}
