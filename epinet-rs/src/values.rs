use crate::prelude::{Real, StateIndex};
use crate::traits::TraitValue;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// A typed scalar observed or assigned by conditions, operations and db
/// fields. Numbers carry a total order via `f64::total_cmp` so values can
/// live in sorted lists; equality follows the same order.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Value {
    Bool(bool),
    Number(Real),
    HealthState(StateIndex),
    Trait(TraitValue),
    Text(String),
}

impl Value {
    pub fn type_rank(&self) -> u8 {
        match self {
            Value::Bool(_) => 0,
            Value::Number(_) => 1,
            Value::HealthState(_) => 2,
            Value::Trait(_) => 3,
            Value::Text(_) => 4,
        }
    }

    pub fn as_number(&self) -> Option<Real> {
        match self {
            Value::Number(x) => Some(*x),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Number(x) => Some(*x != 0.0),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a.cmp(b),
            (Value::Number(a), Value::Number(b)) => a.total_cmp(b),
            (Value::HealthState(a), Value::HealthState(b)) => a.cmp(b),
            (Value::Trait(a), Value::Trait(b)) => a.cmp(b),
            (Value::Text(a), Value::Text(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(x) => write!(f, "{}", x),
            Value::HealthState(s) => write!(f, "state#{}", s),
            Value::Trait(t) => write!(f, "trait({:#x},{:#x})", t.mask, t.value),
            Value::Text(s) => write!(f, "{}", s),
        }
    }
}

/// The assignment operator of an operation on a numeric target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "=")]
    Assign,
    #[serde(rename = "+=")]
    Add,
    #[serde(rename = "-=")]
    Subtract,
    #[serde(rename = "*=")]
    Multiply,
    #[serde(rename = "/=")]
    Divide,
}

impl Operator {
    pub fn apply(&self, current: Real, value: Real) -> Real {
        match self {
            Operator::Assign => value,
            Operator::Add => current + value,
            Operator::Subtract => current - value,
            Operator::Multiply => current * value,
            Operator::Divide => {
                if value == 0.0 {
                    current
                } else {
                    current / value
                }
            }
        }
    }
}

/// The JSON reference form of a value. Health states and trait values are
/// symbolic here and resolved against the loaded model and trait registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueDef {
    Boolean(bool),
    Number(Real),
    HealthState(String),
    TraitValue {
        #[serde(rename = "trait")]
        trait_id: String,
        feature: String,
        #[serde(rename = "enum")]
        enum_id: String,
    },
    Text(String),
}

/// A sorted, duplicate-free list of values of one type. This is the unit the
/// set engine unions and intersects for db-field contents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Value>", into = "Vec<Value>")]
pub struct ValueList {
    values: Vec<Value>,
}

impl From<Vec<Value>> for ValueList {
    fn from(values: Vec<Value>) -> Self {
        ValueList::from_values(values)
    }
}

impl From<ValueList> for Vec<Value> {
    fn from(list: ValueList) -> Self {
        list.values
    }
}

impl ValueList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_values<I: IntoIterator<Item = Value>>(values: I) -> Self {
        let mut list = ValueList {
            values: values.into_iter().collect(),
        };
        list.values.sort();
        list.values.dedup();
        list
    }

    pub fn insert(&mut self, value: Value) {
        if let Err(pos) = self.values.binary_search(&value) {
            self.values.insert(pos, value);
        }
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.values.binary_search(value).is_ok()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<Value> {
        self.values.iter()
    }

    /// Sorted-merge union.
    pub fn union(&self, other: &ValueList) -> ValueList {
        let mut out = Vec::with_capacity(self.len() + other.len());
        let (mut i, mut j) = (0, 0);
        while i < self.values.len() && j < other.values.len() {
            match self.values[i].cmp(&other.values[j]) {
                Ordering::Less => {
                    out.push(self.values[i].clone());
                    i += 1;
                }
                Ordering::Greater => {
                    out.push(other.values[j].clone());
                    j += 1;
                }
                Ordering::Equal => {
                    out.push(self.values[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }
        out.extend_from_slice(&self.values[i..]);
        out.extend_from_slice(&other.values[j..]);
        ValueList { values: out }
    }

    /// Sorted-merge intersection.
    pub fn intersection(&self, other: &ValueList) -> ValueList {
        let mut out = Vec::new();
        let (mut i, mut j) = (0, 0);
        while i < self.values.len() && j < other.values.len() {
            match self.values[i].cmp(&other.values[j]) {
                Ordering::Less => i += 1,
                Ordering::Greater => j += 1,
                Ordering::Equal => {
                    out.push(self.values[i].clone());
                    i += 1;
                    j += 1;
                }
            }
        }
        ValueList { values: out }
    }
}

impl<'a> IntoIterator for &'a ValueList {
    type Item = &'a Value;
    type IntoIter = std::slice::Iter<'a, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list(xs: &[f64]) -> ValueList {
        ValueList::from_values(xs.iter().map(|x| Value::Number(*x)))
    }

    #[test]
    fn sorted_and_unique() {
        let l = list(&[3.0, 1.0, 2.0, 1.0]);
        assert_eq!(l.len(), 3);
        assert!(l.contains(&Value::Number(2.0)));
        assert!(!l.contains(&Value::Number(4.0)));
    }

    #[test]
    fn union_intersection() {
        let a = list(&[1.0, 2.0, 3.0]);
        let b = list(&[2.0, 3.0, 4.0]);
        assert_eq!(a.union(&b), list(&[1.0, 2.0, 3.0, 4.0]));
        assert_eq!(a.intersection(&b), list(&[2.0, 3.0]));

        // identities used by the set engine
        assert_eq!(a.union(&a), a);
        assert_eq!(a.intersection(&a), a);
        assert_eq!(a.union(&b), b.union(&a));
        assert_eq!(a.intersection(&b), b.intersection(&a));
    }
}
