use crate::error::{Error, Result};
use crate::prelude::NodeId;
use crate::values::{Value, ValueList};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A query against one person-trait table: select `field` (and the person
/// id) from `table`, optionally constrained to rows whose `field` relates to
/// `constraint` under `in_list`.
#[derive(Debug, Clone)]
pub struct FieldQuery {
    pub table: String,
    pub field: String,
    pub constraint: Option<ValueList>,
    pub negate: bool,
}

/// One row of a query result: the person id plus the selected field value.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldRow {
    pub pid: NodeId,
    pub value: Value,
}

/// Read-only access to the person-trait database, queried during
/// initialization only. The PostgreSQL implementation is an external
/// collaborator; the engine is written against this interface so it can be
/// driven by the in-memory fake below.
pub trait PersonTraitDb: Send + Sync {
    fn fetch(&self, query: &FieldQuery) -> Result<Vec<FieldRow>>;
}

/// A database that holds nothing; every query fails. Used when no
/// personTraitDB is configured but a dbField selector is present.
#[derive(Debug, Default, Clone)]
pub struct NoDb;

impl PersonTraitDb for NoDb {
    fn fetch(&self, query: &FieldQuery) -> Result<Vec<FieldRow>> {
        Err(Error::resource(format!(
            "no person trait database configured (query on '{}.{}')",
            query.table, query.field
        )))
    }
}

/// In-memory person-trait tables for tests and small runs.
#[derive(Debug, Default, Clone)]
pub struct InMemoryDb {
    tables: HashMap<String, Vec<(NodeId, HashMap<String, Value>)>>,
}

impl InMemoryDb {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_row(&mut self, table: &str, pid: NodeId, fields: Vec<(String, Value)>) {
        self.tables
            .entry(table.to_string())
            .or_insert_with(Vec::new)
            .push((pid, fields.into_iter().collect()));
    }
}

impl PersonTraitDb for InMemoryDb {
    fn fetch(&self, query: &FieldQuery) -> Result<Vec<FieldRow>> {
        let table = self
            .tables
            .get(&query.table)
            .ok_or_else(|| Error::semantic(format!("unknown table '{}'", query.table)))?;

        let mut rows = Vec::new();
        for (pid, fields) in table {
            let value = match fields.get(&query.field) {
                Some(v) => v.clone(),
                None => continue,
            };
            let keep = match &query.constraint {
                Some(list) => list.contains(&value) != query.negate,
                None => true,
            };
            if keep {
                rows.push(FieldRow { pid: *pid, value });
            }
        }
        Ok(rows)
    }
}

/// Retry policy for establishing database connections: capped exponential
/// back-off with randomized jitter. The engine only carries the knobs; the
/// PostgreSQL collaborator interprets them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    pub timeout_ms: u64,
    pub retries: u32,
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            timeout_ms: 5_000,
            retries: 5,
            max_delay_ms: 30_000,
        }
    }
}

impl RetryPolicy {
    /// Bounded delay before the given attempt, in milliseconds; the caller
    /// adds jitter from its own stream.
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let base = self.timeout_ms.saturating_mul(1u64 << attempt.min(16));
        base.min(self.max_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> InMemoryDb {
        let mut db = InMemoryDb::new();
        for (pid, age) in &[(1u64, 10.0), (2, 35.0), (3, 70.0)] {
            db.insert_row("persons", *pid, vec![("age".to_string(), Value::Number(*age))]);
        }
        db
    }

    #[test]
    fn fetch_all_and_constrained() {
        let db = db();
        let all = db
            .fetch(&FieldQuery {
                table: "persons".into(),
                field: "age".into(),
                constraint: None,
                negate: false,
            })
            .unwrap();
        assert_eq!(all.len(), 3);

        let list = ValueList::from_values(vec![Value::Number(35.0)]);
        let some = db
            .fetch(&FieldQuery {
                table: "persons".into(),
                field: "age".into(),
                constraint: Some(list.clone()),
                negate: false,
            })
            .unwrap();
        assert_eq!(some, vec![FieldRow { pid: 2, value: Value::Number(35.0) }]);

        let rest = db
            .fetch(&FieldQuery {
                table: "persons".into(),
                field: "age".into(),
                constraint: Some(list),
                negate: true,
            })
            .unwrap();
        assert_eq!(rest.len(), 2);
    }

    #[test]
    fn retry_delays_are_capped() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(0), 5_000);
        assert_eq!(policy.delay_for(1), 10_000);
        assert_eq!(policy.delay_for(10), 30_000);
    }
}
