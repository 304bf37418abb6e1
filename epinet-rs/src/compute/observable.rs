use crate::disease::{DiseaseModel, StateCounts};
use crate::error::{Error, Result};
use crate::prelude::{Real, StateIndex, Tick};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CountKind {
    Current,
    In,
    Out,
}

/// JSON form of an observable reference inside conditions.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ObservableDef {
    Time,
    TotalPopulation,
    #[serde(rename_all = "camelCase")]
    HealthState {
        health_state: String,
        count: CountKind,
        #[serde(default)]
        relative: bool,
    },
}

/// A derived scalar with a fixed recipe, refreshed exactly once per tick
/// before any consumer reads it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ObservableKind {
    Time,
    TotalPopulation,
    HealthStateCount {
        state: StateIndex,
        count: CountKind,
        relative: bool,
    },
}

#[derive(Debug, Clone)]
pub struct Observable {
    kind: ObservableKind,
    value: Real,
}

/// The observables of a run, interned by recipe.
#[derive(Debug, Clone, Default)]
pub struct ObservableList {
    items: Vec<Observable>,
}

impl ObservableList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Intern an observable by recipe, returning its index.
    pub fn register(&mut self, kind: ObservableKind) -> usize {
        if let Some(index) = self.items.iter().position(|o| o.kind == kind) {
            return index;
        }
        self.items.push(Observable { kind, value: 0.0 });
        self.items.len() - 1
    }

    pub fn resolve(&mut self, def: &ObservableDef, model: &DiseaseModel) -> Result<usize> {
        let kind = match def {
            ObservableDef::Time => ObservableKind::Time,
            ObservableDef::TotalPopulation => ObservableKind::TotalPopulation,
            ObservableDef::HealthState { health_state, count, relative } => {
                let state = model.state_index(health_state).ok_or_else(|| {
                    Error::semantic(format!("observable references unknown state '{}'", health_state))
                })?;
                ObservableKind::HealthStateCount { state, count: *count, relative: *relative }
            }
        };
        Ok(self.register(kind))
    }

    pub fn value(&self, index: usize) -> Real {
        self.items[index].value
    }

    pub fn kind(&self, index: usize) -> ObservableKind {
        self.items[index].kind
    }

    /// Refresh every observable from the already reduced global world state.
    pub fn update_all(&mut self, tick: Tick, start_tick: Tick, counts: &StateCounts, population: u64) {
        for item in &mut self.items {
            item.value = match item.kind {
                ObservableKind::Time => (tick - start_tick) as Real,
                ObservableKind::TotalPopulation => population as Real,
                ObservableKind::HealthStateCount { state, count, relative } => {
                    let c = counts.get(state);
                    let absolute = match count {
                        CountKind::Current => c.current as Real,
                        CountKind::In => c.incoming as Real,
                        CountKind::Out => c.out as Real,
                    };
                    if relative && population > 0 {
                        absolute / population as Real
                    } else {
                        absolute
                    }
                }
            };
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interning_by_recipe() {
        let mut list = ObservableList::new();
        let a = list.register(ObservableKind::Time);
        let b = list.register(ObservableKind::Time);
        let c = list.register(ObservableKind::TotalPopulation);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn update_from_counts() {
        let mut list = ObservableList::new();
        let time = list.register(ObservableKind::Time);
        let current = list.register(ObservableKind::HealthStateCount {
            state: 1,
            count: CountKind::Current,
            relative: false,
        });
        let relative = list.register(ObservableKind::HealthStateCount {
            state: 1,
            count: CountKind::Current,
            relative: true,
        });

        let mut counts = StateCounts::new(2);
        for _ in 0..8 {
            counts.seed(0);
        }
        counts.seed(1);
        counts.seed(1);

        list.update_all(5, 0, &counts, 10);
        assert_eq!(list.value(time), 5.0);
        assert_eq!(list.value(current), 2.0);
        assert_eq!(list.value(relative), 0.2);
    }
}
