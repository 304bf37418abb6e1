use crate::prelude::{Real, StateIndex};
use serde::{Deserialize, Serialize};

/// One health state of the disease model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthState {
    pub id: String,
    #[serde(default)]
    pub annotation: Option<String>,
    pub susceptibility: Real,
    pub infectivity: Real,
}

/// Running counters for one health state. `current = in - out` holds at
/// every tick boundary once the initial population is folded into `in`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateCount {
    pub current: u64,
    #[serde(rename = "in")]
    pub incoming: u64,
    pub out: u64,
}

/// Per-partition (and, reduced, global) state counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateCounts {
    counts: Vec<StateCount>,
}

impl StateCounts {
    pub fn new(states: usize) -> Self {
        StateCounts {
            counts: vec![StateCount::default(); states],
        }
    }

    pub fn counts(&self) -> &[StateCount] {
        &self.counts
    }

    pub fn get(&self, state: StateIndex) -> StateCount {
        self.counts[state]
    }

    /// Count a node entering `state` at load time.
    pub fn seed(&mut self, state: StateIndex) {
        self.counts[state].current += 1;
        self.counts[state].incoming += 1;
    }

    /// Count one state transition.
    pub fn transition(&mut self, from: StateIndex, to: StateIndex) {
        if from == to {
            return;
        }
        self.counts[from].out += 1;
        self.counts[from].current -= 1;
        self.counts[to].incoming += 1;
        self.counts[to].current += 1;
    }

    /// Fold another partition's counters into this one.
    pub fn merge(&mut self, other: &StateCounts) {
        for (mine, theirs) in self.counts.iter_mut().zip(other.counts.iter()) {
            mine.current += theirs.current;
            mine.incoming += theirs.incoming;
            mine.out += theirs.out;
        }
    }

    pub fn total_current(&self) -> u64 {
        self.counts.iter().map(|c| c.current).sum()
    }

    /// `current = in - out` for every state.
    pub fn is_conserved(&self) -> bool {
        self.counts
            .iter()
            .all(|c| c.incoming >= c.out && c.current == c.incoming - c.out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transitions_conserve() {
        let mut counts = StateCounts::new(3);
        for _ in 0..10 {
            counts.seed(0);
        }
        counts.transition(0, 1);
        counts.transition(0, 1);
        counts.transition(1, 2);

        assert_eq!(counts.get(0).current, 8);
        assert_eq!(counts.get(1).current, 1);
        assert_eq!(counts.get(2).current, 1);
        assert_eq!(counts.total_current(), 10);
        assert!(counts.is_conserved());
    }

    #[test]
    fn merge_sums() {
        let mut a = StateCounts::new(2);
        let mut b = StateCounts::new(2);
        a.seed(0);
        b.seed(1);
        b.transition(1, 0);
        a.merge(&b);
        assert_eq!(a.get(0).current, 2);
        assert_eq!(a.get(1).current, 0);
        assert!(a.is_conserved());
    }
}
