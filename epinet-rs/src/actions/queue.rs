use crate::actions::condition::Condition;
use crate::actions::operation::Operation;
use crate::prelude::{NodeId, Tick};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A condition-gated bundle of operations scheduled at an absolute tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    pub priority: u32,
    #[serde(default)]
    pub condition: Option<Condition>,
    pub operations: Vec<Operation>,
}

impl Action {
    pub fn new(priority: u32, condition: Option<Condition>, operations: Vec<Operation>) -> Self {
        Action { priority, condition, operations }
    }
}

/// An action bound for another partition's node, shipped at the drain
/// barrier and materialized by the owner at the target tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteAction {
    pub node: NodeId,
    pub tick: Tick,
    pub action: Action,
}

/// The actions of a single tick, bucketed by priority. Processing order is
/// descending priority; within a priority the order is uniformly random.
#[derive(Debug, Clone, Default)]
pub struct CurrentActions {
    by_priority: BTreeMap<u32, Vec<Action>>,
    len: usize,
}

impl CurrentActions {
    pub fn add(&mut self, action: Action) {
        self.by_priority
            .entry(action.priority)
            .or_insert_with(Vec::new)
            .push(action);
        self.len += 1;
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Flatten into execution order: priorities descending, each bucket
    /// shuffled with the rank stream.
    pub fn into_shuffled<R: Rng>(self, rng: &mut R) -> Vec<Action> {
        let mut out = Vec::with_capacity(self.len);
        for (_, mut bucket) in self.by_priority.into_iter().rev() {
            bucket.shuffle(rng);
            out.append(&mut bucket);
        }
        out
    }
}

/// Per-partition queue of pending actions keyed by absolute tick, plus the
/// outbox of remotely scheduled actions awaiting the next exchange.
#[derive(Debug, Clone, Default)]
pub struct ActionQueue {
    queue: BTreeMap<Tick, CurrentActions>,
    outbox: Vec<RemoteAction>,
}

impl ActionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue locally at an absolute tick.
    pub fn schedule(&mut self, tick: Tick, action: Action) {
        self.queue.entry(tick).or_insert_with(CurrentActions::default).add(action);
    }

    /// Enqueue for the owner of `node`; serialized and shipped at the next
    /// exchange.
    pub fn schedule_remote(&mut self, node: NodeId, tick: Tick, action: Action) {
        self.outbox.push(RemoteAction { node, tick, action });
    }

    /// Take this tick's bucket, leaving the queue position empty.
    pub fn take_current(&mut self, tick: Tick) -> CurrentActions {
        self.queue.remove(&tick).unwrap_or_default()
    }

    pub fn pending_at(&self, tick: Tick) -> usize {
        self.queue.get(&tick).map(|c| c.len()).unwrap_or(0)
    }

    pub fn pending_total(&self) -> usize {
        self.queue.values().map(|c| c.len()).sum()
    }

    pub fn take_outbox(&mut self) -> Vec<RemoteAction> {
        std::mem::take(&mut self.outbox)
    }

    pub fn outbox_len(&self) -> usize {
        self.outbox.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::prelude::{SeedableRng, SmallRng};

    fn action(priority: u32) -> Action {
        Action::new(priority, None, vec![])
    }

    #[test]
    fn priorities_processed_descending() {
        let mut current = CurrentActions::default();
        current.add(action(0));
        current.add(action(2));
        current.add(action(1));
        current.add(action(2));

        let mut rng = SmallRng::seed_from_u64(1);
        let order = current.into_shuffled(&mut rng);
        let priorities: Vec<u32> = order.iter().map(|a| a.priority).collect();
        assert_eq!(priorities, vec![2, 2, 1, 0]);
    }

    #[test]
    fn queue_by_tick() {
        let mut queue = ActionQueue::new();
        queue.schedule(3, action(1));
        queue.schedule(3, action(1));
        queue.schedule(5, action(0));

        assert_eq!(queue.pending_at(3), 2);
        assert_eq!(queue.pending_total(), 3);

        let current = queue.take_current(3);
        assert_eq!(current.len(), 2);
        assert_eq!(queue.pending_at(3), 0);
        assert_eq!(queue.pending_total(), 1);
    }

    #[test]
    fn outbox_drains_once() {
        let mut queue = ActionQueue::new();
        queue.schedule_remote(7, 2, action(1));
        assert_eq!(queue.outbox_len(), 1);
        assert_eq!(queue.take_outbox().len(), 1);
        assert!(queue.take_outbox().is_empty());
    }
}
