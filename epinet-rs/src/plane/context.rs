use serde::{Deserialize, Serialize};

/// A per-rank container: one value per rank plus a master value. Read-only
/// data lives on the master slot; write-heavy state lives on rank slots and
/// is folded into the master at phase boundaries.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Context<T> {
    master: T,
    slots: Vec<T>,
}

impl<T: Clone> Context<T> {
    pub fn new(master: T, ranks: usize) -> Self {
        Context {
            slots: vec![master.clone(); ranks],
            master,
        }
    }
}

impl<T> Context<T> {
    pub fn ranks(&self) -> usize {
        self.slots.len()
    }

    pub fn master(&self) -> &T {
        &self.master
    }

    pub fn master_mut(&mut self) -> &mut T {
        &mut self.master
    }

    pub fn slot(&self, rank: usize) -> &T {
        &self.slots[rank]
    }

    pub fn slot_mut(&mut self, rank: usize) -> &mut T {
        &mut self.slots[rank]
    }

    pub fn slots(&self) -> &[T] {
        &self.slots
    }

    pub fn slots_mut(&mut self) -> &mut [T] {
        &mut self.slots
    }

    /// Fold every slot into the master, in rank order.
    pub fn reduce<F: FnMut(&mut T, &T)>(&mut self, mut fold: F) {
        for slot in &self.slots {
            fold(&mut self.master, slot);
        }
    }

    /// Overwrite every slot with the master value.
    pub fn publish(&mut self)
    where
        T: Clone,
    {
        for slot in &mut self.slots {
            *slot = self.master.clone();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_folds_in_rank_order() {
        let mut ctx: Context<Vec<u32>> = Context::new(vec![], 3);
        ctx.slot_mut(0).push(1);
        ctx.slot_mut(1).push(2);
        ctx.slot_mut(2).push(3);
        ctx.reduce(|master, slot| master.extend_from_slice(slot));
        assert_eq!(ctx.master(), &vec![1, 2, 3]);
    }

    #[test]
    fn publish_overwrites_slots() {
        let mut ctx: Context<u64> = Context::new(0, 2);
        *ctx.master_mut() = 7;
        ctx.publish();
        assert_eq!(*ctx.slot(0), 7);
        assert_eq!(*ctx.slot(1), 7);
    }
}
