use crate::prelude::Real;
use crate::sets::{SetId, SetRegistry, SetScope};

/// The cardinality of a set: per-partition local sizes plus, for global
/// scope, their reduced sum.
#[derive(Debug, Clone)]
pub struct SizeOf {
    set: SetId,
    sizes: Vec<u64>,
    total: u64,
}

/// Set cardinalities, interned by target set.
#[derive(Debug, Clone, Default)]
pub struct SizeOfList {
    items: Vec<SizeOf>,
}

impl SizeOfList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn register(&mut self, set: SetId, ranks: usize) -> usize {
        if let Some(index) = self.items.iter().position(|s| s.set == set) {
            return index;
        }
        self.items.push(SizeOf {
            set,
            sizes: vec![0; ranks],
            total: 0,
        });
        self.items.len() - 1
    }

    pub fn set_of(&self, index: usize) -> SetId {
        self.items[index].set
    }

    /// The size a given rank observes: the global total for global-scope
    /// sets, the rank-local size otherwise.
    pub fn value(&self, index: usize, rank: usize, registry: &SetRegistry) -> Real {
        let item = &self.items[index];
        match registry.scope(item.set) {
            SetScope::Global => item.total as Real,
            SetScope::Local => item.sizes[rank] as Real,
        }
    }

    pub fn total(&self, index: usize) -> u64 {
        self.items[index].total
    }

    /// Install freshly computed per-partition local sizes; the reported size
    /// of a global set is their sum.
    pub fn update_sizes(&mut self, index: usize, sizes: &[u64]) {
        let item = &mut self.items[index];
        item.sizes.clear();
        item.sizes.extend_from_slice(sizes);
        item.total = sizes.iter().sum();
    }
}
