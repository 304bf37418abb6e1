use crate::compute::sizeof::SizeOfList;
use crate::error::{Error, Result};
use crate::sets::{SetId, SetRegistry};
use log::debug;
use std::collections::HashMap;

/// A value object whose content is a function of other computables and world
/// state, refreshed through the dependency graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Computable {
    Variable(usize),
    Observable(usize),
    SizeOf(usize),
    Set(SetId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    White,
    Grey,
    Black,
}

/// The DAG over all computables. Edges run from prerequisite to dependent;
/// the update order visits prerequisites first (post-order traversal) and a
/// grey revisit indicates a cycle.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: Vec<Computable>,
    index: HashMap<Computable, usize>,
    prerequisites: Vec<Vec<usize>>,
    compute_once: Vec<bool>,
    update_order: Vec<Computable>,
    compute_once_order: Vec<Computable>,
}

impl DependencyGraph {
    /// Build the graph from every registered computable and derive the
    /// orders for the requested ones: `compute_once` for statically
    /// determined content and the per-tick update order for the rest.
    pub fn build(
        registry: &SetRegistry,
        sizeofs: &SizeOfList,
        observables: usize,
        variables: usize,
        requested: &[Computable],
    ) -> Result<DependencyGraph> {
        let mut graph = DependencyGraph::default();

        for i in 0..variables {
            graph.add(Computable::Variable(i), false);
        }
        for i in 0..observables {
            graph.add(Computable::Observable(i), false);
        }
        for id in registry.ids() {
            graph.add(Computable::Set(id), registry.get(id).compute_once);
        }
        for i in 0..sizeofs.len() {
            graph.add(Computable::SizeOf(i), false);
        }

        // prerequisite edges
        for id in registry.ids() {
            let node = graph.index[&Computable::Set(id)];
            for prerequisite in registry.get(id).prerequisites() {
                let p = graph.index[&Computable::Set(prerequisite)];
                graph.prerequisites[node].push(p);
            }
        }
        for i in 0..sizeofs.len() {
            let node = graph.index[&Computable::SizeOf(i)];
            let p = graph.index[&Computable::Set(sizeofs.set_of(i))];
            graph.prerequisites[node].push(p);
        }

        graph.derive_orders(requested)?;
        Ok(graph)
    }

    fn add(&mut self, computable: Computable, compute_once: bool) {
        if self.index.contains_key(&computable) {
            return;
        }
        self.index.insert(computable, self.nodes.len());
        self.nodes.push(computable);
        self.prerequisites.push(Vec::new());
        self.compute_once.push(compute_once);
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Topologically ordered computables evaluated exactly once at
    /// initialization.
    pub fn compute_once_order(&self) -> &[Computable] {
        &self.compute_once_order
    }

    /// Topologically ordered computables refreshed every tick: the requested
    /// ones and, transitively, every prerequisite.
    pub fn update_order(&self) -> &[Computable] {
        &self.update_order
    }

    fn derive_orders(&mut self, requested: &[Computable]) -> Result<()> {
        let mut marks = vec![Mark::White; self.nodes.len()];
        let mut order: Vec<usize> = Vec::new();

        for computable in requested {
            let node = *self.index.get(computable).ok_or_else(|| {
                Error::runtime(format!("requested unknown computable {:?}", computable))
            })?;
            self.visit(node, &mut marks, &mut order)?;
        }

        self.update_order = order
            .iter()
            .filter(|&&n| !self.compute_once[n])
            .map(|&n| self.nodes[n])
            .collect();

        // compute-once nodes keep their topological position relative to
        // one another
        let mut marks = vec![Mark::White; self.nodes.len()];
        let mut order: Vec<usize> = Vec::new();
        for node in 0..self.nodes.len() {
            if self.compute_once[node] {
                self.visit(node, &mut marks, &mut order)?;
            }
        }
        self.compute_once_order = order
            .iter()
            .filter(|&&n| self.compute_once[n])
            .map(|&n| self.nodes[n])
            .collect();

        debug!(
            "dependency graph: {} computables, {} once, {} per tick",
            self.nodes.len(),
            self.compute_once_order.len(),
            self.update_order.len()
        );
        Ok(())
    }

    fn visit(&self, node: usize, marks: &mut Vec<Mark>, order: &mut Vec<usize>) -> Result<()> {
        match marks[node] {
            Mark::Black => return Ok(()),
            Mark::Grey => {
                return Err(Error::semantic(format!(
                    "circular dependency through {:?}",
                    self.nodes[node]
                )))
            }
            Mark::White => {}
        }
        marks[node] = Mark::Grey;
        for &prerequisite in &self.prerequisites[node] {
            self.visit(prerequisite, marks, order)?;
        }
        marks[node] = Mark::Black;
        order.push(node);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sets::SetScope;

    #[test]
    fn update_order_visits_prerequisites_first() {
        let mut registry = SetRegistry::default();
        let unused = registry.add_sampled(SetScope::Local);
        let target = registry.add_sampled(SetScope::Local);

        let mut sizeofs = SizeOfList::new();
        let sizeof = sizeofs.register(target, 1);

        let graph =
            DependencyGraph::build(&registry, &sizeofs, 0, 0, &[Computable::SizeOf(sizeof)])
                .unwrap();

        let order = graph.update_order();
        let set_pos = order.iter().position(|c| *c == Computable::Set(target)).unwrap();
        let sizeof_pos = order.iter().position(|c| *c == Computable::SizeOf(sizeof)).unwrap();
        assert!(set_pos < sizeof_pos);
        // unrequested sets stay out of the order
        assert!(!order.contains(&Computable::Set(unused)));
    }

    #[test]
    fn unknown_requests_error() {
        let registry = SetRegistry::default();
        let sizeofs = SizeOfList::new();
        assert!(DependencyGraph::build(&registry, &sizeofs, 0, 0, &[Computable::Set(3)]).is_err());
    }
}
