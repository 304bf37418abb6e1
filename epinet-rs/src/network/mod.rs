mod edge;
mod load;
mod node;
mod partition;

pub use edge::{EdgeData, EdgeFields};
pub use load::{
    load_partitioned, part_file_name, read_network, try_load_existing_parts, write_network,
    write_part_files, Encoding, Preamble,
};
pub use node::NodeData;
pub use partition::{compute_boundaries, owner_of, Boundary, PartitionInfo};

use crate::prelude::{NodeId, Real};
use getset::{CopyGetters, Getters};
use std::collections::BTreeMap;

/// One partition of the contact network: the contiguous run of edges whose
/// targets fall into the local id interval, the local nodes that own them,
/// and read-only replicas of every remote source node.
#[derive(Debug, Clone, Getters, CopyGetters)]
pub struct Network {
    #[getset(get_copy = "pub")]
    rank: usize,
    #[getset(get_copy = "pub")]
    first_local: NodeId,
    #[getset(get_copy = "pub")]
    beyond_local: NodeId,
    #[getset(get_copy = "pub")]
    time_resolution: Real,
    nodes: Vec<NodeData>,
    remotes: BTreeMap<NodeId, NodeData>,
    edges: Vec<EdgeData>,
}

impl Network {
    /// Assemble one partition from its sorted edge slice. Local nodes are the
    /// edge targets plus any source-only nodes and local sources falling into
    /// the interval; sources outside the interval become remote replicas.
    pub fn build(
        rank: usize,
        boundary: Boundary,
        edges: Vec<EdgeData>,
        time_resolution: Real,
        source_only: &[NodeId],
    ) -> Network {
        let mut local_ids: Vec<NodeId> = Vec::new();
        let mut remotes = BTreeMap::new();

        for edge in &edges {
            local_ids.push(edge.target);
            if boundary.contains(edge.source) {
                local_ids.push(edge.source);
            } else {
                remotes
                    .entry(edge.source)
                    .or_insert_with(|| NodeData::new(edge.source));
            }
        }
        for &id in source_only {
            if boundary.contains(id) {
                local_ids.push(id);
            }
        }
        local_ids.sort_unstable();
        local_ids.dedup();

        let mut nodes: Vec<NodeData> = local_ids.into_iter().map(NodeData::new).collect();

        // attach each node's incoming edge run
        let mut begin = 0usize;
        while begin < edges.len() {
            let target = edges[begin].target;
            let mut end = begin + 1;
            while end < edges.len() && edges[end].target == target {
                end += 1;
            }
            if let Ok(index) = nodes.binary_search_by(|n| n.id.cmp(&target)) {
                nodes[index].edges_begin = begin;
                nodes[index].edges_size = end - begin;
            }
            begin = end;
        }

        Network {
            rank,
            first_local: boundary.first,
            beyond_local: boundary.beyond,
            time_resolution,
            nodes,
            remotes,
            edges,
        }
    }

    pub fn is_local(&self, id: NodeId) -> bool {
        self.first_local <= id && id < self.beyond_local
    }

    pub fn local_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn remote_count(&self) -> usize {
        self.remotes.len()
    }

    /// Binary search among local nodes.
    pub fn node_index(&self, id: NodeId) -> Option<usize> {
        self.nodes.binary_search_by(|n| n.id.cmp(&id)).ok()
    }

    /// Resolve a node: local first, then the remote replica map.
    pub fn lookup_node(&self, id: NodeId) -> Option<&NodeData> {
        if self.is_local(id) {
            return self.node_index(id).map(|i| &self.nodes[i]);
        }
        self.remotes.get(&id)
    }

    pub fn lookup_node_mut(&mut self, id: NodeId) -> Option<&mut NodeData> {
        if self.is_local(id) {
            let index = self.node_index(id)?;
            return Some(&mut self.nodes[index]);
        }
        self.remotes.get_mut(&id)
    }

    /// Bounded binary search within the target's incoming edge run.
    pub fn lookup_edge(&self, target: NodeId, source: NodeId) -> Option<usize> {
        let node = self.node_index(target).map(|i| &self.nodes[i])?;
        let run = &self.edges[node.edges_begin..node.edges_begin + node.edges_size];
        run.binary_search_by(|e| e.source.cmp(&source))
            .ok()
            .map(|i| node.edges_begin + i)
    }

    pub fn nodes(&self) -> &[NodeData] {
        &self.nodes
    }

    pub fn nodes_mut(&mut self) -> &mut [NodeData] {
        &mut self.nodes
    }

    pub fn edges(&self) -> &[EdgeData] {
        &self.edges
    }

    pub fn edges_mut(&mut self) -> &mut [EdgeData] {
        &mut self.edges
    }

    pub fn edge(&self, index: usize) -> &EdgeData {
        &self.edges[index]
    }

    pub fn edge_mut(&mut self, index: usize) -> &mut EdgeData {
        &mut self.edges[index]
    }

    /// The incoming edge run of a local node.
    pub fn incoming(&self, node: &NodeData) -> &[EdgeData] {
        &self.edges[node.edges_begin..node.edges_begin + node.edges_size]
    }

    pub fn remote_ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.remotes.keys().copied()
    }

    /// Apply authoritative node updates received from owner partitions.
    pub fn apply_updates(&mut self, updates: &[NodeData]) {
        for update in updates {
            if let Some(replica) = self.remotes.get_mut(&update.id) {
                replica.apply_replica(update);
            }
        }
    }

    /// Split borrow used by the transmission sampler: nodes immutably plus
    /// everything needed to walk their edge runs.
    pub fn parts(&self) -> (&[NodeData], &[EdgeData], &BTreeMap<NodeId, NodeData>) {
        (&self.nodes, &self.edges, &self.remotes)
    }
}

/// For every owner rank, the map from requesting rank to the sorted local
/// node ids that rank holds as remote replicas. Built once at load; at end
/// of tick the owner ships the authoritative state of its changed nodes to
/// each requester.
pub fn build_request_map(networks: &[Network]) -> Vec<BTreeMap<usize, Vec<NodeId>>> {
    let mut requested: Vec<BTreeMap<usize, Vec<NodeId>>> = vec![BTreeMap::new(); networks.len()];

    for requester in networks {
        for id in requester.remote_ids() {
            if let Some(owner) = networks.iter().position(|n| n.is_local(id)) {
                requested[owner]
                    .entry(requester.rank())
                    .or_insert_with(Vec::new)
                    .push(id);
            }
        }
    }

    for map in &mut requested {
        for ids in map.values_mut() {
            ids.sort_unstable();
            ids.dedup();
        }
    }

    requested
}
