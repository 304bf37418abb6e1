use crate::disease::DiseaseModel;
use crate::error::Result;
use crate::network::{Network, NodeData};
use crate::prelude::{NodeId, StateIndex, Tick};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;

/// One row of the per-tick change output:
/// `tick,pid,exit_state,contact_pid[,locationId]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChangeRow {
    pub tick: Tick,
    pub pid: NodeId,
    pub exit_state: StateIndex,
    pub contact: Option<NodeId>,
    pub location_id: Option<u64>,
}

/// Per-partition change log: the rows accumulated this tick, the set of
/// local nodes whose authoritative state changed, and the per-rank request
/// map built at load from outgoing edges.
#[derive(Debug, Clone, Default)]
pub struct Changes {
    rows: Vec<ChangeRow>,
    changed: BTreeSet<NodeId>,
    requested_by: BTreeMap<usize, Vec<NodeId>>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the request map: for each requesting rank, the local nodes it
    /// replicates.
    pub fn set_requested_by(&mut self, requested_by: BTreeMap<usize, Vec<NodeId>>) {
        self.requested_by = requested_by;
    }

    pub fn record_state_change(
        &mut self,
        tick: Tick,
        pid: NodeId,
        exit_state: StateIndex,
        contact: Option<NodeId>,
        location_id: Option<u64>,
    ) {
        self.rows.push(ChangeRow { tick, pid, exit_state, contact, location_id });
    }

    /// Mark a local node as changed this tick; its authoritative post-state
    /// is shipped to every rank that replicates it.
    pub fn mark_changed(&mut self, pid: NodeId) {
        self.changed.insert(pid);
    }

    pub fn rows(&self) -> &[ChangeRow] {
        &self.rows
    }

    pub fn changed_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.changed.iter().copied()
    }

    /// Build the updates owed to each requesting rank: the intersection of
    /// its requested nodes with this tick's changed set, carrying the full
    /// authoritative post-state.
    pub fn outgoing_updates(&self, network: &Network) -> Vec<(usize, Vec<NodeData>)> {
        let mut out = Vec::new();
        for (&rank, requested) in &self.requested_by {
            let mut updates = Vec::new();
            for &pid in requested {
                if self.changed.contains(&pid) {
                    if let Some(node) = network.lookup_node(pid) {
                        updates.push(node.replica());
                    }
                }
            }
            if !updates.is_empty() {
                out.push((rank, updates));
            }
        }
        out
    }

    /// Append this tick's rows to the writer in CSV form and clear the
    /// per-tick state. Rank 0 writes the header at initialization.
    pub fn flush_rows<W: Write>(
        &mut self,
        writer: &mut W,
        model: &DiseaseModel,
        with_location: bool,
    ) -> Result<usize> {
        let count = self.rows.len();
        for row in &self.rows {
            let contact = row
                .contact
                .map(|c| c.to_string())
                .unwrap_or_else(|| "-1".to_string());
            if with_location {
                let location = row
                    .location_id
                    .map(|l| l.to_string())
                    .unwrap_or_else(|| "-1".to_string());
                writeln!(
                    writer,
                    "{},{},{},{},{}",
                    row.tick,
                    row.pid,
                    model.state(row.exit_state).id,
                    contact,
                    location
                )?;
            } else {
                writeln!(
                    writer,
                    "{},{},{},{}",
                    row.tick,
                    row.pid,
                    model.state(row.exit_state).id,
                    contact
                )?;
            }
        }
        self.rows.clear();
        Ok(count)
    }

    /// Forget the per-tick state; called after the change broadcast.
    pub fn advance_tick(&mut self) {
        self.rows.clear();
        self.changed.clear();
    }

    pub fn header(with_location: bool) -> &'static str {
        if with_location {
            "tick,pid,exit_state,contact_pid,locationId"
        } else {
            "tick,pid,exit_state,contact_pid"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::disease::DiseaseModel;
    use crate::network::{Boundary, EdgeData};

    #[test]
    fn rows_render_and_clear() {
        let model = DiseaseModel::parse(crate::disease::tests::sir_json()).unwrap();
        let mut changes = Changes::new();
        changes.record_state_change(2, 5, 1, Some(9), None);
        changes.record_state_change(2, 6, 2, None, None);

        let mut buf = Vec::new();
        let written = changes.flush_rows(&mut buf, &model, false).unwrap();
        assert_eq!(written, 2);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(text, "2,5,I,9\n2,6,R,-1\n");
        assert!(changes.rows().is_empty());
    }

    #[test]
    fn outgoing_updates_follow_request_map() {
        let mut edges = vec![EdgeData::new(1, 2)];
        edges.sort_by(|a, b| a.compare(b));
        let network = Network::build(
            0,
            Boundary { first: 1, beyond: 3, edges_begin: 0, edges_end: 1 },
            edges,
            1.0,
            &[],
        );

        let mut changes = Changes::new();
        let mut requested = BTreeMap::new();
        requested.insert(1usize, vec![1u64, 2u64]);
        changes.set_requested_by(requested);

        // nothing changed yet
        assert!(changes.outgoing_updates(&network).is_empty());

        changes.mark_changed(1);
        let updates = changes.outgoing_updates(&network);
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].0, 1);
        assert_eq!(updates[0].1[0].id, 1);

        changes.advance_tick();
        assert!(changes.outgoing_updates(&network).is_empty());
    }
}
