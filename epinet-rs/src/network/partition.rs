use crate::error::{Error, Result};
use crate::network::edge::EdgeData;
use crate::prelude::NodeId;
use serde::{Deserialize, Serialize};

/// Partition descriptor carried in the preamble of a per-part network file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PartitionInfo {
    pub number_of_parts: usize,
    pub part: usize,
    pub first_local_node: NodeId,
    pub beyond_local_node: NodeId,
    pub number_of_edges: u64,
}

/// Half-open id interval owned by one partition plus its edge slice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub first: NodeId,
    pub beyond: NodeId,
    pub edges_begin: usize,
    pub edges_end: usize,
}

impl Boundary {
    pub fn contains(&self, id: NodeId) -> bool {
        self.first <= id && id < self.beyond
    }
}

/// Compute partition boundaries over edges sorted by (target, source).
///
/// Walks target runs accumulating counts and closes a partition when the
/// cumulative count first reaches `k * E / P`, keeping the crossing node on
/// whichever side yields the closer balance. Cuts happen only on node
/// boundaries, so every edge's target lies in its owner's interval. The id
/// range [id_min, id_max] must cover every node including source-only ones;
/// a source-only node then falls into the interval of the nearest lower
/// target, which is the partition that owns that interval.
pub fn compute_boundaries(
    edges: &[EdgeData],
    parts: usize,
    id_min: NodeId,
    id_max: NodeId,
) -> Result<Vec<Boundary>> {
    if parts == 0 {
        return Err(Error::configuration("partition count must be positive"));
    }
    if edges.is_empty() {
        return Err(Error::configuration("cannot partition an empty edge list"));
    }

    let total = edges.len();
    let per_part = total as f64 / parts as f64;

    let mut boundaries: Vec<Boundary> = Vec::with_capacity(parts);
    let mut first = id_min;
    let mut edges_begin = 0usize;
    let mut cum = 0usize;
    let mut k = 1usize;

    let mut i = 0usize;
    while i < total {
        // one target run
        let target = edges[i].target;
        let mut j = i + 1;
        while j < total && edges[j].target == target {
            j += 1;
        }
        let count = j - i;

        if k < parts && (cum + count) as f64 >= k as f64 * per_part {
            let ideal = k as f64 * per_part;
            let with = (cum + count) as f64;
            let without = cum as f64;

            let (beyond, cut) = if (with - ideal).abs() <= (ideal - without).abs() {
                (target + 1, j)
            } else {
                (target, i)
            };

            if cut > edges_begin {
                boundaries.push(Boundary {
                    first,
                    beyond,
                    edges_begin,
                    edges_end: cut,
                });
                first = beyond;
                edges_begin = cut;
                k += 1;
            }
        }

        cum += count;
        i = j;
    }

    boundaries.push(Boundary {
        first,
        beyond: id_max + 1,
        edges_begin,
        edges_end: total,
    });

    // Fewer cuts than requested can happen on tiny networks; pad with empty
    // trailing intervals so every rank exists.
    while boundaries.len() < parts {
        let beyond = boundaries.last().map(|b| b.beyond).unwrap_or(id_max + 1);
        boundaries.push(Boundary {
            first: beyond,
            beyond,
            edges_begin: total,
            edges_end: total,
        });
    }

    Ok(boundaries)
}

/// The rank whose interval contains `id`, by binary search over boundaries.
pub fn owner_of(boundaries: &[Boundary], id: NodeId) -> Option<usize> {
    let mut lo = 0usize;
    let mut hi = boundaries.len();
    while lo < hi {
        let mid = (lo + hi) / 2;
        let b = &boundaries[mid];
        if id < b.first {
            hi = mid;
        } else if id >= b.beyond {
            lo = mid + 1;
        } else {
            return Some(mid);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edges_for(targets: &[NodeId]) -> Vec<EdgeData> {
        targets
            .iter()
            .enumerate()
            .map(|(i, &t)| EdgeData::new(t, 1000 + i as NodeId))
            .collect()
    }

    #[test]
    fn boundaries_cover_id_range() {
        let edges = edges_for(&[1, 1, 2, 2, 3, 3, 4, 4]);
        let bs = compute_boundaries(&edges, 2, 0, 10).unwrap();
        assert_eq!(bs.len(), 2);
        assert_eq!(bs[0].first, 0);
        assert_eq!(bs.last().unwrap().beyond, 11);
        // contiguous, disjoint
        assert_eq!(bs[0].beyond, bs[1].first);
        // cuts only on node boundaries
        assert!(edges[bs[0].edges_end - 1].target < bs[1].first);
    }

    #[test]
    fn balance_roughly_even() {
        let mut targets = Vec::new();
        for t in 0..100u64 {
            for _ in 0..4 {
                targets.push(t);
            }
        }
        let edges = edges_for(&targets);
        let bs = compute_boundaries(&edges, 4, 0, 99).unwrap();
        for b in &bs {
            let n = b.edges_end - b.edges_begin;
            assert!(n >= 90 && n <= 110, "unbalanced part: {}", n);
        }
    }

    #[test]
    fn owner_lookup() {
        let edges = edges_for(&[1, 2, 3, 4, 5, 6, 7, 8]);
        let bs = compute_boundaries(&edges, 4, 0, 8).unwrap();
        for id in 0..=8u64 {
            let owner = owner_of(&bs, id).unwrap();
            assert!(bs[owner].contains(id));
        }
        assert_eq!(owner_of(&bs, 9), None);
    }

    #[test]
    fn single_part_owns_everything() {
        let edges = edges_for(&[5, 6, 7]);
        let bs = compute_boundaries(&edges, 1, 5, 7).unwrap();
        assert_eq!(bs.len(), 1);
        assert_eq!(bs[0].first, 5);
        assert_eq!(bs[0].beyond, 8);
        assert_eq!(bs[0].edges_end, 3);
    }
}
