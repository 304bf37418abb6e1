use crate::error::{Error, Result};
use crate::network::edge::{EdgeData, EdgeFields};
use crate::network::partition::{compute_boundaries, Boundary, PartitionInfo};
use crate::network::Network;
use crate::prelude::{NodeId, Real};
use crate::traits::{Trait, TraitDef};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Encoding {
    Text,
    Binary,
}

impl Default for Encoding {
    fn default() -> Self {
        Encoding::Text
    }
}

/// The JSON header line of a contact network file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Preamble {
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub encoding: Encoding,
    pub number_of_nodes: u64,
    pub number_of_edges: u64,
    #[serde(rename = "sizeofPID")]
    pub sizeof_pid: usize,
    pub time_resolution: Real,
    #[serde(default)]
    pub accumulation_time: Option<String>,
    #[serde(rename = "hasLocationIDField", default)]
    pub has_location_id_field: bool,
    #[serde(default)]
    pub has_active_field: bool,
    #[serde(default)]
    pub has_weight_field: bool,
    #[serde(rename = "sizeofActivity", default)]
    pub sizeof_activity: usize,
    pub activity_encoding: TraitDef,
    #[serde(rename = "sizeofEdgeTrait", default)]
    pub sizeof_edge_trait: usize,
    #[serde(default)]
    pub edge_trait_encoding: Option<TraitDef>,
    #[serde(default)]
    pub partition: Option<PartitionInfo>,
    #[serde(default)]
    pub source_only_nodes: Option<Vec<NodeId>>,
}

impl Preamble {
    pub fn from_line(line: &str) -> Result<Preamble> {
        let preamble: Preamble = serde_json::from_str(line)
            .map_err(|e| Error::configuration(format!("network preamble: {}", e)))?;

        if preamble.time_resolution <= 0.0 {
            return Err(Error::configuration("network preamble: timeResolution must be positive"));
        }

        Ok(preamble)
    }

    pub fn fields(&self) -> EdgeFields {
        EdgeFields {
            location_id: self.has_location_id_field,
            edge_trait: self.sizeof_edge_trait > 0,
            active: self.has_active_field,
            weight: self.has_weight_field,
        }
    }

    pub fn header_line(&self) -> String {
        let mut header = String::from("targetPID,targetActivity,sourcePID,sourceActivity,duration");
        if self.has_location_id_field {
            header.push_str(",LID");
        }
        if self.sizeof_edge_trait > 0 {
            header.push_str(",edgeTrait");
        }
        if self.has_active_field {
            header.push_str(",active");
        }
        if self.has_weight_field {
            header.push_str(",weight");
        }
        header
    }
}

/// Read a whole network file: JSON preamble line, CSV header line, then the
/// text or binary edge body.
pub fn read_network<P: AsRef<Path>>(path: P) -> Result<(Preamble, Vec<EdgeData>)> {
    let bytes = fs::read(path.as_ref())
        .map_err(|e| Error::resource(format!("{}: {}", path.as_ref().display(), e)))?;

    let first_end = find_newline(&bytes, 0)
        .ok_or_else(|| Error::configuration("network file: missing preamble line"))?;
    let preamble_line = std::str::from_utf8(&bytes[..first_end])
        .map_err(|_| Error::configuration("network file: preamble is not UTF-8"))?;
    let preamble = Preamble::from_line(preamble_line)?;

    let second_end = find_newline(&bytes, first_end + 1)
        .ok_or_else(|| Error::configuration("network file: missing column header line"))?;
    let body = &bytes[second_end + 1..];

    let fields = preamble.fields();
    let activity = Trait::new(&preamble.activity_encoding)?;
    let edge_trait = match &preamble.edge_trait_encoding {
        Some(def) => Some(Trait::new(def)?),
        None => None,
    };

    let mut edges = Vec::with_capacity(preamble.number_of_edges as usize);

    match preamble.encoding {
        Encoding::Text => {
            let text = std::str::from_utf8(body)
                .map_err(|_| Error::configuration("network file: body is not UTF-8"))?;
            let mut reader = csv::ReaderBuilder::new()
                .has_headers(false)
                .flexible(true)
                .from_reader(text.as_bytes());
            for record in reader.records() {
                let record = record?;
                if record.len() == 0 || (record.len() == 1 && record[0].is_empty()) {
                    continue;
                }
                edges.push(EdgeData::from_record(
                    &record,
                    &fields,
                    &activity,
                    edge_trait.as_ref(),
                )?);
            }
        }
        Encoding::Binary => {
            let mut reader = body;
            for _ in 0..preamble.number_of_edges {
                edges.push(EdgeData::read_binary(&mut reader, &fields, preamble.sizeof_pid)?);
            }
        }
    }

    if edges.len() as u64 != preamble.number_of_edges {
        return Err(Error::semantic(format!(
            "network file: declared {} edges, found {}",
            preamble.number_of_edges,
            edges.len()
        )));
    }

    debug!("read network: {} edges", edges.len());
    Ok((preamble, edges))
}

/// Write a network file in the preamble's declared encoding.
pub fn write_network<P: AsRef<Path>>(
    path: P,
    preamble: &Preamble,
    edges: &[EdgeData],
) -> Result<()> {
    let fields = preamble.fields();
    let mut out = Vec::new();

    serde_json::to_writer(&mut out, preamble)?;
    out.push(b'\n');
    out.extend_from_slice(preamble.header_line().as_bytes());
    out.push(b'\n');

    match preamble.encoding {
        Encoding::Text => {
            for edge in edges {
                out.extend_from_slice(edge.to_record(&fields).join(",").as_bytes());
                out.push(b'\n');
            }
        }
        Encoding::Binary => {
            for edge in edges {
                edge.write_binary(&mut out, &fields, preamble.sizeof_pid)?;
            }
        }
    }

    let mut file = fs::File::create(path.as_ref())
        .map_err(|e| Error::resource(format!("{}: {}", path.as_ref().display(), e)))?;
    file.write_all(&out)?;
    Ok(())
}

fn find_newline(bytes: &[u8], from: usize) -> Option<usize> {
    bytes[from..].iter().position(|&b| b == b'\n').map(|i| from + i)
}

/// The file name of a per-part network written by the partitioner.
pub fn part_file_name<P: AsRef<Path>>(path: P, part: usize, parts: usize) -> std::path::PathBuf {
    let mut name = path.as_ref().as_os_str().to_os_string();
    name.push(format!(".{}of{}", part, parts));
    name.into()
}

/// Write one network file per partition, each with partition metadata in the
/// preamble so a later run with the same part count can reuse them.
pub fn write_part_files<P: AsRef<Path>>(
    path: P,
    preamble: &Preamble,
    edges: &[EdgeData],
    boundaries: &[Boundary],
) -> Result<()> {
    for (part, boundary) in boundaries.iter().enumerate() {
        let slice = &edges[boundary.edges_begin..boundary.edges_end];
        let mut part_preamble = preamble.clone();
        part_preamble.number_of_edges = slice.len() as u64;
        part_preamble.partition = Some(PartitionInfo {
            number_of_parts: boundaries.len(),
            part,
            first_local_node: boundary.first,
            beyond_local_node: boundary.beyond,
            number_of_edges: slice.len() as u64,
        });

        let file = part_file_name(path.as_ref(), part, boundaries.len());
        write_network(&file, &part_preamble, slice)?;
        info!(
            "partition {}: [{}, {}) with {} edges -> {}",
            part,
            boundary.first,
            boundary.beyond,
            slice.len(),
            file.display()
        );
    }
    Ok(())
}

/// Load per-part files previously written by the partitioner, if a complete
/// and consistent set for the requested part count exists.
pub fn try_load_existing_parts<P: AsRef<Path>>(
    path: P,
    parts: usize,
) -> Result<Option<Vec<(Preamble, Vec<EdgeData>)>>> {
    let mut loaded = Vec::with_capacity(parts);

    for part in 0..parts {
        let file = part_file_name(path.as_ref(), part, parts);
        if !file.exists() {
            return Ok(None);
        }
        let (preamble, edges) = read_network(&file)?;
        match &preamble.partition {
            Some(info) if info.number_of_parts == parts && info.part == part => {}
            _ => return Ok(None),
        }
        loaded.push((preamble, edges));
    }

    Ok(Some(loaded))
}

/// Load a contact network and split it into `parts` in-memory partitions.
///
/// A valid on-disk partition for the requested part count is reused;
/// otherwise the file is read once, sorted, and cut on node boundaries. The
/// in-memory path is rejected when the edge count exceeds `edge_limit`.
pub fn load_partitioned<P: AsRef<Path>>(
    path: P,
    parts: usize,
    edge_limit: u64,
) -> Result<(Preamble, Vec<Network>)> {
    if let Some(loaded) = try_load_existing_parts(path.as_ref(), parts)? {
        info!("reusing on-disk partition for {} parts", parts);
        let preamble = loaded[0].0.clone();
        let mut networks = Vec::with_capacity(parts);
        for (part_preamble, mut edges) in loaded {
            edges.sort_by(|a, b| a.compare(b));
            let info = part_preamble
                .partition
                .as_ref()
                .ok_or_else(|| Error::semantic("part file lost its partition descriptor"))?;
            let boundary = Boundary {
                first: info.first_local_node,
                beyond: info.beyond_local_node,
                edges_begin: 0,
                edges_end: edges.len(),
            };
            networks.push(Network::build(
                info.part,
                boundary,
                edges,
                part_preamble.time_resolution,
                part_preamble.source_only_nodes.as_deref().unwrap_or(&[]),
            ));
        }
        return Ok((preamble, networks));
    }

    let (preamble, mut edges) = read_network(path.as_ref())?;

    if preamble.number_of_edges > edge_limit {
        return Err(Error::resource(format!(
            "network has {} edges which exceeds the partition edge limit {}",
            preamble.number_of_edges, edge_limit
        )));
    }

    edges.sort_by(|a, b| a.compare(b));

    let source_only = preamble.source_only_nodes.clone().unwrap_or_default();
    let mut id_min = NodeId::max_value();
    let mut id_max = 0;
    for edge in &edges {
        id_min = id_min.min(edge.target).min(edge.source);
        id_max = id_max.max(edge.target).max(edge.source);
    }
    for &id in &source_only {
        id_min = id_min.min(id);
        id_max = id_max.max(id);
    }

    let boundaries = compute_boundaries(&edges, parts, id_min, id_max)?;

    let mut networks = Vec::with_capacity(parts);
    for (rank, boundary) in boundaries.iter().enumerate() {
        let slice = edges[boundary.edges_begin..boundary.edges_end].to_vec();
        networks.push(Network::build(
            rank,
            Boundary {
                edges_begin: 0,
                edges_end: slice.len(),
                ..*boundary
            },
            slice,
            preamble.time_resolution,
            &source_only,
        ));
    }

    info!(
        "loaded network: {} nodes, {} edges, {} parts",
        preamble.number_of_nodes,
        preamble.number_of_edges,
        parts
    );
    Ok((preamble, networks))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::edge::EdgeData;
    use crate::traits::TraitDef;
    use std::env;

    fn activity_def() -> TraitDef {
        serde_json::from_str(
            r#"{"id": "activityTrait", "features": [
                 {"id": "activityType", "enums": [{"id": "home"}, {"id": "other"}]}]}"#,
        )
        .unwrap()
    }

    fn preamble(encoding: Encoding, edges: u64) -> Preamble {
        Preamble {
            schema: None,
            encoding,
            number_of_nodes: 4,
            number_of_edges: edges,
            sizeof_pid: 8,
            time_resolution: 86400.0,
            accumulation_time: None,
            has_location_id_field: true,
            has_active_field: true,
            has_weight_field: true,
            sizeof_activity: 4,
            activity_encoding: activity_def(),
            sizeof_edge_trait: 0,
            edge_trait_encoding: None,
            partition: None,
            source_only_nodes: Some(vec![9]),
        }
    }

    fn sample_edges() -> Vec<EdgeData> {
        let mut edges = vec![EdgeData::new(1, 2), EdgeData::new(2, 1), EdgeData::new(2, 3)];
        for (i, edge) in edges.iter_mut().enumerate() {
            edge.duration = 3600.0 * (i as f64 + 1.0);
            edge.location_id = Some(100 + i as u64);
            edge.weight = 0.5 + i as f64;
            edge.active = i != 1;
        }
        edges.sort_by(|a, b| a.compare(b));
        edges
    }

    #[test]
    fn file_roundtrip_text_and_binary() {
        for (name, encoding) in
            &[("roundtrip-text.txt", Encoding::Text), ("roundtrip-bin.txt", Encoding::Binary)]
        {
            let path = env::temp_dir().join(name);
            let edges = sample_edges();
            write_network(&path, &preamble(*encoding, edges.len() as u64), &edges).unwrap();

            let (back_preamble, back_edges) = read_network(&path).unwrap();
            assert_eq!(back_preamble.encoding, *encoding);
            assert_eq!(back_preamble.source_only_nodes, Some(vec![9]));
            assert_eq!(back_edges, edges);

            let _ = fs::remove_file(&path);
        }
    }

    #[test]
    fn partitioned_load_covers_all_edges() {
        let path = env::temp_dir().join("partitioned-load.txt");
        let edges = sample_edges();
        write_network(&path, &preamble(Encoding::Text, edges.len() as u64), &edges).unwrap();

        let (_, networks) = load_partitioned(&path, 2, 1_000).unwrap();
        assert_eq!(networks.len(), 2);
        let total: usize = networks.iter().map(|n| n.edges().len()).sum();
        assert_eq!(total, edges.len());
        // source-only node 9 is local to the last interval
        assert!(networks.iter().any(|n| n.lookup_node(9).is_some()));

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn edge_limit_rejects_in_memory_path() {
        let path = env::temp_dir().join("limited-load.txt");
        let edges = sample_edges();
        write_network(&path, &preamble(Encoding::Text, edges.len() as u64), &edges).unwrap();

        assert!(load_partitioned(&path, 1, 2).is_err());
        let _ = fs::remove_file(&path);
    }
}
