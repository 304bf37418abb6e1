use epinet::error::{Error, Result};
use epinet::network::{compute_boundaries, read_network, write_part_files};
use epinet::prelude::NodeId;
use log::{error, info};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::PathBuf;
use std::process;

/// Configuration of the stand-alone partitioner.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartitionConfig {
    contact_network: PathBuf,
    number_of_parts: usize,
}

fn run(path: &str) -> Result<()> {
    let text = fs::read_to_string(path).map_err(|e| Error::resource(format!("{}: {}", path, e)))?;
    let config: PartitionConfig = serde_json::from_str(&text)
        .map_err(|e| Error::configuration(format!("partition parameters: {}", e)))?;

    let (preamble, mut edges) = read_network(&config.contact_network)?;
    edges.sort_by(|a, b| a.compare(b));

    let mut id_min = NodeId::max_value();
    let mut id_max = 0;
    for edge in &edges {
        id_min = id_min.min(edge.target).min(edge.source);
        id_max = id_max.max(edge.target).max(edge.source);
    }
    if let Some(source_only) = &preamble.source_only_nodes {
        for &id in source_only {
            id_min = id_min.min(id);
            id_max = id_max.max(id);
        }
    }

    let boundaries = compute_boundaries(&edges, config.number_of_parts, id_min, id_max)?;
    write_part_files(&config.contact_network, &preamble, &edges, &boundaries)?;
    info!(
        "partition: wrote {} parts for {}",
        boundaries.len(),
        config.contact_network.display()
    );
    Ok(())
}

pub fn main() {
    use simple_logger::SimpleLogger;
    SimpleLogger::new().init().unwrap();

    let mut args = env::args().skip(1);
    let path = loop {
        match args.next() {
            Some(arg) if arg == "--config" => break args.next(),
            Some(_) => continue,
            None => break None,
        }
    };
    let path = match path {
        Some(path) => path,
        None => {
            eprintln!("usage: partition --config <partitionParameters.json>");
            process::exit(2);
        }
    };

    if let Err(e) = run(&path) {
        error!("partition: {}", e);
        process::exit(1);
    }
}
