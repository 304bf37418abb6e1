use crate::db::RetryPolicy;
use crate::error::{Error, Result};
use crate::network::Encoding;
use crate::prelude::{Real, Tick};
use crate::traits::TraitDef;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReseedDef {
    pub tick: Tick,
    pub seed: u64,
}

/// Configuration of the optional per-tick active-subgraph dump.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpActiveNetworkDef {
    pub output: PathBuf,
    #[serde(default)]
    pub threshold: Real,
    pub start_tick: Tick,
    pub end_tick: Tick,
    #[serde(default = "one")]
    pub tick_increment: Tick,
    #[serde(default)]
    pub encoding: Encoding,
}

fn one() -> Tick {
    1
}

fn default_edge_limit() -> u64 {
    100_000_000
}

fn default_partitions() -> usize {
    1
}

/// The run-parameter document passed to the simulator with `--config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunConfig {
    pub model_scenario: PathBuf,
    pub start_tick: Tick,
    pub end_tick: Tick,
    #[serde(default)]
    pub output: Option<PathBuf>,
    #[serde(default)]
    pub summary_output: Option<PathBuf>,
    #[serde(default)]
    pub status: Option<PathBuf>,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub reseed: Vec<ReseedDef>,
    #[serde(default)]
    pub replicate: Option<u64>,
    /// In-memory partition count; stands in for the process count of a
    /// distributed deployment.
    #[serde(default = "default_partitions")]
    pub partitions: usize,
    #[serde(default = "default_edge_limit")]
    pub partition_edge_limit: u64,
    #[serde(default)]
    pub log_level: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default)]
    pub db_host: Option<String>,
    #[serde(default)]
    pub db_user: Option<String>,
    #[serde(default)]
    pub db_password: Option<String>,
    #[serde(default)]
    pub db_max_records: Option<u64>,
    #[serde(default)]
    pub db_connection: Option<RetryPolicy>,
    #[serde(default)]
    pub dump_active_network: Option<DumpActiveNetworkDef>,
    #[serde(default)]
    pub plugins: Vec<PathBuf>,
}

impl RunConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<RunConfig> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::resource(format!("{}: {}", path.as_ref().display(), e)))?;
        let config: RunConfig = serde_json::from_str(&text)
            .map_err(|e| Error::configuration(format!("run parameters: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.end_tick < self.start_tick {
            return Err(Error::configuration("endTick must not precede startTick"));
        }
        if self.partitions == 0 {
            return Err(Error::configuration("partitions must be positive"));
        }
        Ok(())
    }

    pub fn seed_or_default(&self) -> u64 {
        self.seed.unwrap_or(0)
    }

    pub fn replicate_or_default(&self) -> u64 {
        self.replicate.unwrap_or(0)
    }

    /// The reseed scheduled for a tick, if any.
    pub fn reseed_at(&self, tick: Tick) -> Option<u64> {
        self.reseed.iter().find(|r| r.tick == tick).map(|r| r.seed)
    }
}

/// The model-scenario document referenced by the run parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelScenario {
    pub contact_network: PathBuf,
    pub disease_model: PathBuf,
    #[serde(default)]
    pub initialization: Option<PathBuf>,
    #[serde(default)]
    pub intervention: Option<PathBuf>,
    #[serde(default)]
    pub traits: Option<PathBuf>,
    #[serde(default, rename = "personTraitDB")]
    pub person_trait_db: Vec<PathBuf>,
}

impl ModelScenario {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<ModelScenario> {
        let text = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::resource(format!("{}: {}", path.as_ref().display(), e)))?;
        serde_json::from_str(&text)
            .map_err(|e| Error::configuration(format!("model scenario: {}", e)))
    }

    /// Resolve a path relative to the scenario file's directory.
    pub fn resolve<P: AsRef<Path>>(base: P, path: &Path) -> PathBuf {
        if path.is_absolute() {
            return path.to_path_buf();
        }
        base.as_ref()
            .parent()
            .map(|dir| dir.join(path))
            .unwrap_or_else(|| path.to_path_buf())
    }
}

/// The traits document: person, activity and edge trait declarations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraitsDoc {
    #[serde(default)]
    pub traits: Vec<TraitDef>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minimal_config() {
        let config: RunConfig = serde_json::from_str(
            r#"{"modelScenario": "scenario.json", "startTick": 0, "endTick": 10}"#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.partitions, 1);
        assert_eq!(config.partition_edge_limit, 100_000_000);
        assert!(config.reseed_at(3).is_none());
    }

    #[test]
    fn roundtrip() {
        let config: RunConfig = serde_json::from_str(
            r#"{
              "modelScenario": "scenario.json",
              "startTick": 0,
              "endTick": 30,
              "seed": 42,
              "replicate": 2,
              "partitions": 4,
              "reseed": [{"tick": 10, "seed": 7}],
              "dumpActiveNetwork": {
                "output": "active.txt", "threshold": 0.5,
                "startTick": 0, "endTick": 30
              }
            }"#,
        )
        .unwrap();
        let text = serde_json::to_string(&config).unwrap();
        let back: RunConfig = serde_json::from_str(&text).unwrap();
        assert_eq!(back.seed, Some(42));
        assert_eq!(back.reseed_at(10), Some(7));
        assert_eq!(back.dump_active_network.as_ref().unwrap().tick_increment, 1);
    }

    #[test]
    fn invalid_tick_range_rejected() {
        let config: RunConfig = serde_json::from_str(
            r#"{"modelScenario": "s.json", "startTick": 5, "endTick": 4}"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
