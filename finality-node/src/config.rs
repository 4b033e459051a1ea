use std::{fs, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

use finality_consensus::ConsensusConfig;

use crate::error::NodeError;

/// Devnet settings, read from a JSON file and overridable from the CLI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub node_name: String,
    /// Number of block producers in the committee.
    pub bp_count: usize,
    /// Blocks to finalize before the devnet stops.
    pub rounds: u64,
    pub block_interval_ms: u64,
    /// Capacity of each BP's inbound and outbound queues.
    pub outbound_queue: usize,
    pub consensus: ConsensusConfig,
    /// Directory for the `consensus` audit log; stdout only when unset.
    pub log_dir: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            node_name: "devnet".to_string(),
            bp_count: 4,
            rounds: 5,
            block_interval_ms: 200,
            outbound_queue: 1024,
            consensus: ConsensusConfig::default(),
            log_dir: None,
        }
    }
}

impl Config {
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), NodeError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, NodeError> {
        let data = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&data)?)
    }

    pub fn validate(&self) -> Result<(), NodeError> {
        if self.bp_count == 0 {
            return Err(NodeError::Config("bp_count must be at least 1".into()));
        }
        if self.rounds == 0 {
            return Err(NodeError::Config("rounds must be at least 1".into()));
        }
        if self.outbound_queue == 0 {
            return Err(NodeError::Config("outbound_queue must be at least 1".into()));
        }
        if self.consensus.quorum.denominator == 0 {
            return Err(NodeError::Config("quorum denominator must not be zero".into()));
        }
        Ok(())
    }

    pub fn block_interval(&self) -> Duration {
        Duration::from_millis(self.block_interval_ms)
    }

    /// Upper bound for a full devnet run: every block produced, plus one
    /// full block wait of slack.
    pub fn run_deadline(&self) -> Duration {
        self.block_interval() * (self.rounds as u32 + 1) + self.consensus.fetch.timeout()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_save_and_load_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = Config::default();
        config.bp_count = 7;
        config.log_dir = Some("logs".into());
        config.save_to_file(&path).unwrap();

        assert_eq!(Config::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_missing_fields_take_defaults() {
        let config: Config = serde_json::from_str(r#"{"rounds": 9}"#).unwrap();
        assert_eq!(config.rounds, 9);
        assert_eq!(config.bp_count, 4);
        assert_eq!(config.consensus.fetch.timeout_ms, 10_000);
    }

    #[test]
    fn test_validate_rejects_empty_committee() {
        let config = Config { bp_count: 0, ..Default::default() };
        assert!(matches!(config.validate(), Err(NodeError::Config(_))));
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_broken_file_is_serde_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ not json").unwrap();
        assert!(matches!(Config::load_from_file(&path), Err(NodeError::Serde(_))));
    }
}
