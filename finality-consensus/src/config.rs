use std::{fs, io, path::Path, time::Duration};

use serde::{Deserialize, Serialize};

/// Supermajority rule. A phase completes once strictly more than
/// `⌊round_size · numerator / denominator⌋` BPs voted for the same digest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuorumPolicy {
    pub numerator: usize,
    pub denominator: usize,
}

impl Default for QuorumPolicy {
    fn default() -> Self {
        Self { numerator: 2, denominator: 3 }
    }
}

impl QuorumPolicy {
    /// Largest tally that is still not a quorum.
    pub fn threshold(&self, round_size: usize) -> usize {
        if self.denominator == 0 {
            return round_size;
        }
        round_size * self.numerator / self.denominator
    }

    /// Smallest tally that is a quorum.
    pub fn quorum(&self, round_size: usize) -> usize {
        self.threshold(round_size) + 1
    }
}

/// How long and how often the block pool is polled for a pending block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchPolicy {
    pub poll_interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for FetchPolicy {
    fn default() -> Self {
        Self { poll_interval_ms: 500, timeout_ms: 10_000 }
    }
}

impl FetchPolicy {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsensusConfig {
    pub quorum: QuorumPolicy,
    pub fetch: FetchPolicy,
    /// Start the next round on its own task as soon as a block finalizes.
    pub chain_rounds: bool,
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            quorum: QuorumPolicy::default(),
            fetch: FetchPolicy::default(),
            chain_rounds: true,
        }
    }
}

impl ConsensusConfig {
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> io::Result<()> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
        fs::write(path, json)
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let data = fs::read_to_string(path)?;
        serde_json::from_str::<ConsensusConfig>(&data)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bft_threshold() {
        let policy = QuorumPolicy::default();
        // 7 BPs: ⌊14/3⌋ = 4, so five votes are needed
        assert_eq!(policy.threshold(7), 4);
        assert_eq!(policy.quorum(7), 5);
        // 4 BPs: ⌊8/3⌋ = 2, three votes
        assert_eq!(policy.quorum(4), 3);
        assert_eq!(policy.quorum(21), 15);
    }

    #[test]
    fn test_zero_denominator_never_reaches_quorum_early() {
        let policy = QuorumPolicy { numerator: 2, denominator: 0 };
        assert_eq!(policy.threshold(7), 7);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let cfg: ConsensusConfig = serde_json::from_str(r#"{"fetch":{"timeout_ms":2000}}"#).unwrap();
        assert_eq!(cfg.fetch.timeout_ms, 2000);
        assert_eq!(cfg.fetch.poll_interval_ms, 500);
        assert_eq!(cfg.quorum, QuorumPolicy::default());
        assert!(cfg.chain_rounds);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("consensus.json");
        let cfg = ConsensusConfig { chain_rounds: false, ..Default::default() };
        cfg.save_to_file(&path).unwrap();
        assert_eq!(ConsensusConfig::load_from_file(&path).unwrap(), cfg);
    }
}
