use thiserror::Error;

use finality_common::auth::AuthError;
use finality_consensus::ConsensusError;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed config file: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Config(String),

    #[error("key error: {0}")]
    Auth(#[from] AuthError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("devnet stalled: {committed}/{expected} blocks finalized on every BP")]
    Stalled { committed: u64, expected: u64 },

    #[error("BPs finalized different blocks at #{seq_no}")]
    Diverged { seq_no: u64 },
}
