use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crypto::hash::Hash;

/// Phases of the two-step finality protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VotePhase {
    /// Nodes announce they hold the block and consider it valid.
    PreCommit,
    /// Nodes confirm they have seen a supermajority of pre-commits.
    Commit,
}

impl From<VotePhase> for u32 {
    fn from(p: VotePhase) -> Self {
        match p {
            VotePhase::PreCommit => 0,
            VotePhase::Commit => 1,
        }
    }
}

impl TryFrom<u32> for VotePhase {
    /// The unrecognised raw value.
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(VotePhase::PreCommit),
            1 => Ok(VotePhase::Commit),
            other => Err(other),
        }
    }
}

impl fmt::Display for VotePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            VotePhase::PreCommit => "PRE_COMMIT",
            VotePhase::Commit => "COMMIT",
        };
        write!(f, "{}", s)
    }
}

/// A signed vote of one BP for one block at one sequence number.
///
/// `signature` covers `digest` only; `public_key` is the raw ed25519 key of
/// the voter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusVote {
    pub phase: VotePhase,
    pub seq_no: u64,
    pub digest: Hash,
    #[serde(with = "hex::serde")]
    pub public_key: Vec<u8>,
    #[serde(with = "hex::serde")]
    pub signature: Vec<u8>,
}

impl ConsensusVote {
    pub fn new(
        phase: VotePhase,
        seq_no: u64,
        digest: Hash,
        public_key: Vec<u8>,
        signature: Vec<u8>,
    ) -> Self {
        Self { phase, seq_no, digest, public_key, signature }
    }

    /// Bytes covered by the signature.
    pub fn signing_bytes(&self) -> &[u8] {
        self.digest.as_bytes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_wire_values() {
        assert_eq!(u32::from(VotePhase::PreCommit), 0);
        assert_eq!(u32::from(VotePhase::Commit), 1);
        assert_eq!(VotePhase::try_from(1), Ok(VotePhase::Commit));
        assert_eq!(VotePhase::try_from(7), Err(7));
    }

    #[test]
    fn test_phase_display() {
        assert_eq!(VotePhase::PreCommit.to_string(), "PRE_COMMIT");
        assert_eq!(VotePhase::Commit.to_string(), "COMMIT");
    }
}
