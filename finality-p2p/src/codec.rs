//! Wire format of consensus votes.
//!
//! A vote travels as a versioned [`ConsensusMsg`] encoded with bincode. The
//! phase stays a raw integer on the wire so that a receiver can tell an
//! unknown phase apart from a malformed message.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use finality_common::{ConsensusVote, Hash, VotePhase};

/// Message-type tag the consensus engine registers with the transport.
pub const CONSENSUS_MSG: &str = "consensus";

/// Schema version written by this node.
pub const WIRE_VERSION: u8 = 1;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to encode consensus message: {0}")]
    Encode(String),

    #[error("failed to decode consensus message: {0}")]
    Decode(String),

    #[error("unsupported wire version {0}")]
    UnsupportedVersion(u8),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusMsg {
    pub version: u8,
    pub phase: u32,
    pub seq_no: u64,
    pub digest: [u8; 32],
    pub public_key: Vec<u8>,
    pub signature: Vec<u8>,
}

impl ConsensusMsg {
    pub fn phase(&self) -> Result<VotePhase, u32> {
        VotePhase::try_from(self.phase)
    }

    /// Converts into a typed vote, returning the raw phase if it is unknown.
    pub fn into_vote(self) -> Result<ConsensusVote, u32> {
        let phase = self.phase()?;
        Ok(ConsensusVote {
            phase,
            seq_no: self.seq_no,
            digest: Hash(self.digest),
            public_key: self.public_key,
            signature: self.signature,
        })
    }
}

impl From<&ConsensusVote> for ConsensusMsg {
    fn from(vote: &ConsensusVote) -> Self {
        Self {
            version: WIRE_VERSION,
            phase: vote.phase.into(),
            seq_no: vote.seq_no,
            digest: vote.digest.0,
            public_key: vote.public_key.clone(),
            signature: vote.signature.clone(),
        }
    }
}

pub fn encode_msg(msg: &ConsensusMsg) -> Result<Vec<u8>, CodecError> {
    bincode::serialize(msg).map_err(|e| CodecError::Encode(e.to_string()))
}

pub fn encode_vote(vote: &ConsensusVote) -> Result<Vec<u8>, CodecError> {
    encode_msg(&ConsensusMsg::from(vote))
}

/// Decodes the envelope and checks its schema version. The phase is left
/// unchecked.
pub fn decode_vote(bytes: &[u8]) -> Result<ConsensusMsg, CodecError> {
    let msg: ConsensusMsg =
        bincode::deserialize(bytes).map_err(|e| CodecError::Decode(e.to_string()))?;
    if msg.version != WIRE_VERSION {
        return Err(CodecError::UnsupportedVersion(msg.version));
    }
    Ok(msg)
}
