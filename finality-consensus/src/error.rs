use libp2p::PeerId;
use thiserror::Error;

use finality_common::{Hash, VotePhase};
use finality_p2p::CodecError;

use crate::consensus::round::RoundStatus;

#[derive(Debug, Error)]
pub enum ConsensusError {
    #[error("failed to decode consensus message: {0}")]
    Decode(#[from] CodecError),

    #[error("invalid bp: peer {0} is not in the selected BP set")]
    UnknownSender(PeerId),

    #[error("unknown message phase {0}")]
    UnknownPhase(u32),

    #[error("digest is invalid: expected {expected}, got {got}")]
    DigestMismatch { expected: Hash, got: Hash },

    #[error("signature is invalid: {0}")]
    SignatureInvalid(String),

    #[error("vote public key does not belong to sender {0}")]
    PublicKeyMismatch(PeerId),

    #[error("receipts root {computed} does not match block header receipts root {declared}")]
    ReceiptMismatch { declared: Hash, computed: Hash },

    #[error("wait for block #{seq_no} timeout")]
    Timeout { seq_no: u64 },

    #[error("failed to sign vote: {0}")]
    Signing(String),

    #[error("failed to encode vote for broadcast: {0}")]
    BroadcastEncode(CodecError),

    #[error("peer {peer} voted {phase} for both {first} and {second}")]
    Equivocation { peer: PeerId, phase: VotePhase, first: Hash, second: Hash },

    #[error("vote for #{seq_no} is stale, current round is #{current}")]
    StaleVote { seq_no: u64, current: u64 },

    #[error("vote for #{seq_no} is too far ahead of current round #{current}")]
    FutureVote { seq_no: u64, current: u64 },

    #[error("round #{seq_no} is closed ({status})")]
    RoundClosed { seq_no: u64, status: RoundStatus },

    #[error("invalid engine setup: {0}")]
    Config(String),
}

impl ConsensusError {
    /// Only a block wait timing out ends a round.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConsensusError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, ConsensusError>;
