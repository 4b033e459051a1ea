use std::sync::Arc;

use libp2p::PeerId;
use tracing::info;

use finality_common::ConsensusVote;
use finality_p2p::{encode_vote, Transport, CONSENSUS_MSG};

use crate::{
    error::{ConsensusError, Result},
    ports::BpSetProvider,
};

/// Hands the local node's votes to the transport for the current BP set.
///
/// Only encoding can fail here; delivery is fire-and-forget and never
/// retried.
#[derive(Clone)]
pub struct VoteBroadcaster {
    local_peer: PeerId,
    transport: Arc<dyn Transport>,
    bps: Arc<dyn BpSetProvider>,
}

impl VoteBroadcaster {
    pub fn new(local_peer: PeerId, transport: Arc<dyn Transport>, bps: Arc<dyn BpSetProvider>) -> Self {
        Self { local_peer, transport, bps }
    }

    pub fn broadcast(&self, vote: &ConsensusVote) -> Result<()> {
        let data = encode_vote(vote).map_err(ConsensusError::BroadcastEncode)?;

        let targets: Vec<PeerId> = self
            .bps
            .current_bps()
            .peer_ids()
            .into_iter()
            .filter(|p| *p != self.local_peer)
            .collect();

        info!(
            target: "consensus",
            "EVENT:BROADCAST phase={} seq={} digest={} targets={}",
            vote.phase,
            vote.seq_no,
            vote.digest.short(),
            targets.len()
        );
        self.transport.multicast(&targets, CONSENSUS_MSG, data);
        Ok(())
    }
}
