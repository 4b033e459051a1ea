use std::sync::Arc;

use async_trait::async_trait;
use libp2p::PeerId;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use finality_common::{auth::Authenticator, Block, BpInfo, ConsensusVote, Hash, VotePhase};
use finality_p2p::{decode_vote, Protocol, ProtocolError, Transport, CONSENSUS_MSG};

use crate::{
    config::ConsensusConfig,
    error::{ConsensusError, Result},
    ports::{BlockPool, BpSetProvider, ReceiptsCache},
};

use super::{
    broadcaster::VoteBroadcaster,
    receipts::ReceiptsStore,
    reconciler::BlockReconciler,
    round::{RoundSnapshot, RoundState, RoundStatus, Step},
    validator,
};

/// What a single call into the engine did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// Vote added to the tally of its phase.
    Counted { phase: VotePhase, seq_no: u64, votes: usize },
    /// Same BP, same phase, same digest: nothing changed.
    Duplicate,
    /// Held back until this node can count it.
    Buffered,
    /// Arrived too late to matter for its round.
    Ignored,
    /// The local node cast and broadcast its own vote.
    VoteCast { phase: VotePhase, seq_no: u64 },
    /// PRE_COMMIT quorum reached, the node now collects COMMIT votes.
    AdvancedToCommit { seq_no: u64, digest: Hash },
    /// COMMIT quorum reached and the block was handed to the pool.
    Finalized { seq_no: u64, block_hash: Hash },
}

struct EngineState {
    round: RoundState,
    // votes for seq_no + 1, replayed when that round opens
    next_round: Vec<(PeerId, ConsensusVote)>,
}

struct EngineInner {
    local_peer: PeerId,
    config: ConsensusConfig,
    auth: Arc<dyn Authenticator>,
    bps: Arc<dyn BpSetProvider>,
    pool: Arc<dyn BlockPool>,
    receipts: Arc<dyn ReceiptsCache>,
    reconciler: BlockReconciler,
    broadcaster: VoteBroadcaster,
    state: Mutex<EngineState>,
}

/// Two-phase BFT finality for one BP node.
///
/// One round is live at a time. Messages for it may be handled
/// concurrently; tally updates and phase transitions are serialized by an
/// internal lock that is never held while waiting for a block.
#[derive(Clone)]
pub struct RoundEngine {
    inner: Arc<EngineInner>,
}

impl RoundEngine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    pub fn local_peer(&self) -> PeerId {
        self.inner.local_peer
    }

    pub fn config(&self) -> &ConsensusConfig {
        &self.inner.config
    }

    pub async fn seq_no(&self) -> u64 {
        self.inner.state.lock().await.round.seq_no()
    }

    pub async fn status(&self) -> RoundStatus {
        self.inner.state.lock().await.round.status()
    }

    pub async fn snapshot(&self) -> RoundSnapshot {
        self.inner.state.lock().await.round.snapshot()
    }

    /// Entry point for raw consensus messages from the transport.
    pub async fn handle_message(&self, sender: PeerId, raw: &[u8]) -> Result<Outcome> {
        let result = self.process_message(sender, raw).await;
        if let Err(err) = &result {
            match err {
                ConsensusError::StaleVote { .. }
                | ConsensusError::FutureVote { .. }
                | ConsensusError::RoundClosed { .. } => debug!("dropped message from {}: {}", sender, err),
                _ => warn!("⚠️ rejected message from {}: {}", sender, err),
            }
        }
        result
    }

    async fn process_message(&self, sender: PeerId, raw: &[u8]) -> Result<Outcome> {
        let msg = decode_vote(raw)?;

        // membership comes before anything about the content
        if !self.inner.bps.current_bps().contains(&sender) {
            return Err(ConsensusError::UnknownSender(sender));
        }

        let vote = msg.into_vote().map_err(|phase| {
            error!("error: unknown message phase {}", phase);
            ConsensusError::UnknownPhase(phase)
        })?;

        self.handle_vote(sender, vote).await
    }

    /// Applies an already decoded vote from `sender`.
    pub async fn handle_vote(&self, sender: PeerId, vote: ConsensusVote) -> Result<Outcome> {
        {
            let bps = self.inner.bps.current_bps();
            let Some(registered) = bps.public_key_of(&sender) else {
                return Err(ConsensusError::UnknownSender(sender));
            };
            if registered != vote.public_key.as_slice() {
                return Err(ConsensusError::PublicKeyMismatch(sender));
            }
        }
        validator::check_vote_signature(&vote)?;

        match vote.phase {
            VotePhase::PreCommit => self.on_pre_commit(sender, vote).await,
            VotePhase::Commit => self.on_commit(sender, vote).await,
        }
    }

    /// Casts the local PRE_COMMIT for the current round once its block is in
    /// the pool.
    pub async fn start_round(&self) -> Result<Outcome> {
        let seq_no = {
            let state = self.inner.state.lock().await;
            state.round.ensure_open()?;
            if state.round.has_own_pre_commit() {
                return Ok(Outcome::Ignored);
            }
            if !self.is_voter() {
                debug!("{} holds no BP seat, not voting on #{}", self.inner.local_peer, state.round.seq_no());
                return Ok(Outcome::Ignored);
            }
            state.round.seq_no()
        };

        info!("🚀 starting round #{}", seq_no);
        let fetched = self.inner.reconciler.fetch_block(seq_no).await;

        let mut state = self.inner.state.lock().await;
        if state.round.seq_no() != seq_no {
            return Ok(Outcome::Ignored);
        }
        let block = match fetched {
            Ok(block) => block,
            Err(err) => {
                self.fail_round(&mut state, &err);
                return Err(err);
            }
        };
        state.round.ensure_open()?;
        if state.round.has_own_pre_commit() {
            return Ok(Outcome::Ignored);
        }

        let vote = self.signed_vote(VotePhase::PreCommit, &block)?;
        self.inner.broadcaster.broadcast(&vote)?;
        state.round.mark_own_pre_commit();

        if state.round.status() != RoundStatus::CollectingPreCommit {
            return Ok(Outcome::VoteCast { phase: VotePhase::PreCommit, seq_no });
        }

        let dropped = state.round.set_candidate(block.clone());
        if dropped > 0 {
            warn!("dropped {} PRE_COMMIT votes not matching local block #{}", dropped, seq_no);
        }

        match state.round.record_pre_commit(self.inner.local_peer, &vote)? {
            Step::Quorum => self.complete_pre_commit(&mut state, block, &vote),
            _ if state.round.quorum_on_candidate() && state.round.claim_transition() => {
                self.complete_pre_commit(&mut state, block, &vote)
            }
            _ => Ok(Outcome::VoteCast { phase: VotePhase::PreCommit, seq_no }),
        }
    }

    /// Opens `seq_no` directly, leaving the current round behind. Used to
    /// move past a failed round; does not cast a vote.
    pub async fn advance_to(&self, seq_no: u64) -> bool {
        let mut state = self.inner.state.lock().await;
        let current = state.round.seq_no();
        if seq_no <= current {
            debug!("not advancing to #{}, round #{} already open", seq_no, current);
            return false;
        }
        info!("⏭️ leaving round #{} ({}) for #{}", current, state.round.status(), seq_no);
        self.open_round(&mut state, seq_no);
        true
    }

    /// Signs `hash(hash(block))` with the node's key.
    ///
    /// Returns the digest, the raw public key and the signature.
    pub fn sign_block(&self, block: &Block) -> Result<(Hash, Vec<u8>, Vec<u8>)> {
        let digest = block.digest();
        let signature = self.inner.auth.sign(digest.as_bytes()).map_err(|e| {
            error!("failed to sign vote for #{}, err:{}", block.seq_no, e);
            ConsensusError::Signing(e.to_string())
        })?;
        Ok((digest, self.inner.auth.public_key(), signature))
    }

    /// The local key must be registered in the current BP set for this node
    /// to vote.
    fn is_voter(&self) -> bool {
        let key = self.inner.auth.public_key();
        self.inner.bps.current_bps().public_key_of(&self.inner.local_peer) == Some(key.as_slice())
    }

    fn signed_vote(&self, phase: VotePhase, block: &Block) -> Result<ConsensusVote> {
        let (digest, public_key, signature) = self.sign_block(block)?;
        Ok(ConsensusVote::new(phase, block.seq_no, digest, public_key, signature))
    }

    async fn on_pre_commit(&self, sender: PeerId, vote: ConsensusVote) -> Result<Outcome> {
        let seq_no = vote.seq_no;
        {
            let mut state = self.inner.state.lock().await;
            if let Some(outcome) = self.route_by_seq(&mut state, sender, &vote)? {
                return Ok(outcome);
            }

            match state.round.record_pre_commit(sender, &vote)? {
                Step::Counted(votes) => {
                    debug!(target: "consensus", "EVENT:RECEIVE_VOTE phase={} seq={} from={} votes={}", vote.phase, seq_no, sender, votes);
                    return Ok(Outcome::Counted { phase: VotePhase::PreCommit, seq_no, votes });
                }
                Step::Duplicate => return Ok(Outcome::Duplicate),
                Step::Late | Step::Buffered => return Ok(Outcome::Ignored),
                Step::Quorum => {}
            }

            if let Some(block) = state.round.candidate() {
                return self.complete_pre_commit(&mut state, block, &vote);
            }
        }

        // quorum claimed before the local block is known
        let fetched = self.inner.reconciler.fetch_block(seq_no).await;

        let mut state = self.inner.state.lock().await;
        if state.round.seq_no() != seq_no || state.round.status() != RoundStatus::CollectingPreCommit {
            return Ok(Outcome::Ignored);
        }
        let block = match fetched {
            Ok(block) => block,
            Err(err) => {
                self.fail_round(&mut state, &err);
                return Err(err);
            }
        };
        let dropped = state.round.set_candidate(block.clone());
        if dropped > 0 {
            warn!("dropped {} PRE_COMMIT votes not matching local block #{}", dropped, seq_no);
        }
        self.complete_pre_commit(&mut state, block, &vote)
    }

    async fn on_commit(&self, sender: PeerId, vote: ConsensusVote) -> Result<Outcome> {
        let mut state = self.inner.state.lock().await;
        if let Some(outcome) = self.route_by_seq(&mut state, sender, &vote)? {
            return Ok(outcome);
        }
        self.tally_commit(&mut state, sender, &vote)
    }

    /// Keeps only votes for the live round; the one after it is buffered.
    fn route_by_seq(
        &self,
        state: &mut EngineState,
        sender: PeerId,
        vote: &ConsensusVote,
    ) -> Result<Option<Outcome>> {
        let current = state.round.seq_no();
        if vote.seq_no < current {
            return Err(ConsensusError::StaleVote { seq_no: vote.seq_no, current });
        }
        if vote.seq_no > current + 1 {
            return Err(ConsensusError::FutureVote { seq_no: vote.seq_no, current });
        }
        if vote.seq_no == current {
            return Ok(None);
        }

        if state
            .next_round
            .iter()
            .any(|(peer, v)| *peer == sender && v.phase == vote.phase)
        {
            return Ok(Some(Outcome::Duplicate));
        }
        // one vote per BP and phase
        let capacity = 2 * self.inner.bps.current_bps().len();
        if state.next_round.len() >= capacity {
            return Err(ConsensusError::FutureVote { seq_no: vote.seq_no, current });
        }
        state.next_round.push((sender, vote.clone()));
        Ok(Some(Outcome::Buffered))
    }

    /// Validates the vote that completed PRE_COMMIT quorum against the local
    /// block, then moves the round to COMMIT.
    fn complete_pre_commit(
        &self,
        state: &mut EngineState,
        block: Arc<Block>,
        trigger: &ConsensusVote,
    ) -> Result<Outcome> {
        let checked = validator::check_vote(&block, trigger).and_then(|_| self.check_cached_receipts(&block));
        let err = match checked {
            Ok(()) => return self.enter_commit(state, block),
            Err(err) => err,
        };

        state.round.release_transition();
        error!("round #{} quorum check failed: {}", block.seq_no, err);

        // The trigger may have been for another digest while the local block
        // already holds a supermajority of its own.
        if matches!(err, ConsensusError::DigestMismatch { .. })
            && state.round.quorum_on_candidate()
            && self.check_cached_receipts(&block).is_ok()
            && state.round.claim_transition()
        {
            let seq_no = block.seq_no;
            match self.enter_commit(state, block) {
                Ok(outcome) => info!("round #{} moved on with the local block's quorum: {:?}", seq_no, outcome),
                Err(e) => warn!("entering COMMIT phase failed: {}", e),
            }
        }
        Err(err)
    }

    fn check_cached_receipts(&self, block: &Block) -> Result<()> {
        match self.inner.receipts.load_receipts(block.seq_no) {
            Some(receipts) => validator::check_receipts(block, &receipts),
            None => Ok(()),
        }
    }

    fn enter_commit(&self, state: &mut EngineState, block: Arc<Block>) -> Result<Outcome> {
        let seq_no = block.seq_no;
        let digest = block.digest();
        let votes = state.round.pre_commit_votes();
        let early = state.round.lock(block.clone());
        info!(
            target: "consensus",
            "EVENT:PRE_COMMIT_QUORUM seq={} digest={} votes={}/{}",
            seq_no,
            digest.short(),
            votes,
            state.round.round_size()
        );

        let mut outcome = Outcome::AdvancedToCommit { seq_no, digest };
        let cast = if self.is_voter() {
            self.signed_vote(VotePhase::Commit, &block).and_then(|vote| {
                self.inner.broadcaster.broadcast(&vote)?;
                self.tally_commit(state, self.inner.local_peer, &vote)
            })
        } else {
            Ok(Outcome::Ignored)
        };
        if let Ok(done @ Outcome::Finalized { .. }) = &cast {
            outcome = done.clone();
        }

        for (peer, vote) in early {
            if state.round.seq_no() != seq_no || state.round.status() != RoundStatus::CollectingCommit {
                break;
            }
            match self.tally_commit(state, peer, &vote) {
                Ok(done @ Outcome::Finalized { .. }) => outcome = done,
                Ok(_) => {}
                Err(e) => debug!("buffered COMMIT from {} dropped: {}", peer, e),
            }
        }

        cast.map(|_| outcome)
    }

    fn tally_commit(&self, state: &mut EngineState, voter: PeerId, vote: &ConsensusVote) -> Result<Outcome> {
        let seq_no = vote.seq_no;
        match state.round.record_commit(voter, vote)? {
            Step::Counted(votes) => {
                debug!(target: "consensus", "EVENT:RECEIVE_VOTE phase={} seq={} from={} votes={}", vote.phase, seq_no, voter, votes);
                Ok(Outcome::Counted { phase: VotePhase::Commit, seq_no, votes })
            }
            Step::Duplicate => Ok(Outcome::Duplicate),
            Step::Buffered => Ok(Outcome::Buffered),
            Step::Late => Ok(Outcome::Ignored),
            Step::Quorum => self.finalize(state, vote),
        }
    }

    fn finalize(&self, state: &mut EngineState, trigger: &ConsensusVote) -> Result<Outcome> {
        let Some(block) = state.round.locked() else {
            state.round.release_transition();
            return Ok(Outcome::Ignored);
        };
        if let Err(err) = validator::check_vote(&block, trigger) {
            state.round.release_transition();
            return Err(err);
        }

        let seq_no = block.seq_no;
        let votes = state.round.commit_votes();
        state.round.finalize();
        self.inner.pool.commit_block(block.clone());
        info!(
            target: "consensus",
            "EVENT:COMMIT seq={} hash={} votes={}/{}",
            seq_no,
            block.hash().short(),
            votes,
            state.round.round_size()
        );

        self.open_round(state, seq_no + 1);
        if self.inner.config.chain_rounds {
            let engine = self.clone();
            tokio::spawn(async move {
                if let Err(e) = engine.start_round().await {
                    warn!("round #{} did not start: {}", seq_no + 1, e);
                }
            });
        }

        Ok(Outcome::Finalized { seq_no, block_hash: block.hash() })
    }

    fn fail_round(&self, state: &mut EngineState, err: &ConsensusError) {
        if state.round.is_closed() {
            return;
        }
        state.round.fail();
        error!(target: "consensus", "EVENT:ROUND_FAILED seq={} err={}", state.round.seq_no(), err);
    }

    fn open_round(&self, state: &mut EngineState, seq_no: u64) {
        let round_size = self.inner.bps.current_bps().len();
        state.round = RoundState::new(seq_no, round_size, &self.inner.config.quorum);

        let ready: Vec<_> = std::mem::take(&mut state.next_round)
            .into_iter()
            .filter(|(_, v)| v.seq_no == seq_no)
            .collect();
        info!("🔄 round #{} opened: {} BPs, {} buffered votes", seq_no, round_size, ready.len());
        if ready.is_empty() {
            return;
        }

        let engine = self.clone();
        tokio::spawn(async move {
            for (peer, vote) in ready {
                if let Err(e) = engine.handle_vote(peer, vote).await {
                    debug!("buffered vote from {} dropped: {}", peer, e);
                }
            }
        });
    }
}

#[async_trait]
impl Protocol for RoundEngine {
    fn message_type(&self) -> &str {
        CONSENSUS_MSG
    }

    async fn run(&self, sender: PeerId, payload: Vec<u8>) -> std::result::Result<(), ProtocolError> {
        self.handle_message(sender, &payload)
            .await
            .map(|_| ())
            .map_err(Into::into)
    }

    fn error(&self, err: &(dyn std::error::Error + Send + Sync)) {
        error!("consensus receive error from p2p layer, err:{}", err);
    }
}

/// Wires a [`RoundEngine`] from its collaborators.
#[derive(Default)]
pub struct EngineBuilder {
    config: ConsensusConfig,
    start_seq: u64,
    auth: Option<Arc<dyn Authenticator>>,
    bps: Option<Arc<dyn BpSetProvider>>,
    pool: Option<Arc<dyn BlockPool>>,
    receipts: Option<Arc<dyn ReceiptsCache>>,
    transport: Option<Arc<dyn Transport>>,
}

impl EngineBuilder {
    pub fn with_config(mut self, config: ConsensusConfig) -> Self {
        self.config = config;
        self
    }

    /// First sequence number this node votes on.
    pub fn starting_at(mut self, seq_no: u64) -> Self {
        self.start_seq = seq_no;
        self
    }

    pub fn with_auth(mut self, auth: Arc<dyn Authenticator>) -> Self {
        self.auth = Some(auth);
        self
    }

    pub fn with_bp_set(mut self, bps: Arc<dyn BpSetProvider>) -> Self {
        self.bps = Some(bps);
        self
    }

    pub fn with_block_pool(mut self, pool: Arc<dyn BlockPool>) -> Self {
        self.pool = Some(pool);
        self
    }

    pub fn with_receipts(mut self, receipts: Arc<dyn ReceiptsCache>) -> Self {
        self.receipts = Some(receipts);
        self
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn build(self) -> Result<RoundEngine> {
        let auth = self.auth.ok_or_else(|| ConsensusError::Config("missing authenticator".into()))?;
        let bps = self.bps.ok_or_else(|| ConsensusError::Config("missing BP set provider".into()))?;
        let pool = self.pool.ok_or_else(|| ConsensusError::Config("missing block pool".into()))?;
        let transport = self.transport.ok_or_else(|| ConsensusError::Config("missing transport".into()))?;
        let receipts = self.receipts.unwrap_or_else(|| Arc::new(ReceiptsStore::new()));

        let local_peer = BpInfo::from_public_key(auth.public_key())
            .map_err(|e| ConsensusError::Config(e.to_string()))?
            .peer_id;

        let current = bps.current_bps();
        if !current.contains(&local_peer) {
            warn!("⚠️ local node {} is not in the BP set, it will only observe", local_peer);
        }

        let round = RoundState::new(self.start_seq, current.len(), &self.config.quorum);
        info!("🧱 round engine for {} ready at #{} ({} BPs)", local_peer, self.start_seq, current.len());

        Ok(RoundEngine {
            inner: Arc::new(EngineInner {
                local_peer,
                reconciler: BlockReconciler::new(pool.clone(), self.config.fetch),
                broadcaster: VoteBroadcaster::new(local_peer, transport, bps.clone()),
                config: self.config,
                auth,
                bps,
                pool,
                receipts,
                state: Mutex::new(EngineState { round, next_round: Vec::new() }),
            }),
        })
    }
}
