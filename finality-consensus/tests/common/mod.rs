#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

use finality_common::{
    auth::{Authenticator, Ed25519Authenticator},
    Block, BpInfo, BpSet, ConsensusVote, Hash, PeerId, VotePhase,
};
use finality_consensus::{
    BlockPool, ConsensusConfig, ConsensusError, InMemoryBlockPool, Outcome, ReceiptsStore, RoundEngine,
    StaticBpSet,
};
use finality_p2p::{decode_vote, encode_vote, Transport};

/// Captures everything the engine multicasts.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<(Vec<PeerId>, ConsensusVote)>>,
}

impl Transport for RecordingTransport {
    fn multicast(&self, targets: &[PeerId], _message_type: &str, payload: Vec<u8>) {
        let vote = decode_vote(&payload).unwrap().into_vote().unwrap();
        self.sent.lock().unwrap().push((targets.to_vec(), vote));
    }
}

impl RecordingTransport {
    pub fn votes(&self, phase: VotePhase) -> Vec<ConsensusVote> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(_, v)| v.phase == phase)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn total(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

/// In-memory pool that also counts `commit_block` calls.
pub struct CountingPool {
    inner: Arc<InMemoryBlockPool>,
    commits: AtomicUsize,
}

impl BlockPool for CountingPool {
    fn get_block(&self, seq_no: u64) -> Option<Arc<Block>> {
        self.inner.get_block(seq_no)
    }

    fn commit_block(&self, block: Arc<Block>) {
        self.commits.fetch_add(1, Ordering::SeqCst);
        self.inner.commit_block(block);
    }
}

/// One engine (BP 0) plus the keys of every other BP in the committee.
pub struct Harness {
    pub keys: Vec<Arc<Ed25519Authenticator>>,
    pub peers: Vec<PeerId>,
    pub pool: Arc<InMemoryBlockPool>,
    pub counting: Arc<CountingPool>,
    pub receipts: Arc<ReceiptsStore>,
    pub transport: Arc<RecordingTransport>,
    pub engine: RoundEngine,
}

pub fn key(seed: u8) -> Arc<Ed25519Authenticator> {
    Arc::new(Ed25519Authenticator::from_bytes(&[seed; 32]).unwrap())
}

pub fn peer_of(auth: &dyn Authenticator) -> PeerId {
    BpInfo::from_public_key(auth.public_key()).unwrap().peer_id
}

pub fn block(seq_no: u64) -> Block {
    block_by(seq_no, "bp-0")
}

pub fn block_by(seq_no: u64, proposer: &str) -> Block {
    Block {
        seq_no,
        parent_hash: Hash::ZERO,
        proposer: proposer.into(),
        timestamp: 1_700_000_000 + seq_no,
        transactions: vec![format!("tx-{}", seq_no).into_bytes()],
        receipts_root: Hash::ZERO,
    }
}

pub fn manual_rounds() -> ConsensusConfig {
    ConsensusConfig { chain_rounds: false, ..Default::default() }
}

impl Harness {
    pub fn new(round_size: u8, start_seq: u64) -> Self {
        Self::with_local(round_size, start_seq, None)
    }

    /// Same committee, but the engine signs through `local` while BP 0's
    /// registered key stays the seed-derived one.
    pub fn with_local(round_size: u8, start_seq: u64, local: Option<Arc<dyn Authenticator>>) -> Self {
        Self::build(round_size, start_seq, local, manual_rounds())
    }

    pub fn with_config(round_size: u8, start_seq: u64, config: ConsensusConfig) -> Self {
        Self::build(round_size, start_seq, None, config)
    }

    fn build(
        round_size: u8,
        start_seq: u64,
        local: Option<Arc<dyn Authenticator>>,
        config: ConsensusConfig,
    ) -> Self {
        let keys: Vec<_> = (1..=round_size).map(key).collect();
        let set: BpSet = keys
            .iter()
            .map(|k| BpInfo::from_public_key(k.public_key()).unwrap())
            .collect();
        let peers = set.peer_ids();

        let pool = Arc::new(InMemoryBlockPool::new());
        let counting = Arc::new(CountingPool { inner: pool.clone(), commits: AtomicUsize::new(0) });
        let receipts = Arc::new(ReceiptsStore::new());
        let transport = Arc::new(RecordingTransport::default());
        let auth: Arc<dyn Authenticator> = match local {
            Some(auth) => auth,
            None => keys[0].clone(),
        };

        let engine = RoundEngine::builder()
            .with_config(config)
            .starting_at(start_seq)
            .with_auth(auth)
            .with_bp_set(Arc::new(StaticBpSet::new(set)))
            .with_block_pool(counting.clone())
            .with_receipts(receipts.clone())
            .with_transport(transport.clone())
            .build()
            .unwrap();

        Self { keys, peers, pool, counting, receipts, transport, engine }
    }

    /// How often the engine handed a block to the pool.
    pub fn commit_calls(&self) -> usize {
        self.counting.commits.load(Ordering::SeqCst)
    }

    /// Encoded vote of BP `idx` for `digest`.
    pub fn vote_raw(&self, idx: usize, phase: VotePhase, seq_no: u64, digest: Hash) -> Vec<u8> {
        let key = &self.keys[idx];
        let signature = key.sign(digest.as_bytes()).unwrap();
        encode_vote(&ConsensusVote::new(phase, seq_no, digest, key.public_key(), signature)).unwrap()
    }

    pub fn vote_for(&self, idx: usize, phase: VotePhase, block: &Block) -> Vec<u8> {
        self.vote_raw(idx, phase, block.seq_no, block.digest())
    }

    pub async fn send(&self, idx: usize, raw: Vec<u8>) -> Result<Outcome, ConsensusError> {
        self.engine.handle_message(self.peers[idx], &raw).await
    }

    pub async fn pre_commit(&self, idx: usize, block: &Block) -> Result<Outcome, ConsensusError> {
        self.send(idx, self.vote_for(idx, VotePhase::PreCommit, block)).await
    }

    pub async fn commit(&self, idx: usize, block: &Block) -> Result<Outcome, ConsensusError> {
        self.send(idx, self.vote_for(idx, VotePhase::Commit, block)).await
    }
}
