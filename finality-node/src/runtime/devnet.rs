use std::{sync::Arc, time::Duration};

use libp2p::PeerId;
use tokio::{task::JoinHandle, time::Instant};
use tracing::{info, warn};

use finality_common::{
    auth::{Authenticator, Ed25519Authenticator},
    Block, BpInfo, BpSet,
};
use finality_consensus::{InMemoryBlockPool, ReceiptsStore, RoundEngine, RoundStatus, StaticBpSet};
use finality_p2p::{AdapterHandle, InMemoryNetwork, ProtocolRegistry};

use crate::{
    config::Config,
    error::NodeError,
    runtime::block_producer::{BlockProducer, ImportTarget},
};

const PROGRESS_POLL: Duration = Duration::from_millis(20);

/// One block producer of the devnet with its own pool, receipts and engine.
pub struct BpNode {
    pub name: String,
    pub peer_id: PeerId,
    pub engine: RoundEngine,
    pub pool: Arc<InMemoryBlockPool>,
    pub receipts: Arc<ReceiptsStore>,
    handle: AdapterHandle,
    inbox: JoinHandle<()>,
}

/// A full BP committee running in one process over [`InMemoryNetwork`].
pub struct Devnet {
    config: Config,
    network: InMemoryNetwork,
    bps: BpSet,
    nodes: Vec<BpNode>,
}

impl Devnet {
    /// Generates a key per BP, joins each to the network and registers its
    /// engine as the consensus protocol handler.
    pub async fn launch(config: &Config) -> Result<Self, NodeError> {
        config.validate()?;

        let keys: Vec<Arc<Ed25519Authenticator>> = (0..config.bp_count)
            .map(|_| Arc::new(Ed25519Authenticator::generate()))
            .collect();
        let bps = keys
            .iter()
            .map(|k| BpInfo::from_public_key(k.public_key()))
            .collect::<Result<BpSet, _>>()?;
        let provider = Arc::new(StaticBpSet::new(bps.clone()));

        let network = InMemoryNetwork::new();
        let mut nodes = Vec::with_capacity(keys.len());

        for (i, (key, bp)) in keys.into_iter().zip(bps.iter()).enumerate() {
            let name = format!("bp-{}", i);
            let (handle, inbox) = network.join(bp.peer_id, config.outbound_queue).await;
            let pool = Arc::new(InMemoryBlockPool::new());
            let receipts = Arc::new(ReceiptsStore::new());

            let engine = RoundEngine::builder()
                .with_config(config.consensus.clone())
                .starting_at(1)
                .with_auth(key)
                .with_bp_set(provider.clone())
                .with_block_pool(pool.clone())
                .with_receipts(receipts.clone())
                .with_transport(Arc::new(handle.clone()))
                .build()?;

            let registry = ProtocolRegistry::new();
            registry.register(Arc::new(engine.clone())).await;
            let inbox = registry.spawn_inbox(inbox);

            info!("✅ {} up as {}", name, bp.peer_id);
            nodes.push(BpNode { name, peer_id: bp.peer_id, engine, pool, receipts, handle, inbox });
        }

        Ok(Self { config: config.clone(), network, bps, nodes })
    }

    pub fn nodes(&self) -> &[BpNode] {
        &self.nodes
    }

    pub fn bp_set(&self) -> &BpSet {
        &self.bps
    }

    pub fn network(&self) -> &InMemoryNetwork {
        &self.network
    }

    /// Block producer importing into every BP of this devnet.
    pub fn producer(&self) -> BlockProducer {
        let targets = self
            .nodes
            .iter()
            .map(|n| ImportTarget { pool: n.pool.clone(), receipts: n.receipts.clone() })
            .collect();
        let proposers = self.nodes.iter().map(|n| n.name.clone()).collect();
        BlockProducer::new(proposers, targets, self.config.block_interval(), self.config.rounds)
    }

    /// Produces `rounds` blocks and waits until every BP is past all of
    /// them. Returns the agreed chain.
    pub async fn run(&self) -> Result<Vec<Arc<Block>>, NodeError> {
        self.run_with(self.producer()).await
    }

    /// Same as [`Devnet::run`] with a caller-supplied producer.
    pub async fn run_with(&self, producer: BlockProducer) -> Result<Vec<Arc<Block>>, NodeError> {
        let deadline = Instant::now() + self.config.run_deadline() + producer.total_delay();
        let producer = producer.spawn();

        let mut watchers = Vec::with_capacity(self.nodes.len());
        for node in &self.nodes {
            let engine = node.engine.clone();
            let name = node.name.clone();
            tokio::spawn(start_round(engine.clone(), name.clone()));
            watchers.push(tokio::spawn(skip_failed_rounds(engine, name)));
        }

        let result = self.wait_for_finality(deadline).await;
        producer.abort();
        for watcher in watchers {
            watcher.abort();
        }
        result?;
        self.agreed_chain()
    }

    async fn wait_for_finality(&self, deadline: Instant) -> Result<(), NodeError> {
        let expected = self.config.rounds;
        loop {
            if self.min_round().await > expected {
                info!("🏁 all {} BPs are past block #{}", self.nodes.len(), expected);
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(NodeError::Stalled { committed: self.min_committed(), expected });
            }
            tokio::time::sleep(PROGRESS_POLL).await;
        }
    }

    async fn min_round(&self) -> u64 {
        let mut min = u64::MAX;
        for node in &self.nodes {
            min = min.min(node.engine.seq_no().await);
        }
        min
    }

    fn min_committed(&self) -> u64 {
        self.nodes
            .iter()
            .map(|n| n.pool.committed_count() as u64)
            .min()
            .unwrap_or(0)
    }

    /// Committed chain of the first BP, after checking that every other BP
    /// finalized exactly the same blocks.
    pub fn agreed_chain(&self) -> Result<Vec<Arc<Block>>, NodeError> {
        let Some(first) = self.nodes.first() else {
            return Ok(Vec::new());
        };
        let chain = first.pool.committed_chain();
        for node in &self.nodes[1..] {
            for block in &chain {
                let same = node
                    .pool
                    .committed(block.seq_no)
                    .map(|b| b.hash() == block.hash())
                    .unwrap_or(false);
                if !same {
                    return Err(NodeError::Diverged { seq_no: block.seq_no });
                }
            }
        }
        Ok(chain)
    }

    /// Stops every adapter and inbox task.
    pub async fn shutdown(self) {
        for node in self.nodes {
            node.handle.shutdown().await;
            node.inbox.abort();
        }
        info!("🛑 devnet stopped");
    }
}

async fn start_round(engine: RoundEngine, name: String) {
    if let Err(e) = engine.start_round().await {
        warn!("{} could not start its round: {}", name, e);
    }
}

/// Moves a BP past a round that failed on a block wait and votes on the
/// next one.
async fn skip_failed_rounds(engine: RoundEngine, name: String) {
    loop {
        tokio::time::sleep(PROGRESS_POLL).await;
        let snapshot = engine.snapshot().await;
        if snapshot.status != RoundStatus::Failed {
            continue;
        }
        let next = snapshot.seq_no + 1;
        if engine.advance_to(next).await {
            warn!("⏭️ {} skipped failed round #{}", name, snapshot.seq_no);
            tokio::spawn(start_round(engine.clone(), name.clone()));
        }
    }
}
