use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::{
    task::JoinHandle,
    time::{interval, sleep},
};
use tracing::info;

use finality_common::{
    crypto::sha256, utils::time::current_time, Block, Hash, Receipt, ReceiptStatus, Receipts,
};
use finality_consensus::{InMemoryBlockPool, ReceiptsStore};

const MAX_TXS_PER_BLOCK: u64 = 4;
const GAS_PER_TX: u64 = 21_000;

/// Where a produced block gets imported: one pool and receipts store per BP.
#[derive(Clone)]
pub struct ImportTarget {
    pub pool: Arc<InMemoryBlockPool>,
    pub receipts: Arc<ReceiptsStore>,
}

/// Stands in for proposal, gossip and execution: builds one block per tick
/// with its receipts and imports both into every BP.
pub struct BlockProducer {
    proposers: Vec<String>,
    targets: Vec<ImportTarget>,
    interval: Duration,
    rounds: u64,
    // extra wait before a block is imported
    delays: HashMap<u64, Duration>,
}

impl BlockProducer {
    pub fn new(proposers: Vec<String>, targets: Vec<ImportTarget>, interval: Duration, rounds: u64) -> Self {
        Self { proposers, targets, interval, rounds, delays: HashMap::new() }
    }

    /// Holds block `seq_no` back for `by` on top of the regular interval.
    pub fn delay_block(mut self, seq_no: u64, by: Duration) -> Self {
        self.delays.insert(seq_no, by);
        self
    }

    pub fn total_delay(&self) -> Duration {
        self.delays.values().sum()
    }

    /// Builds block `seq_no` on top of `parent_hash` and imports it.
    pub fn produce(&self, seq_no: u64, parent_hash: Hash) -> Block {
        let tx_count = 1 + rand::random::<u64>() % MAX_TXS_PER_BLOCK;
        let transactions: Vec<Vec<u8>> = (0..tx_count)
            .map(|i| format!("tx-{}-{}-{}", seq_no, i, rand::random::<u32>()).into_bytes())
            .collect();
        let receipts = Receipts::new(
            transactions
                .iter()
                .map(|tx| Receipt { tx_hash: sha256(tx), status: ReceiptStatus::Success, gas_used: GAS_PER_TX })
                .collect(),
        );

        let proposer = if self.proposers.is_empty() {
            "unknown".to_string()
        } else {
            self.proposers[(seq_no as usize) % self.proposers.len()].clone()
        };
        let block = Block::with_receipts(seq_no, parent_hash, proposer, current_time(), transactions, &receipts);

        for target in &self.targets {
            target.receipts.store_receipts(seq_no, receipts.clone());
            target.receipts.prune_below(seq_no.saturating_sub(2));
            target.pool.add_block(block.clone());
        }
        info!(
            "⛏️ block #{} by {} with {} txs ({})",
            seq_no,
            block.proposer,
            block.transactions.len(),
            block.hash().short()
        );
        block
    }

    /// Produces blocks `1..=rounds`, one per interval.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval.max(Duration::from_millis(1)));
            let mut parent = Hash::ZERO;
            for seq_no in 1..=self.rounds {
                ticker.tick().await;
                if let Some(by) = self.delays.get(&seq_no) {
                    info!("⏳ holding block #{} back for {:?}", seq_no, by);
                    sleep(*by).await;
                }
                parent = self.produce(seq_no, parent).hash();
            }
        })
    }
}
