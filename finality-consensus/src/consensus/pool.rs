use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, PoisonError, RwLock},
};

use tracing::{info, warn};

use finality_common::Block;

use crate::ports::BlockPool;

/// In-memory block pool: validated blocks awaiting finality plus the
/// committed chain.
#[derive(Debug, Default)]
pub struct InMemoryBlockPool {
    pending: RwLock<HashMap<u64, Arc<Block>>>,
    committed: RwLock<BTreeMap<u64, Arc<Block>>>,
}

impl InMemoryBlockPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a validated block available for voting.
    pub fn add_block(&self, block: Block) -> Arc<Block> {
        let block = Arc::new(block);
        let previous = self
            .pending
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(block.seq_no, block.clone());
        if previous.is_some() {
            warn!("⚠️ pending block #{} replaced", block.seq_no);
        }
        block
    }

    pub fn committed(&self, seq_no: u64) -> Option<Arc<Block>> {
        self.committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&seq_no)
            .cloned()
    }

    pub fn latest_committed(&self) -> Option<Arc<Block>> {
        self.committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .next_back()
            .cloned()
    }

    pub fn committed_count(&self) -> usize {
        self.committed.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Committed chain in sequence order.
    pub fn committed_chain(&self) -> Vec<Arc<Block>> {
        self.committed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

impl BlockPool for InMemoryBlockPool {
    fn get_block(&self, seq_no: u64) -> Option<Arc<Block>> {
        if let Some(block) = self
            .pending
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&seq_no)
        {
            return Some(block.clone());
        }
        self.committed(seq_no)
    }

    fn commit_block(&self, block: Arc<Block>) {
        let seq_no = block.seq_no;
        self.pending
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&seq_no);

        let mut committed = self.committed.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = committed.get(&seq_no) {
            if existing.hash() != block.hash() {
                warn!("🚨 conflicting commit for #{}: kept {}, got {}", seq_no, existing.hash(), block.hash());
            }
            return;
        }
        info!("💾 block #{} committed ({})", seq_no, block.hash().short());
        committed.insert(seq_no, block);
    }
}
