//! Collaborators the round engine depends on but does not own.

use std::sync::Arc;

use finality_common::{Block, BpSet, Receipts};

/// Validated blocks waiting for finality, and the committed chain.
pub trait BlockPool: Send + Sync {
    /// Non-blocking lookup of the block for `seq_no`.
    fn get_block(&self, seq_no: u64) -> Option<Arc<Block>>;

    /// Called exactly once per finalized sequence number.
    fn commit_block(&self, block: Arc<Block>);
}

/// Receipts computed locally by the execution pipeline.
pub trait ReceiptsCache: Send + Sync {
    fn load_receipts(&self, seq_no: u64) -> Option<Receipts>;
}

/// Source of the BP committee, refreshed by election logic between rounds.
pub trait BpSetProvider: Send + Sync {
    fn current_bps(&self) -> BpSet;
}
