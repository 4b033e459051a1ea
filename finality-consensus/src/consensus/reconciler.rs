use std::sync::Arc;

use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, warn};

use finality_common::Block;

use crate::{
    config::FetchPolicy,
    error::{ConsensusError, Result},
    ports::BlockPool,
};

/// Waits, bounded, for the block pool to hold the block of a sequence number.
///
/// Votes can outrun local block import, so the engine polls instead of
/// failing on the first miss. Timing runs on `tokio::time`; tests drive it
/// with a paused clock.
#[derive(Clone)]
pub struct BlockReconciler {
    pool: Arc<dyn BlockPool>,
    policy: FetchPolicy,
}

impl BlockReconciler {
    pub fn new(pool: Arc<dyn BlockPool>, policy: FetchPolicy) -> Self {
        Self { pool, policy }
    }

    pub async fn fetch_block(&self, seq_no: u64) -> Result<Arc<Block>> {
        let mut ticker = interval(self.policy.poll_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let poll = async {
            loop {
                ticker.tick().await;
                if let Some(block) = self.pool.get_block(seq_no) {
                    return block;
                }
                debug!("block #{} not in pool yet", seq_no);
            }
        };

        timeout(self.policy.timeout(), poll).await.map_err(|_| {
            warn!("wait for block #{} timeout", seq_no);
            ConsensusError::Timeout { seq_no }
        })
    }
}
