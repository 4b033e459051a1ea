use std::{
    collections::HashMap,
    sync::{PoisonError, RwLock},
};

use finality_common::Receipts;

use crate::ports::ReceiptsCache;

/// Receipts written by the execution pipeline, read by the engine.
#[derive(Debug, Default)]
pub struct ReceiptsStore {
    receipts: RwLock<HashMap<u64, Receipts>>,
}

impl ReceiptsStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store_receipts(&self, seq_no: u64, receipts: Receipts) {
        self.receipts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(seq_no, receipts);
    }

    /// Drops receipts of finalized sequence numbers.
    pub fn prune_below(&self, seq_no: u64) {
        self.receipts
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|s, _| *s >= seq_no);
    }
}

impl ReceiptsCache for ReceiptsStore {
    fn load_receipts(&self, seq_no: u64) -> Option<Receipts> {
        self.receipts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&seq_no)
            .cloned()
    }
}
