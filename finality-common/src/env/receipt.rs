use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::{hash::Hash, merkle::calculate_merkle_root};

/// Outcome of executing one transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReceiptStatus {
    Success,
    Failed,
}

impl From<ReceiptStatus> for u8 {
    fn from(s: ReceiptStatus) -> Self {
        match s {
            ReceiptStatus::Success => 1,
            ReceiptStatus::Failed => 0,
        }
    }
}

/// Execution result of a single transaction within a block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: Hash,
    pub status: ReceiptStatus,
    pub gas_used: u64,
}

impl Receipt {
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.tx_hash.as_bytes());
        hasher.update([u8::from(self.status)]);
        hasher.update(self.gas_used.to_be_bytes());
        Hash(hasher.finalize().into())
    }
}

/// Ordered receipts of a block, in transaction order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipts(pub Vec<Receipt>);

impl Receipts {
    pub fn new(receipts: Vec<Receipt>) -> Self {
        Self(receipts)
    }

    /// Aggregate hash that a block declares as its receipts root.
    pub fn root(&self) -> Hash {
        let leaves: Vec<Hash> = self.0.iter().map(Receipt::hash).collect();
        calculate_merkle_root(&leaves)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
