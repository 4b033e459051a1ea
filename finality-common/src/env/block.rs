use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::crypto::hash::{sha256, vote_digest, Hash};
use crate::env::receipt::Receipts;

/// A block as handed out by the block pool once it has been validated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub seq_no: u64,
    pub parent_hash: Hash,
    pub proposer: String,
    pub timestamp: u64,
    pub transactions: Vec<Vec<u8>>,
    pub receipts_root: Hash,
}

impl Block {
    /// Computes the content hash of the block.
    ///
    /// Covers every field. Integers are hashed big-endian and each transaction
    /// is length-prefixed so that concatenations cannot collide.
    pub fn hash(&self) -> Hash {
        let mut hasher = Sha256::new();
        hasher.update(self.seq_no.to_be_bytes());
        hasher.update(self.parent_hash.as_bytes());
        hasher.update((self.proposer.len() as u64).to_be_bytes());
        hasher.update(self.proposer.as_bytes());
        hasher.update(self.timestamp.to_be_bytes());
        hasher.update(self.receipts_root.as_bytes());
        hasher.update((self.transactions.len() as u64).to_be_bytes());
        for tx in &self.transactions {
            hasher.update((tx.len() as u64).to_be_bytes());
            hasher.update(tx);
        }
        Hash(hasher.finalize().into())
    }

    /// The digest BPs sign and exchange when voting on this block.
    pub fn digest(&self) -> Hash {
        vote_digest(&self.hash())
    }

    /// Hashes of the transactions, in block order.
    pub fn tx_hashes(&self) -> Vec<Hash> {
        self.transactions.iter().map(|tx| sha256(tx)).collect()
    }

    /// Convenience constructor that declares the root of `receipts`.
    pub fn with_receipts(
        seq_no: u64,
        parent_hash: Hash,
        proposer: impl Into<String>,
        timestamp: u64,
        transactions: Vec<Vec<u8>>,
        receipts: &Receipts,
    ) -> Self {
        Self {
            seq_no,
            parent_hash,
            proposer: proposer.into(),
            timestamp,
            transactions,
            receipts_root: receipts.root(),
        }
    }
}
