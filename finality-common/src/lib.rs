//! Shared data model for the BP finality layer.
//!
//! Everything that crosses a crate boundary lives here: hashes, blocks,
//! receipts, consensus votes, the BP set and the signing capability.

pub mod auth;
pub mod crypto;
pub mod env;
pub mod utils;

pub use crypto::hash::Hash;
pub use env::block::Block;
pub use env::bp::{BpInfo, BpSet};
pub use env::receipt::{Receipt, ReceiptStatus, Receipts};
pub use env::vote::{ConsensusVote, VotePhase};
pub use libp2p::PeerId;
