//! Round consensus state machine.
//!
//! BPs vote on a block per sequence number in two phases. A node that sees a
//! supermajority of PRE_COMMIT votes for the block it holds casts its own
//! COMMIT; a supermajority of COMMIT votes finalizes the block.
//!
//! - [`engine`]: message dispatch, phase transitions, own votes
//! - [`round`]: per-sequence-number tallies and status
//! - [`validator`]: stateless digest, signature and receipts checks
//! - [`reconciler`]: bounded wait for the block pool
//! - [`broadcaster`]: hands encoded votes to the transport
//! - [`pool`], [`receipts`], [`bps`]: in-memory collaborators

pub mod bps;
pub mod broadcaster;
pub mod engine;
pub mod pool;
pub mod receipts;
pub mod reconciler;
pub mod round;
pub mod validator;
