pub mod config;
pub mod consensus;
pub mod error;
pub mod ports;

pub use config::{ConsensusConfig, FetchPolicy, QuorumPolicy};
pub use consensus::{
    bps::StaticBpSet,
    engine::{EngineBuilder, Outcome, RoundEngine},
    pool::InMemoryBlockPool,
    receipts::ReceiptsStore,
    round::{RoundSnapshot, RoundState, RoundStatus},
};
pub use error::{ConsensusError, Result};
pub use ports::{BlockPool, BpSetProvider, ReceiptsCache};
