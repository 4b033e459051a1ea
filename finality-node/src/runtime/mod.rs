pub mod block_producer;
pub mod devnet;

pub use block_producer::{BlockProducer, ImportTarget};
pub use devnet::{BpNode, Devnet};
