pub mod codec;
pub mod in_memory;
pub mod message;
pub mod ports;
pub mod protocol;

pub use codec::{decode_vote, encode_msg, encode_vote, CodecError, ConsensusMsg, CONSENSUS_MSG, WIRE_VERSION};
pub use in_memory::InMemoryNetwork;
pub use message::{Envelope, NetworkError};
pub use ports::{AdapterCmd, AdapterHandle, Transport};
pub use protocol::{Protocol, ProtocolError, ProtocolRegistry};
