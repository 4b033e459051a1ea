use libp2p::PeerId;
use thiserror::Error;

/// An authenticated inbound message as handed to protocol handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: PeerId,
    pub message_type: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum NetworkError {
    #[error("Failed to send message to peer {0}")]
    SendError(String),
    #[error("Peer {0} not found")]
    PeerNotFound(String),
    #[error("Outbound queue is full")]
    QueueFull,
    #[error("Outbound queue is closed")]
    QueueClosed,
    #[error("No handler registered for message type {0}")]
    UnknownMessageType(String),
}
