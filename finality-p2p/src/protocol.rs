use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use libp2p::PeerId;
use tokio::{
    sync::{mpsc, RwLock},
    task::JoinHandle,
};
use tracing::{debug, warn};

use crate::message::{Envelope, NetworkError};

pub type ProtocolError = Box<dyn std::error::Error + Send + Sync>;

/// A handler for one message type delivered by the transport.
///
/// The transport only hands over messages from already authenticated peers.
/// Errors returned by `run` are logged and reported through `error`; they
/// never close the peer connection.
#[async_trait]
pub trait Protocol: Send + Sync {
    fn message_type(&self) -> &str;

    async fn run(&self, sender: PeerId, payload: Vec<u8>) -> Result<(), ProtocolError>;

    fn error(&self, err: &(dyn std::error::Error + Send + Sync)) {
        warn!("protocol {} received error from p2p layer: {}", self.message_type(), err);
    }
}

/// Routes inbound envelopes to the protocol registered for their type.
#[derive(Clone, Default)]
pub struct ProtocolRegistry {
    handlers: Arc<RwLock<HashMap<String, Arc<dyn Protocol>>>>,
}

impl ProtocolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler, replacing any previous one for the same type.
    pub async fn register(&self, protocol: Arc<dyn Protocol>) {
        let tag = protocol.message_type().to_string();
        if self.handlers.write().await.insert(tag.clone(), protocol).is_some() {
            warn!("⚠️ handler for message type {} replaced", tag);
        }
    }

    /// Runs the handler for one envelope on the calling task.
    pub async fn dispatch(&self, envelope: Envelope) -> Result<(), ProtocolError> {
        let handler = self.handlers.read().await.get(&envelope.message_type).cloned();
        let Some(handler) = handler else {
            let err = NetworkError::UnknownMessageType(envelope.message_type);
            debug!("{}", err);
            return Err(err.into());
        };

        let from = envelope.from;
        match handler.run(from, envelope.payload).await {
            Ok(()) => Ok(()),
            Err(err) => {
                debug!("handler {} rejected message from {}: {}", handler.message_type(), from, err);
                handler.error(err.as_ref());
                Err(err)
            }
        }
    }

    /// Drains an inbox, handling each delivery on its own task so that a slow
    /// handler never holds up the next message.
    pub fn spawn_inbox(&self, mut inbox: mpsc::Receiver<Envelope>) -> JoinHandle<()> {
        let registry = self.clone();
        tokio::spawn(async move {
            while let Some(envelope) = inbox.recv().await {
                let registry = registry.clone();
                tokio::spawn(async move {
                    let _ = registry.dispatch(envelope).await;
                });
            }
        })
    }
}
