use libp2p::PeerId;
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::warn;

use crate::message::NetworkError;

/// Outbound half of the transport.
///
/// `multicast` only enqueues; delivery happens in the background and its
/// failures are never reported back to the caller.
pub trait Transport: Send + Sync {
    fn multicast(&self, targets: &[PeerId], message_type: &str, payload: Vec<u8>);
}

#[derive(Debug)]
pub enum AdapterCmd {
    Multicast {
        targets: Vec<PeerId>,
        message_type: String,
        data: Vec<u8>,
    },
    Shutdown,
}

/// Cloneable handle that feeds commands to a network adapter task.
#[derive(Clone)]
pub struct AdapterHandle {
    pub local_peer: PeerId,
    pub cmd_tx: mpsc::Sender<AdapterCmd>,
}

impl AdapterHandle {
    pub fn new(local_peer: PeerId, cmd_tx: mpsc::Sender<AdapterCmd>) -> Self {
        Self { local_peer, cmd_tx }
    }

    /// Enqueues a command without waiting for queue capacity.
    pub fn submit(&self, cmd: AdapterCmd) -> Result<(), NetworkError> {
        self.cmd_tx.try_send(cmd).map_err(|e| match e {
            TrySendError::Full(_) => NetworkError::QueueFull,
            TrySendError::Closed(_) => NetworkError::QueueClosed,
        })
    }

    pub async fn shutdown(&self) {
        let _ = self.cmd_tx.send(AdapterCmd::Shutdown).await;
    }
}

impl Transport for AdapterHandle {
    fn multicast(&self, targets: &[PeerId], message_type: &str, payload: Vec<u8>) {
        let cmd = AdapterCmd::Multicast {
            targets: targets.to_vec(),
            message_type: message_type.to_string(),
            data: payload,
        };
        if let Err(e) = self.submit(cmd) {
            warn!("⚠️ multicast from {} dropped: {}", self.local_peer, e);
        }
    }
}
