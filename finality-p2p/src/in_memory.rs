use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
};

use libp2p::PeerId;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, info};

use crate::{
    message::{Envelope, NetworkError},
    ports::{AdapterCmd, AdapterHandle},
};

/// In-process network connecting any number of peers through channels.
///
/// Each joined peer gets an [`AdapterHandle`] for outbound traffic and an
/// inbox of authenticated [`Envelope`]s. Peers can be cut off to simulate
/// crashes or partitions.
#[derive(Clone, Default)]
pub struct InMemoryNetwork {
    peers: Arc<RwLock<HashMap<PeerId, mpsc::Sender<Envelope>>>>,
    disconnected: Arc<RwLock<HashSet<PeerId>>>,
}

impl InMemoryNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches a peer and spawns its outbound adapter task.
    pub async fn join(&self, peer: PeerId, queue: usize) -> (AdapterHandle, mpsc::Receiver<Envelope>) {
        let (inbox_tx, inbox_rx) = mpsc::channel(queue);
        let (cmd_tx, mut cmd_rx) = mpsc::channel(queue);

        self.peers.write().await.insert(peer, inbox_tx);
        info!("🔌 peer {} joined in-memory network", peer);

        let net = self.clone();
        tokio::spawn(async move {
            while let Some(cmd) = cmd_rx.recv().await {
                match cmd {
                    AdapterCmd::Multicast { targets, message_type, data } => {
                        net.route(peer, &targets, &message_type, data).await;
                    }
                    AdapterCmd::Shutdown => break,
                }
            }
            debug!("adapter for {} stopped", peer);
        });

        (AdapterHandle::new(peer, cmd_tx), inbox_rx)
    }

    pub async fn disconnect(&self, peer: PeerId) {
        self.disconnected.write().await.insert(peer);
    }

    pub async fn reconnect(&self, peer: PeerId) {
        self.disconnected.write().await.remove(&peer);
    }

    async fn route(&self, from: PeerId, targets: &[PeerId], message_type: &str, data: Vec<u8>) {
        let cut = self.disconnected.read().await;
        if cut.contains(&from) {
            return;
        }
        let peers = self.peers.read().await;

        for target in targets {
            if *target == from || cut.contains(target) {
                continue;
            }
            let result = match peers.get(target) {
                Some(inbox) => inbox
                    .try_send(Envelope {
                        from,
                        message_type: message_type.to_string(),
                        payload: data.clone(),
                    })
                    .map_err(|e| NetworkError::SendError(format!("{}: {}", target, e))),
                None => Err(NetworkError::PeerNotFound(target.to_string())),
            };
            if let Err(e) = result {
                debug!("delivery from {} dropped: {}", from, e);
            }
        }
    }
}
