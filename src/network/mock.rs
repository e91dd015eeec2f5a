//! In-memory transport and registry for tests.
//!
//! `MockTransport` routes calls to ledgers registered under peer ids, so a
//! push really lands in the remote ledger's inbound path and a chain pull
//! returns the remote chain.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::peer::{Peer, PeerInfo};
use super::transport::{PeerRegistry, PeerTransport, TransportError, TransportResult};
use crate::ledger::block::Block;
use crate::ledger::chain::Ledger;

#[derive(Default)]
struct MockNetwork {
    nodes: HashMap<String, Arc<RwLock<Ledger>>>,
    unreachable: HashSet<String>,
    delays: HashMap<String, Duration>,
    pushes: Vec<(String, String)>,
}

/// Mock node-to-node transport.
#[derive(Clone, Default)]
pub struct MockTransport {
    state: Arc<RwLock<MockNetwork>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route calls for `peer_id` to `ledger`.
    pub async fn attach(&self, peer_id: &str, ledger: Arc<RwLock<Ledger>>) {
        self.state
            .write()
            .await
            .nodes
            .insert(peer_id.to_string(), ledger);
    }

    /// Make every call to `peer_id` fail (or succeed again).
    pub async fn set_unreachable(&self, peer_id: &str, unreachable: bool) {
        let mut state = self.state.write().await;
        if unreachable {
            state.unreachable.insert(peer_id.to_string());
        } else {
            state.unreachable.remove(peer_id);
        }
    }

    /// Delay every call to `peer_id` by `delay`.
    pub async fn set_delay(&self, peer_id: &str, delay: Duration) {
        self.state
            .write()
            .await
            .delays
            .insert(peer_id.to_string(), delay);
    }

    /// `(peer_id, block_hash)` for every successful push, in order.
    pub async fn pushes(&self) -> Vec<(String, String)> {
        self.state.read().await.pushes.clone()
    }

    async fn route(&self, peer_id: &str) -> TransportResult<Arc<RwLock<Ledger>>> {
        let (delay, ledger) = {
            let state = self.state.read().await;
            if state.unreachable.contains(peer_id) {
                return Err(TransportError::Network(format!(
                    "connection refused: {}",
                    peer_id
                )));
            }
            (
                state.delays.get(peer_id).copied(),
                state.nodes.get(peer_id).cloned(),
            )
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        ledger.ok_or(TransportError::Status(404))
    }
}

#[async_trait]
impl PeerTransport for MockTransport {
    async fn push_block(&self, peer: &Peer, block: &Block) -> TransportResult<()> {
        let ledger = self.route(&peer.id).await?;
        ledger
            .write()
            .await
            .receive(block.clone())
            .map_err(|_| TransportError::Status(400))?;
        self.state
            .write()
            .await
            .pushes
            .push((peer.id.clone(), block.hash.clone()));
        Ok(())
    }

    async fn fetch_chain(&self, peer: &Peer) -> TransportResult<Vec<Block>> {
        let ledger = self.route(&peer.id).await?;
        let chain = ledger.read().await.chain();
        Ok(chain)
    }

    async fn probe(&self, peer: &Peer) -> TransportResult<()> {
        self.route(&peer.id).await.map(|_| ())
    }
}

/// Mock discovery registry.
#[derive(Clone, Default)]
pub struct MockRegistry {
    peers: Arc<RwLock<HashMap<String, PeerInfo>>>,
    failing: Arc<RwLock<bool>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a registry entry directly.
    pub async fn put(&self, info: PeerInfo) {
        self.peers.write().await.insert(info.id.clone(), info);
    }

    pub async fn remove(&self, id: &str) {
        self.peers.write().await.remove(id);
    }

    pub async fn set_failing(&self, failing: bool) {
        *self.failing.write().await = failing;
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.peers.read().await.contains_key(id)
    }

    async fn check(&self) -> TransportResult<()> {
        if *self.failing.read().await {
            Err(TransportError::Status(503))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PeerRegistry for MockRegistry {
    async fn register(&self, info: &PeerInfo) -> TransportResult<()> {
        self.check().await?;
        self.put(info.clone()).await;
        Ok(())
    }

    async fn list_peers(&self) -> TransportResult<Vec<PeerInfo>> {
        self.check().await?;
        let mut peers: Vec<PeerInfo> = self.peers.read().await.values().cloned().collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(peers)
    }

    async fn unregister(&self, id: &str) -> TransportResult<()> {
        self.check().await?;
        self.remove(id).await;
        Ok(())
    }
}
