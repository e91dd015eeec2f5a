//! Peer directory: every known remote node and its liveness.
//!
//! ## Liveness
//!
//! A peer is *live* iff its `active` flag is set **and** it was seen within
//! [`STALE_WINDOW_SECS`]. Broadcast, reconciliation, counts and health
//! summaries all go through [`Peer::is_live`].
//!
//! ## Sources
//!
//! Peers enter the directory from three places. A registry refresh replaces
//! only `Registry` peers; `Bootstrap` and `Manual` peers survive it.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::unix_now;
use crate::workflow::model::EntityType;

/// Peers not seen for longer than this are not live.
pub const STALE_WINDOW_SECS: u64 = 5 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeerError {
    #[error("Peer not found: {0}")]
    PeerNotFound(String),

    #[error("Peer already exists: {0}")]
    PeerAlreadyExists(String),
}

/// How a peer entered the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PeerSource {
    Bootstrap,
    Registry,
    Manual,
}

/// A remote node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Peer {
    pub id: String,
    pub address: String,
    pub port: u16,
    pub entity_type: EntityType,
    /// Unix seconds of the last successful contact.
    pub last_seen: u64,
    pub active: bool,
    pub source: PeerSource,
}

impl Peer {
    pub fn new(
        id: impl Into<String>,
        address: impl Into<String>,
        port: u16,
        entity_type: EntityType,
        source: PeerSource,
    ) -> Self {
        Self {
            id: id.into(),
            address: address.into(),
            port,
            entity_type,
            last_seen: unix_now(),
            active: true,
            source,
        }
    }

    pub fn is_live(&self, now: u64) -> bool {
        self.active && now.saturating_sub(self.last_seen) <= STALE_WINDOW_SECS
    }

    /// Base URL for node-to-node HTTP calls.
    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.address, self.port)
    }
}

/// Peer record exchanged with the discovery registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    pub id: String,
    pub address: String,
    pub port: u16,
    pub entity_type: EntityType,
    /// Unix seconds.
    pub last_seen: u64,
}

/// This node, as other nodes address it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeIdentity {
    pub id: String,
    pub address: String,
    pub port: u16,
    pub entity_type: EntityType,
}

impl NodeIdentity {
    /// Registry record stamped with the current time.
    pub fn peer_info(&self) -> PeerInfo {
        PeerInfo {
            id: self.id.clone(),
            address: self.address.clone(),
            port: self.port,
            entity_type: self.entity_type.clone(),
            last_seen: unix_now(),
        }
    }
}

/// What a registry refresh changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefreshSummary {
    pub added: usize,
    pub updated: usize,
    pub removed: usize,
}

/// Map of peer id to peer, behind one reader/writer lock.
#[derive(Debug, Default)]
pub struct PeerDirectory {
    peers: RwLock<HashMap<String, Peer>>,
}

impl PeerDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a manually configured peer.
    pub async fn add_peer(
        &self,
        id: &str,
        address: &str,
        port: u16,
        entity_type: EntityType,
    ) -> Result<Peer, PeerError> {
        let mut peers = self.peers.write().await;
        if peers.contains_key(id) {
            return Err(PeerError::PeerAlreadyExists(id.to_string()));
        }

        let peer = Peer::new(id, address, port, entity_type, PeerSource::Manual);
        peers.insert(id.to_string(), peer.clone());
        info!(peer = id, address, port, "peer added");
        Ok(peer)
    }

    pub async fn remove_peer(&self, id: &str) -> Result<Peer, PeerError> {
        let removed = self
            .peers
            .write()
            .await
            .remove(id)
            .ok_or_else(|| PeerError::PeerNotFound(id.to_string()))?;
        info!(peer = id, "peer removed");
        Ok(removed)
    }

    /// Add or overwrite a bootstrap peer.
    pub async fn add_bootstrap_peer(
        &self,
        id: &str,
        address: &str,
        port: u16,
        entity_type: EntityType,
    ) {
        self.upsert(Peer::new(id, address, port, entity_type, PeerSource::Bootstrap))
            .await;
        info!(peer = id, address, port, "bootstrap peer added");
    }

    /// Insert `peer`, replacing any entry with the same id.
    pub async fn upsert(&self, peer: Peer) {
        self.peers.write().await.insert(peer.id.clone(), peer);
    }

    /// Replace the registry-sourced peers with the registry's current view.
    ///
    /// Registry peers absent from `infos` are dropped. Entries older than the
    /// staleness window and the node's own id are skipped. A registry peer
    /// that is still listed becomes active again. Bootstrap and manual peers
    /// are left untouched.
    pub async fn refresh_from_registry(&self, infos: Vec<PeerInfo>, self_id: &str) -> RefreshSummary {
        let now = unix_now();
        let fresh: HashMap<String, PeerInfo> = infos
            .into_iter()
            .filter(|info| info.id != self_id)
            .filter(|info| now.saturating_sub(info.last_seen) <= STALE_WINDOW_SECS)
            .map(|info| (info.id.clone(), info))
            .collect();

        let mut summary = RefreshSummary::default();
        let mut peers = self.peers.write().await;

        let dropped: Vec<String> = peers
            .values()
            .filter(|p| p.source == PeerSource::Registry && !fresh.contains_key(&p.id))
            .map(|p| p.id.clone())
            .collect();
        for id in dropped {
            peers.remove(&id);
            summary.removed += 1;
            debug!(peer = %id, "registry peer dropped");
        }

        for (id, info) in fresh {
            match peers.get_mut(&id) {
                Some(existing) if existing.source == PeerSource::Registry => {
                    existing.address = info.address;
                    existing.port = info.port;
                    existing.entity_type = info.entity_type;
                    existing.last_seen = existing.last_seen.max(info.last_seen);
                    existing.active = true;
                    summary.updated += 1;
                }
                Some(_) => {}
                None => {
                    peers.insert(
                        id.clone(),
                        Peer {
                            id,
                            address: info.address,
                            port: info.port,
                            entity_type: info.entity_type,
                            last_seen: info.last_seen,
                            active: true,
                            source: PeerSource::Registry,
                        },
                    );
                    summary.added += 1;
                }
            }
        }

        summary
    }

    /// Live peers, sorted by id.
    pub async fn active_peers(&self) -> Vec<Peer> {
        let now = unix_now();
        self.select(|p| p.is_live(now)).await
    }

    /// Live peers of one entity type, sorted by id.
    pub async fn peers_by_type(&self, entity_type: &EntityType) -> Vec<Peer> {
        let now = unix_now();
        self.select(|p| p.is_live(now) && &p.entity_type == entity_type)
            .await
    }

    /// Every known peer regardless of liveness, sorted by id.
    pub async fn all_peers(&self) -> Vec<Peer> {
        self.select(|_| true).await
    }

    /// Number of live peers.
    pub async fn count(&self) -> usize {
        let now = unix_now();
        self.peers
            .read()
            .await
            .values()
            .filter(|p| p.is_live(now))
            .count()
    }

    pub async fn total(&self) -> usize {
        self.peers.read().await.len()
    }

    pub async fn get(&self, id: &str) -> Option<Peer> {
        self.peers.read().await.get(id).cloned()
    }

    pub async fn ids(&self) -> HashSet<String> {
        self.peers.read().await.keys().cloned().collect()
    }

    /// Record a successful contact.
    pub async fn mark_alive(&self, id: &str) {
        if let Some(peer) = self.peers.write().await.get_mut(id) {
            if !peer.active {
                info!(peer = id, "peer reachable again");
            }
            peer.active = true;
            peer.last_seen = unix_now();
        }
    }

    /// Record a failed push, probe or pull.
    pub async fn mark_unreachable(&self, id: &str) {
        if let Some(peer) = self.peers.write().await.get_mut(id) {
            if peer.active {
                warn!(peer = id, "peer marked unreachable");
            }
            peer.active = false;
        }
    }

    async fn select(&self, keep: impl Fn(&Peer) -> bool) -> Vec<Peer> {
        let mut peers: Vec<Peer> = self
            .peers
            .read()
            .await
            .values()
            .filter(|p| keep(p))
            .cloned()
            .collect();
        peers.sort_by(|a, b| a.id.cmp(&b.id));
        peers
    }
}
