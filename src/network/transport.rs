//! Trait abstractions for node-to-node and registry calls.
//!
//! Replication and discovery only talk to the network through these traits,
//! so tests swap in the in-memory implementations from `network::mock`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::peer::{Peer, PeerInfo};
use crate::ledger::block::Block;

/// Result type for network operations.
pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Request timed out after {0} ms")]
    Timeout(u64),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Peer responded with status {0}")]
    Status(u16),

    #[error("Failed to decode response: {0}")]
    Decode(String),
}

/// Body of `GET /api/p2p/get-chain`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChainResponse {
    pub chain: Vec<Block>,
    pub height: usize,
}

/// Calls from this node to another node.
#[async_trait]
pub trait PeerTransport: Send + Sync {
    /// Push one block to the peer's inbound path.
    async fn push_block(&self, peer: &Peer, block: &Block) -> TransportResult<()>;

    /// Pull the peer's full chain.
    async fn fetch_chain(&self, peer: &Peer) -> TransportResult<Vec<Block>>;

    /// Cheap reachability check.
    async fn probe(&self, peer: &Peer) -> TransportResult<()>;
}

/// Calls from this node to the discovery registry.
#[async_trait]
pub trait PeerRegistry: Send + Sync {
    async fn register(&self, info: &PeerInfo) -> TransportResult<()>;

    async fn list_peers(&self) -> TransportResult<Vec<PeerInfo>>;

    async fn unregister(&self, id: &str) -> TransportResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_display() {
        assert_eq!(
            TransportError::Timeout(5000).to_string(),
            "Request timed out after 5000 ms"
        );
        assert_eq!(
            TransportError::Status(503).to_string(),
            "Peer responded with status 503"
        );
    }

    #[test]
    fn test_chain_response_shape() {
        let response = ChainResponse {
            chain: vec![Block::genesis()],
            height: 1,
        };
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["height"], 1);
        assert_eq!(value["chain"][0]["type"], "GENESIS");
    }
}
