//! Registry-based peer discovery.
//!
//! Registration happens once at startup and deregistration on clean
//! shutdown. Between the two, `discover` is polled on a timer and each poll
//! fully refreshes the registry-sourced part of the peer directory.

use std::sync::Arc;
use tracing::{info, warn};

use super::peer::{NodeIdentity, PeerDirectory, RefreshSummary};
use super::transport::{PeerRegistry, TransportResult};

pub struct Discovery {
    registry: Arc<dyn PeerRegistry>,
    directory: Arc<PeerDirectory>,
    identity: NodeIdentity,
}

impl Discovery {
    pub fn new(
        registry: Arc<dyn PeerRegistry>,
        directory: Arc<PeerDirectory>,
        identity: NodeIdentity,
    ) -> Self {
        Self {
            registry,
            directory,
            identity,
        }
    }

    /// Announce this node to the registry.
    pub async fn register(&self) -> TransportResult<()> {
        self.registry.register(&self.identity.peer_info()).await?;
        info!(node = %self.identity.id, entity_type = %self.identity.entity_type, "registered with peer registry");
        Ok(())
    }

    /// Pull the registry's peer list and refresh the directory from it.
    pub async fn discover(&self) -> TransportResult<RefreshSummary> {
        let infos = self.registry.list_peers().await?;
        let summary = self
            .directory
            .refresh_from_registry(infos, &self.identity.id)
            .await;
        info!(
            added = summary.added,
            updated = summary.updated,
            removed = summary.removed,
            "peer discovery refreshed"
        );
        Ok(summary)
    }

    /// Best-effort deregistration; failures are only logged.
    pub async fn unregister(&self) {
        match self.registry.unregister(&self.identity.id).await {
            Ok(()) => info!(node = %self.identity.id, "unregistered from peer registry"),
            Err(e) => warn!(node = %self.identity.id, error = %e, "failed to unregister from peer registry"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::mock::MockRegistry;
    use crate::network::peer::PeerInfo;
    use crate::unix_now;
    use crate::workflow::model::EntityType;

    fn identity() -> NodeIdentity {
        NodeIdentity {
            id: "self".to_string(),
            address: "127.0.0.1".to_string(),
            port: 8080,
            entity_type: EntityType::Government,
        }
    }

    fn remote(id: &str) -> PeerInfo {
        PeerInfo {
            id: id.to_string(),
            address: "10.0.0.2".to_string(),
            port: 8081,
            entity_type: EntityType::Municipality,
            last_seen: unix_now(),
        }
    }

    #[tokio::test]
    async fn test_register_and_unregister() {
        let registry = MockRegistry::new();
        let discovery = Discovery::new(
            Arc::new(registry.clone()),
            Arc::new(PeerDirectory::new()),
            identity(),
        );

        discovery.register().await.unwrap();
        assert!(registry.contains("self").await);

        discovery.unregister().await;
        assert!(!registry.contains("self").await);
    }

    #[tokio::test]
    async fn test_discover_skips_self_and_drops_departed() {
        let registry = MockRegistry::new();
        let directory = Arc::new(PeerDirectory::new());
        let discovery = Discovery::new(Arc::new(registry.clone()), directory.clone(), identity());

        discovery.register().await.unwrap();
        registry.put(remote("a")).await;
        registry.put(remote("b")).await;
        directory
            .add_bootstrap_peer("boot", "10.0.0.9", 8080, EntityType::Dnp)
            .await;

        let summary = discovery.discover().await.unwrap();
        assert_eq!(summary.added, 2);
        assert!(directory.get("self").await.is_none());

        registry.remove("a").await;
        let summary = discovery.discover().await.unwrap();
        assert_eq!(summary.removed, 1);
        assert!(directory.get("a").await.is_none());
        assert!(directory.get("b").await.is_some());
        assert!(directory.get("boot").await.is_some());
    }

    #[tokio::test]
    async fn test_failing_registry_leaves_directory_alone() {
        let registry = MockRegistry::new();
        let directory = Arc::new(PeerDirectory::new());
        let discovery = Discovery::new(Arc::new(registry.clone()), directory.clone(), identity());

        registry.put(remote("a")).await;
        discovery.discover().await.unwrap();

        registry.set_failing(true).await;
        assert!(discovery.discover().await.is_err());
        assert!(directory.get("a").await.is_some());

        // Unregister failure is swallowed.
        discovery.unregister().await;
    }
}
