//! Block broadcast, inbound blocks, chain reconciliation and peer probes.
//!
//! Outbound calls run as a bounded task group: a semaphore caps how many are
//! in flight and each call carries its own timeout. A failed or timed-out
//! call demotes the peer; nothing is retried. The ledger lock is never held
//! while a call is outstanding.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::peer::{Peer, PeerDirectory};
use super::transport::{PeerTransport, TransportError, TransportResult};
use crate::ledger::block::Block;
use crate::ledger::chain::{Ledger, LedgerError, ReceiveOutcome};

pub const DEFAULT_MAX_CONCURRENT_PUSHES: usize = 16;

/// Outcome of one broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastReport {
    pub block_hash: String,
    pub delivered: Vec<String>,
    pub failed: Vec<String>,
}

/// Outcome of one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub peers_queried: usize,
    pub failed: Vec<String>,
    /// Peer whose chain was adopted, if any.
    pub adopted_from: Option<String>,
    pub height_before: usize,
    pub height_after: usize,
}

/// Outcome of one probe round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthReport {
    pub reachable: Vec<String>,
    pub unreachable: Vec<String>,
}

#[derive(Clone)]
pub struct ReplicationService {
    ledger: Arc<RwLock<Ledger>>,
    directory: Arc<PeerDirectory>,
    transport: Arc<dyn PeerTransport>,
    request_timeout: Duration,
    permits: Arc<Semaphore>,
}

impl ReplicationService {
    pub fn new(
        ledger: Arc<RwLock<Ledger>>,
        directory: Arc<PeerDirectory>,
        transport: Arc<dyn PeerTransport>,
        request_timeout: Duration,
        max_concurrent_pushes: usize,
    ) -> Self {
        Self {
            ledger,
            directory,
            transport,
            request_timeout,
            permits: Arc::new(Semaphore::new(max_concurrent_pushes.max(1))),
        }
    }

    /// Push `block` to every live peer in the background.
    ///
    /// The returned handle resolves once every push finished or timed out;
    /// callers that do not care can drop it.
    pub fn broadcast(&self, block: Block) -> JoinHandle<BroadcastReport> {
        let service = self.clone();
        tokio::spawn(async move {
            let peers = service.directory.active_peers().await;
            debug!(hash = %block.hash, peers = peers.len(), "broadcasting block");
            let block = Arc::new(block);

            let results = service
                .fan_out(peers, {
                    let block = block.clone();
                    move |transport: Arc<dyn PeerTransport>, peer: Peer| {
                        let block = block.clone();
                        async move { transport.push_block(&peer, &block).await }
                    }
                })
                .await;

            let mut report = BroadcastReport {
                block_hash: block.hash.clone(),
                ..Default::default()
            };
            for (peer_id, result) in results {
                match result {
                    Ok(()) => {
                        service.directory.mark_alive(&peer_id).await;
                        report.delivered.push(peer_id);
                    }
                    Err(e) => {
                        warn!(peer = %peer_id, error = %e, "block push failed");
                        service.directory.mark_unreachable(&peer_id).await;
                        report.failed.push(peer_id);
                    }
                }
            }
            report.delivered.sort();
            report.failed.sort();
            report
        })
    }

    /// Inbound path for a block pushed by a peer.
    pub async fn receive(&self, block: Block) -> Result<ReceiveOutcome, LedgerError> {
        self.ledger.write().await.receive(block)
    }

    /// Adopt the first strictly longer valid chain among the live peers.
    ///
    /// Chains are pulled concurrently without holding the ledger lock; each
    /// arriving chain is compared against the height current at that moment.
    pub async fn reconcile(&self) -> ReconcileReport {
        let peers = self.directory.active_peers().await;
        let height_before = self.ledger.read().await.height();
        let mut report = ReconcileReport {
            peers_queried: peers.len(),
            height_before,
            ..Default::default()
        };

        let results = self
            .fan_out(peers, |transport: Arc<dyn PeerTransport>, peer: Peer| async move {
                transport.fetch_chain(&peer).await
            })
            .await;

        for (peer_id, result) in results {
            let chain = match result {
                Ok(chain) => chain,
                Err(e) => {
                    warn!(peer = %peer_id, error = %e, "chain pull failed");
                    self.directory.mark_unreachable(&peer_id).await;
                    report.failed.push(peer_id);
                    continue;
                }
            };
            self.directory.mark_alive(&peer_id).await;

            let mut ledger = self.ledger.write().await;
            match ledger.replace_chain(chain) {
                Ok(()) => {
                    info!(peer = %peer_id, height = ledger.height(), "adopted longer chain");
                    if report.adopted_from.is_none() {
                        report.adopted_from = Some(peer_id);
                    }
                }
                Err(LedgerError::ChainTooShort { .. }) => {}
                Err(e) => warn!(peer = %peer_id, error = %e, "rejected peer chain"),
            }
        }

        report.failed.sort();
        report.height_after = self.ledger.read().await.height();
        report
    }

    /// Probe every known peer and set liveness from reachability.
    pub async fn health_check(&self) -> HealthReport {
        let peers = self.directory.all_peers().await;
        let results = self
            .fan_out(peers, |transport: Arc<dyn PeerTransport>, peer: Peer| async move {
                transport.probe(&peer).await
            })
            .await;

        let mut report = HealthReport::default();
        for (peer_id, result) in results {
            match result {
                Ok(()) => {
                    self.directory.mark_alive(&peer_id).await;
                    report.reachable.push(peer_id);
                }
                Err(e) => {
                    debug!(peer = %peer_id, error = %e, "peer probe failed");
                    self.directory.mark_unreachable(&peer_id).await;
                    report.unreachable.push(peer_id);
                }
            }
        }
        report.reachable.sort();
        report.unreachable.sort();
        report
    }

    /// Run `call` against every peer, bounded by the semaphore and each
    /// under the request timeout. Results come back in completion order.
    async fn fan_out<T, F, Fut>(
        &self,
        peers: Vec<Peer>,
        call: F,
    ) -> Vec<(String, TransportResult<T>)>
    where
        T: Send + 'static,
        F: Fn(Arc<dyn PeerTransport>, Peer) -> Fut,
        Fut: Future<Output = TransportResult<T>> + Send + 'static,
    {
        let timeout = self.request_timeout;
        let mut set = JoinSet::new();

        for peer in peers {
            let peer_id = peer.id.clone();
            let permits = self.permits.clone();
            let fut = call(self.transport.clone(), peer);
            set.spawn(async move {
                let result = match permits.acquire_owned().await {
                    Ok(_permit) => match tokio::time::timeout(timeout, fut).await {
                        Ok(result) => result,
                        Err(_) => Err(TransportError::Timeout(timeout.as_millis() as u64)),
                    },
                    Err(_) => Err(TransportError::Network("replication shut down".to_string())),
                };
                (peer_id, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => warn!(error = %e, "replication task failed"),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::block::{ContractCreationData, Payload};
    use crate::network::mock::MockTransport;
    use crate::workflow::model::EntityType;

    fn creation(id: &str) -> Payload {
        Payload::ContractCreation(ContractCreationData {
            contract_id: id.to_string(),
            entity_code: "E".to_string(),
            entity_name: "Entity".to_string(),
            contract_type: String::new(),
            description: "d".to_string(),
            amount: 10.0,
            created_by: "dev".to_string(),
            created_at: 1,
        })
    }

    struct Harness {
        ledger: Arc<RwLock<Ledger>>,
        directory: Arc<PeerDirectory>,
        transport: MockTransport,
        service: ReplicationService,
    }

    fn harness(timeout: Duration) -> Harness {
        let ledger = Arc::new(RwLock::new(Ledger::new()));
        let directory = Arc::new(PeerDirectory::new());
        let transport = MockTransport::new();
        let service = ReplicationService::new(
            ledger.clone(),
            directory.clone(),
            Arc::new(transport.clone()),
            timeout,
            4,
        );
        Harness {
            ledger,
            directory,
            transport,
            service,
        }
    }

    async fn add_remote(h: &Harness, id: &str) -> Arc<RwLock<Ledger>> {
        let remote = Arc::new(RwLock::new(Ledger::new()));
        h.transport.attach(id, remote.clone()).await;
        h.directory
            .add_peer(id, "mock", 0, EntityType::Municipality)
            .await
            .unwrap();
        remote
    }

    #[tokio::test]
    async fn test_broadcast_delivers_and_demotes() {
        let h = harness(Duration::from_secs(1));
        let good = add_remote(&h, "good").await;
        add_remote(&h, "bad").await;
        h.transport.set_unreachable("bad", true).await;

        let block = h.ledger.write().await.append(creation("c-1")).unwrap();
        let report = h.service.broadcast(block.clone()).await.unwrap();

        assert_eq!(report.delivered, vec!["good".to_string()]);
        assert_eq!(report.failed, vec!["bad".to_string()]);
        assert!(good.read().await.has_block(&block.hash));

        let live: Vec<_> = h
            .directory
            .active_peers()
            .await
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(live, vec!["good".to_string()]);
    }

    #[tokio::test]
    async fn test_broadcast_skips_demoted_peers() {
        let h = harness(Duration::from_secs(1));
        add_remote(&h, "p").await;
        h.directory.mark_unreachable("p").await;

        let block = h.ledger.write().await.append(creation("c-1")).unwrap();
        let report = h.service.broadcast(block).await.unwrap();
        assert!(report.delivered.is_empty());
        assert!(report.failed.is_empty());
    }

    #[tokio::test]
    async fn test_slow_peer_times_out() {
        let h = harness(Duration::from_millis(50));
        add_remote(&h, "slow").await;
        h.transport.set_delay("slow", Duration::from_millis(500)).await;

        let block = h.ledger.write().await.append(creation("c-1")).unwrap();
        let report = h.service.broadcast(block).await.unwrap();
        assert_eq!(report.failed, vec!["slow".to_string()]);
        assert_eq!(h.directory.count().await, 0);
    }

    #[tokio::test]
    async fn test_reconcile_adopts_longer_chain() {
        let h = harness(Duration::from_secs(1));
        let remote = add_remote(&h, "long").await;
        {
            let mut remote = remote.write().await;
            remote.append(creation("r-1")).unwrap();
            remote.append(creation("r-2")).unwrap();
        }

        let report = h.service.reconcile().await;
        assert_eq!(report.adopted_from.as_deref(), Some("long"));
        assert_eq!(report.height_before, 1);
        assert_eq!(report.height_after, 3);
        assert_eq!(h.ledger.read().await.chain(), remote.read().await.chain());
        assert!(h.ledger.read().await.contract("r-2").is_some());
    }

    #[tokio::test]
    async fn test_reconcile_keeps_longer_local_chain() {
        let h = harness(Duration::from_secs(1));
        add_remote(&h, "short").await;
        h.ledger.write().await.append(creation("l-1")).unwrap();

        let report = h.service.reconcile().await;
        assert_eq!(report.adopted_from, None);
        assert_eq!(report.height_after, 2);
    }

    #[tokio::test]
    async fn test_reconcile_demotes_failed_pull() {
        let h = harness(Duration::from_secs(1));
        add_remote(&h, "down").await;
        h.transport.set_unreachable("down", true).await;

        let report = h.service.reconcile().await;
        assert_eq!(report.failed, vec!["down".to_string()]);
        assert_eq!(h.directory.count().await, 0);
    }

    #[tokio::test]
    async fn test_health_check_restores_liveness() {
        let h = harness(Duration::from_secs(1));
        add_remote(&h, "a").await;
        add_remote(&h, "b").await;
        h.directory.mark_unreachable("a").await;
        h.transport.set_unreachable("b", true).await;

        let report = h.service.health_check().await;
        assert_eq!(report.reachable, vec!["a".to_string()]);
        assert_eq!(report.unreachable, vec!["b".to_string()]);

        let live: Vec<_> = h
            .directory
            .active_peers()
            .await
            .into_iter()
            .map(|p| p.id)
            .collect();
        assert_eq!(live, vec!["a".to_string()]);
    }

    #[tokio::test]
    async fn test_receive_is_idempotent() {
        let h = harness(Duration::from_secs(1));
        let mut origin = Ledger::new();
        let block = origin.append(creation("c-1")).unwrap();

        assert_eq!(
            h.service.receive(block.clone()).await,
            Ok(ReceiveOutcome::Appended)
        );
        assert_eq!(h.service.receive(block).await, Ok(ReceiveOutcome::Duplicate));
    }
}
