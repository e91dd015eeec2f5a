//! Node aggregate.
//!
//! A `Node` owns one ledger and everything that acts on it: the workflow
//! engine, the peer directory, replication and (optionally) registry
//! discovery. The HTTP adapter and the CLI only ever talk to a `Node`.
//!
//! Commands that append a block broadcast it in the background; the caller
//! gets the committed contract without waiting on peers.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{watch, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::config::{ConfigError, NetworkConfig, ProcuraConfig};
use crate::ledger::{Block, Ledger, LedgerError, LedgerHealth, ReceiveOutcome};
use crate::network::http::{HttpRegistry, HttpTransport};
use crate::network::replication::DEFAULT_MAX_CONCURRENT_PUSHES;
use crate::network::{
    BroadcastReport, ChainResponse, Discovery, HealthReport, Peer, PeerDirectory, PeerError,
    PeerRegistry, PeerSource, PeerTransport, ReconcileReport, ReplicationService, TransportError,
};
use crate::unix_now;
use crate::workflow::{
    AdminRole, AuditEntry, AuditQuery, Contract, ContractStatus, EntityType, NewContract,
    PipelineStep, StepDecision, WorkflowEngine, WorkflowError, WorkflowStatus,
};

pub use crate::network::NodeIdentity;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Workflow(#[from] WorkflowError),

    #[error(transparent)]
    Peer(#[from] PeerError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Block not found: {0}")]
    BlockNotFound(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

/// Timer periods and outbound call limits.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSettings {
    pub discovery_interval: Duration,
    pub health_interval: Duration,
    pub sync_interval: Duration,
    pub request_timeout: Duration,
    pub max_concurrent_pushes: usize,
}

impl Default for NodeSettings {
    fn default() -> Self {
        Self {
            discovery_interval: Duration::from_secs(30),
            health_interval: Duration::from_secs(60),
            sync_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(5),
            max_concurrent_pushes: DEFAULT_MAX_CONCURRENT_PUSHES,
        }
    }
}

impl NodeSettings {
    pub fn from_config(network: &NetworkConfig) -> Result<Self, ConfigError> {
        Ok(Self {
            discovery_interval: network.discovery_interval()?,
            health_interval: network.health_interval()?,
            sync_interval: network.sync_interval()?,
            request_timeout: network.request_timeout()?,
            max_concurrent_pushes: network.max_concurrent_pushes,
        })
    }
}

/// Filter for [`Node::list_contracts`]. Both fields combine with AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractFilter {
    #[serde(default)]
    pub status: Option<ContractStatus>,

    /// Only contracts whose current step waits on this role.
    #[serde(default, rename = "role")]
    pub pending_role: Option<AdminRole>,
}

/// One peer as reported by [`Node::network_health`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerHealth {
    pub id: String,
    pub address: String,
    pub port: u16,
    pub last_seen: u64,
    /// Unified liveness, see [`Peer::is_live`].
    pub active: bool,
    pub source: PeerSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkHealth {
    pub node_id: String,
    /// `host:port`
    pub address: String,
    pub total_peers: usize,
    pub active_peers: usize,
    pub registry_enabled: bool,
    pub ledger: LedgerHealth,
    pub peers: Vec<PeerHealth>,
    pub timestamp: u64,
}

/// Result of a full sync: probe every peer, then reconcile.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub health: HealthReport,
    pub reconcile: ReconcileReport,
}

pub struct Node {
    identity: NodeIdentity,
    settings: NodeSettings,
    ledger: Arc<RwLock<Ledger>>,
    engine: WorkflowEngine,
    directory: Arc<PeerDirectory>,
    replication: ReplicationService,
    discovery: Option<Discovery>,
}

impl Node {
    /// Assemble a node around a fresh genesis ledger.
    ///
    /// Without a registry the node runs on bootstrap and manual peers only.
    pub fn new(
        identity: NodeIdentity,
        settings: NodeSettings,
        transport: Arc<dyn PeerTransport>,
        registry: Option<Arc<dyn PeerRegistry>>,
    ) -> Self {
        let ledger = Arc::new(RwLock::new(Ledger::new()));
        let directory = Arc::new(PeerDirectory::new());
        let engine = WorkflowEngine::new(ledger.clone());
        let replication = ReplicationService::new(
            ledger.clone(),
            directory.clone(),
            transport,
            settings.request_timeout,
            settings.max_concurrent_pushes,
        );
        let discovery =
            registry.map(|registry| Discovery::new(registry, directory.clone(), identity.clone()));

        Self {
            identity,
            settings,
            ledger,
            engine,
            directory,
            replication,
            discovery,
        }
    }

    /// Build an HTTP-backed node from configuration and seed its bootstrap peers.
    pub async fn from_config(config: &ProcuraConfig) -> Result<Self, NodeError> {
        let settings = NodeSettings::from_config(&config.network)?;
        let bootstrap = config.network.bootstrap_peers()?;

        let transport: Arc<dyn PeerTransport> =
            Arc::new(HttpTransport::new(settings.request_timeout)?);
        let registry: Option<Arc<dyn PeerRegistry>> = match &config.network.registry_url {
            Some(url) => Some(Arc::new(HttpRegistry::new(url, settings.request_timeout)?)),
            None => None,
        };

        let identity = NodeIdentity {
            id: config.node.id.clone(),
            address: config.node.address.clone(),
            port: config.node.port,
            entity_type: config.node.entity_type.clone(),
        };
        let node = Self::new(identity, settings, transport, registry);

        for peer in bootstrap {
            if peer.id == node.identity.id {
                continue;
            }
            node.directory
                .add_bootstrap_peer(&peer.id, &peer.host, peer.port, peer.entity_type)
                .await;
        }

        Ok(node)
    }

    pub fn identity(&self) -> &NodeIdentity {
        &self.identity
    }

    pub fn settings(&self) -> &NodeSettings {
        &self.settings
    }

    pub fn ledger(&self) -> Arc<RwLock<Ledger>> {
        self.ledger.clone()
    }

    pub fn directory(&self) -> Arc<PeerDirectory> {
        self.directory.clone()
    }

    pub fn registry_enabled(&self) -> bool {
        self.discovery.is_some()
    }

    // ---- commands ----

    pub async fn create_contract(&self, new: NewContract) -> Result<Contract, NodeError> {
        let transition = self.engine.create_contract(new).await?;
        self.replication.broadcast(transition.block);
        Ok(transition.contract)
    }

    pub async fn validate_contract_step(
        &self,
        decision: StepDecision,
    ) -> Result<Contract, NodeError> {
        let transition = self.engine.validate_step(decision).await?;
        self.replication.broadcast(transition.block);
        Ok(transition.contract)
    }

    pub async fn add_audit_observation(
        &self,
        contract_id: &str,
        auditor_id: &str,
        role: AdminRole,
        observation: &str,
    ) -> Result<Contract, NodeError> {
        let transition = self
            .engine
            .add_audit_observation(contract_id, auditor_id, role, observation)
            .await?;
        self.replication.broadcast(transition.block);
        Ok(transition.contract)
    }

    pub async fn add_peer(
        &self,
        id: &str,
        address: &str,
        port: u16,
        entity_type: EntityType,
    ) -> Result<Peer, NodeError> {
        Ok(self.directory.add_peer(id, address, port, entity_type).await?)
    }

    pub async fn remove_peer(&self, id: &str) -> Result<Peer, NodeError> {
        Ok(self.directory.remove_peer(id).await?)
    }

    /// Inbound block from a peer. Received blocks are not re-broadcast.
    pub async fn receive_block(&self, block: Block) -> Result<ReceiveOutcome, NodeError> {
        Ok(self.replication.receive(block).await?)
    }

    /// Push an already committed block to every live peer again.
    pub async fn rebroadcast(&self, hash: &str) -> Result<BroadcastReport, NodeError> {
        let block = self
            .ledger
            .read()
            .await
            .block_by_hash(hash)
            .cloned()
            .ok_or_else(|| NodeError::BlockNotFound(hash.to_string()))?;

        self.replication
            .broadcast(block)
            .await
            .map_err(|e| NodeError::Task(e.to_string()))
    }

    /// Probe every peer, then adopt the longest valid chain among the live ones.
    pub async fn sync_full_chain(&self) -> SyncReport {
        let health = self.replication.health_check().await;
        let reconcile = self.replication.reconcile().await;
        SyncReport { health, reconcile }
    }

    pub async fn reconcile(&self) -> ReconcileReport {
        self.replication.reconcile().await
    }

    // ---- queries ----

    pub async fn list_contracts(&self, filter: &ContractFilter) -> Vec<Contract> {
        match (filter.status, filter.pending_role) {
            (None, None) => self.engine.contracts().await,
            (Some(status), None) => self.engine.contracts_by_status(status).await,
            (None, Some(role)) => self.engine.contracts_pending_role(role).await,
            (Some(status), Some(role)) => self
                .engine
                .contracts_pending_role(role)
                .await
                .into_iter()
                .filter(|c| c.status == status)
                .collect(),
        }
    }

    pub async fn contract(&self, id: &str) -> Result<Contract, NodeError> {
        Ok(self.engine.contract(id).await?)
    }

    pub async fn workflow_status(&self, id: &str) -> Result<WorkflowStatus, NodeError> {
        Ok(self.engine.status(id).await?)
    }

    pub fn workflow_steps(&self) -> Vec<PipelineStep> {
        self.engine.steps().to_vec()
    }

    pub async fn audit_trail(
        &self,
        id: &str,
        query: &AuditQuery,
    ) -> Result<Vec<AuditEntry>, NodeError> {
        Ok(self.engine.audit_trail(id, query).await?)
    }

    /// Every known peer, live or not.
    pub async fn list_peers(&self) -> Vec<Peer> {
        self.directory.all_peers().await
    }

    pub async fn chain(&self) -> ChainResponse {
        let chain = self.ledger.read().await.chain();
        ChainResponse {
            height: chain.len(),
            chain,
        }
    }

    pub async fn network_health(&self) -> NetworkHealth {
        let now = unix_now();
        let ledger = self.ledger.read().await.health();
        let peers: Vec<PeerHealth> = self
            .directory
            .all_peers()
            .await
            .into_iter()
            .map(|p| PeerHealth {
                active: p.is_live(now),
                id: p.id,
                address: p.address,
                port: p.port,
                last_seen: p.last_seen,
                source: p.source,
            })
            .collect();

        NetworkHealth {
            node_id: self.identity.id.clone(),
            address: format!("{}:{}", self.identity.address, self.identity.port),
            total_peers: peers.len(),
            active_peers: peers.iter().filter(|p| p.active).count(),
            registry_enabled: self.registry_enabled(),
            ledger,
            peers,
            timestamp: now,
        }
    }

    // ---- lifecycle ----

    /// Register with the registry, then spawn the discovery, health and
    /// reconciliation timers.
    ///
    /// Registration and the first discovery run before the timers start;
    /// their failures are logged and the node keeps running on whatever
    /// peers it already has.
    pub async fn start(self: &Arc<Self>) -> NodeHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        if let Some(discovery) = &self.discovery {
            if let Err(e) = discovery.register().await {
                warn!(error = %e, "registry registration failed");
            }
            self.poll_discovery().await;

            let node = self.clone();
            tasks.push(spawn_timer(
                "discovery",
                self.settings.discovery_interval,
                shutdown_rx.clone(),
                move || {
                    let node = node.clone();
                    async move { node.poll_discovery().await }
                },
            ));
        }

        let node = self.clone();
        tasks.push(spawn_timer(
            "health",
            self.settings.health_interval,
            shutdown_rx.clone(),
            move || {
                let node = node.clone();
                async move {
                    let report = node.replication.health_check().await;
                    debug!(
                        reachable = report.reachable.len(),
                        unreachable = report.unreachable.len(),
                        "health probe finished"
                    );
                }
            },
        ));

        let node = self.clone();
        tasks.push(spawn_timer(
            "reconcile",
            self.settings.sync_interval,
            shutdown_rx,
            move || {
                let node = node.clone();
                async move {
                    let report = node.replication.reconcile().await;
                    if let Some(peer) = report.adopted_from {
                        info!(peer = %peer, height = report.height_after, "reconciliation adopted chain");
                    }
                }
            },
        ));

        info!(
            node = %self.identity.id,
            entity_type = %self.identity.entity_type,
            registry = self.registry_enabled(),
            "node started"
        );

        NodeHandle {
            node: self.clone(),
            shutdown_tx,
            tasks,
        }
    }

    async fn poll_discovery(&self) {
        if let Some(discovery) = &self.discovery {
            if let Err(e) = discovery.discover().await {
                warn!(error = %e, "peer discovery failed");
            }
        }
    }
}

/// Running timers of a started node.
pub struct NodeHandle {
    node: Arc<Node>,
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl NodeHandle {
    pub fn node(&self) -> &Arc<Node> {
        &self.node
    }

    /// Stop every timer and deregister from the registry.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                warn!(error = %e, "timer task ended abnormally");
            }
        }

        if let Some(discovery) = &self.node.discovery {
            discovery.unregister().await;
        }
        info!(node = %self.node.identity.id, "node stopped");
    }
}

/// Run `tick` every `period` until the shutdown flag flips.
///
/// The first tick fires one full period after the timer starts.
fn spawn_timer<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
    mut tick: F,
) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let period = period.max(Duration::from_millis(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => tick().await,
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!(timer = name, "timer stopped");
    })
}
