//! Peer-to-peer replication.
//!
//! - `peer`: peer directory and the unified liveness predicate
//! - `transport`: traits for node-to-node and registry calls
//! - `http`: `reqwest` implementations of those traits
//! - `mock`: in-memory implementations for tests
//! - `discovery`: registry registration and periodic refresh
//! - `replication`: broadcast, inbound blocks, reconciliation, probes

pub mod discovery;
pub mod http;
pub mod mock;
pub mod peer;
pub mod replication;
pub mod transport;

pub use discovery::Discovery;
pub use peer::{NodeIdentity, Peer, PeerDirectory, PeerError, PeerInfo, PeerSource};
pub use replication::{BroadcastReport, HealthReport, ReconcileReport, ReplicationService};
pub use transport::{ChainResponse, PeerRegistry, PeerTransport, TransportError};
