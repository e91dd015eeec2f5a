//! HTTP adapter.
//!
//! A thin `axum` layer over [`Node`]: handlers decode the request, call one
//! node operation and encode the result. Every failure is a JSON body of the
//! form `{ "error": message }` (see [`ApiError`]).
//!
//! The `/api/p2p/receive-block`, `/api/p2p/get-chain` and `/api/health`
//! routes double as the node-to-node protocol used by
//! [`crate::network::http::HttpTransport`].

mod contracts;
mod error;
mod p2p;

use axum::routing::{delete, get, post};
use axum::Router;
use std::sync::Arc;

use crate::network::http::{GET_CHAIN_PATH, HEALTH_PATH, RECEIVE_BLOCK_PATH};
use crate::node::Node;

pub use contracts::{AuditRequest, ValidateStepRequest};
pub use error::{ApiError, ApiJson};
pub use p2p::AddPeerRequest;

/// Build the full router for `node`.
pub fn router(node: Arc<Node>) -> Router {
    Router::new()
        .route(
            "/api/contracts",
            get(contracts::list_contracts).post(contracts::create_contract),
        )
        .route("/api/contracts/:id", get(contracts::get_contract))
        .route("/api/contracts/:id/workflow", get(contracts::workflow_status))
        .route(
            "/api/contracts/:id/validate-step",
            post(contracts::validate_step),
        )
        .route("/api/contracts/:id/audit", post(contracts::add_audit))
        .route(
            "/api/contracts/:id/audit-trail",
            get(contracts::audit_trail),
        )
        .route("/api/workflow/steps", get(contracts::workflow_steps))
        .route("/api/p2p/peers", get(p2p::list_peers))
        .route("/api/p2p/peers/:id", delete(p2p::remove_peer))
        .route("/api/p2p/add-peer", post(p2p::add_peer))
        .route(GET_CHAIN_PATH, get(p2p::get_chain))
        .route(RECEIVE_BLOCK_PATH, post(p2p::receive_block))
        .route("/api/p2p/broadcast/:hash", post(p2p::broadcast_block))
        .route("/api/p2p/sync", post(p2p::sync))
        .route("/api/p2p/reconcile", post(p2p::reconcile))
        .route(HEALTH_PATH, get(p2p::health))
        .with_state(node)
}
