//! Peer, replication and health routes.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ApiJson};
use crate::ledger::{Block, ReceiveOutcome};
use crate::network::{BroadcastReport, ChainResponse, Peer, ReconcileReport};
use crate::node::{NetworkHealth, Node, SyncReport};
use crate::workflow::EntityType;

#[derive(Debug, Clone, Deserialize)]
pub struct AddPeerRequest {
    pub id: String,
    pub address: String,
    pub port: u16,
    #[serde(default = "default_entity_type")]
    pub entity_type: EntityType,
}

fn default_entity_type() -> EntityType {
    EntityType::Government
}

#[derive(Debug, Serialize)]
pub struct PeerList {
    pub peers: Vec<Peer>,
}

#[derive(Debug, Serialize)]
pub struct ReceiveResponse {
    pub outcome: ReceiveOutcome,
    pub hash: String,
}

pub async fn list_peers(State(node): State<Arc<Node>>) -> Json<PeerList> {
    Json(PeerList {
        peers: node.list_peers().await,
    })
}

pub async fn add_peer(
    State(node): State<Arc<Node>>,
    ApiJson(req): ApiJson<AddPeerRequest>,
) -> Result<(StatusCode, Json<Peer>), ApiError> {
    if req.id.trim().is_empty() || req.address.trim().is_empty() {
        return Err(ApiError::bad_request("peer id and address are required"));
    }
    if req.id == node.identity().id {
        return Err(ApiError::bad_request("a node cannot peer with itself"));
    }
    let peer = node
        .add_peer(&req.id, &req.address, req.port, req.entity_type)
        .await?;
    Ok((StatusCode::CREATED, Json(peer)))
}

pub async fn remove_peer(
    State(node): State<Arc<Node>>,
    Path(id): Path<String>,
) -> Result<Json<Peer>, ApiError> {
    Ok(Json(node.remove_peer(&id).await?))
}

pub async fn get_chain(State(node): State<Arc<Node>>) -> Json<ChainResponse> {
    Json(node.chain().await)
}

pub async fn receive_block(
    State(node): State<Arc<Node>>,
    ApiJson(block): ApiJson<Block>,
) -> Result<Json<ReceiveResponse>, ApiError> {
    let hash = block.hash.clone();
    let outcome = node.receive_block(block).await?;
    Ok(Json(ReceiveResponse { outcome, hash }))
}

pub async fn broadcast_block(
    State(node): State<Arc<Node>>,
    Path(hash): Path<String>,
) -> Result<Json<BroadcastReport>, ApiError> {
    Ok(Json(node.rebroadcast(&hash).await?))
}

pub async fn sync(State(node): State<Arc<Node>>) -> Json<SyncReport> {
    Json(node.sync_full_chain().await)
}

pub async fn reconcile(State(node): State<Arc<Node>>) -> Json<ReconcileReport> {
    Json(node.reconcile().await)
}

pub async fn health(State(node): State<Arc<Node>>) -> Json<NetworkHealth> {
    Json(node.network_health().await)
}
