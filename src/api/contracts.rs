//! Contract and workflow routes.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::{ApiError, ApiJson};
use crate::node::{ContractFilter, Node};
use crate::workflow::{
    AdminRole, AuditEntry, AuditQuery, Contract, NewContract, PipelineStep, StepDecision,
    WorkflowStatus,
};

/// Body of `POST /api/contracts/:id/validate-step`; the contract id comes
/// from the path.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateStepRequest {
    pub step_number: u32,
    pub validator_id: String,
    #[serde(default)]
    pub validator_name: String,
    pub role: AdminRole,
    pub approved: bool,
    #[serde(default)]
    pub comments: String,
}

/// Body of `POST /api/contracts/:id/audit`.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditRequest {
    pub auditor_id: String,
    pub role: AdminRole,
    pub observation: String,
}

#[derive(Debug, Serialize)]
pub struct ContractList {
    pub contracts: Vec<Contract>,
    pub total: usize,
}

pub async fn list_contracts(
    State(node): State<Arc<Node>>,
    Query(filter): Query<ContractFilter>,
) -> Json<ContractList> {
    let contracts = node.list_contracts(&filter).await;
    Json(ContractList {
        total: contracts.len(),
        contracts,
    })
}

pub async fn create_contract(
    State(node): State<Arc<Node>>,
    ApiJson(new): ApiJson<NewContract>,
) -> Result<(StatusCode, Json<Contract>), ApiError> {
    let contract = node.create_contract(new).await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

pub async fn get_contract(
    State(node): State<Arc<Node>>,
    Path(id): Path<String>,
) -> Result<Json<Contract>, ApiError> {
    Ok(Json(node.contract(&id).await?))
}

pub async fn workflow_status(
    State(node): State<Arc<Node>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowStatus>, ApiError> {
    Ok(Json(node.workflow_status(&id).await?))
}

pub async fn validate_step(
    State(node): State<Arc<Node>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<ValidateStepRequest>,
) -> Result<Json<Contract>, ApiError> {
    let decision = StepDecision {
        contract_id: id,
        step_number: req.step_number,
        validator_id: req.validator_id,
        validator_name: req.validator_name,
        role: req.role,
        approved: req.approved,
        comments: req.comments,
    };
    Ok(Json(node.validate_contract_step(decision).await?))
}

pub async fn add_audit(
    State(node): State<Arc<Node>>,
    Path(id): Path<String>,
    ApiJson(req): ApiJson<AuditRequest>,
) -> Result<(StatusCode, Json<Contract>), ApiError> {
    if req.observation.trim().is_empty() {
        return Err(ApiError::bad_request("observation must not be empty"));
    }
    let contract = node
        .add_audit_observation(&id, &req.auditor_id, req.role, &req.observation)
        .await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

pub async fn audit_trail(
    State(node): State<Arc<Node>>,
    Path(id): Path<String>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<Vec<AuditEntry>>, ApiError> {
    Ok(Json(node.audit_trail(&id, &query).await?))
}

pub async fn workflow_steps(State(node): State<Arc<Node>>) -> Json<Vec<PipelineStep>> {
    Json(node.workflow_steps())
}
