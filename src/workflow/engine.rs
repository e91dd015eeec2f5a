//! Sequential approval state machine.
//!
//! Every transition runs under the ledger write lock on a working copy of the
//! contract. The copy is committed to the projection only after the block
//! describing the transition has been appended, so a failed append leaves the
//! contract untouched.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;
use uuid::Uuid;

use super::audit::{query_audit_log, AuditAction, AuditEntry, AuditQuery};
use super::model::{
    default_pipeline, AdminRole, Contract, ContractStatus, NewContract, PipelineStep, StepStatus,
    ValidationStep, WorkflowStatus,
};
use crate::ledger::block::{AuditObservationData, Block, Payload, ValidationData};
use crate::ledger::chain::{Ledger, LedgerError};
use crate::unix_now;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    #[error("Contract not found: {0}")]
    ContractNotFound(String),

    #[error("Contract already exists: {0}")]
    ContractAlreadyExists(String),

    #[error("Invalid contract: {0}")]
    InvalidContract(String),

    #[error("Invalid step: current step is {current}, requested {requested}")]
    StepMismatch { current: u32, requested: u32 },

    #[error("Step {step} is outside the {total}-step pipeline")]
    StepOutOfRange { step: u32, total: usize },

    #[error("Workflow is closed: contract is {status}")]
    WorkflowClosed { status: ContractStatus },

    #[error("Role {0} is not authorized for audit observations")]
    RoleNotAuthorized(AdminRole),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

/// A validator's decision on one pipeline step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDecision {
    pub contract_id: String,
    pub step_number: u32,
    pub validator_id: String,
    #[serde(default)]
    pub validator_name: String,
    pub role: AdminRole,
    pub approved: bool,
    #[serde(default)]
    pub comments: String,
}

/// Contract state after a transition, with the block that recorded it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub contract: Contract,
    pub block: Block,
}

/// Drives contracts through the fixed approval pipeline.
pub struct WorkflowEngine {
    ledger: Arc<RwLock<Ledger>>,
    pipeline: Vec<PipelineStep>,
}

impl WorkflowEngine {
    /// Engine over `ledger` using the default six-step pipeline.
    pub fn new(ledger: Arc<RwLock<Ledger>>) -> Self {
        Self {
            ledger,
            pipeline: default_pipeline(),
        }
    }

    pub fn steps(&self) -> &[PipelineStep] {
        &self.pipeline
    }

    /// Attach a fresh pipeline to `contract` and reset it to step 1.
    pub fn initialize_workflow(&self, contract: &mut Contract) {
        contract.validation_steps = self.pipeline.iter().map(ValidationStep::pending).collect();
        contract.required_roles = self.pipeline.iter().map(|s| s.role).collect();
        contract.current_step = 1;
        contract.status = ContractStatus::Draft;
        contract.updated_at = unix_now();
        contract.audit_trail.push(AuditEntry::new(
            AuditAction::WorkflowInitialized,
            contract.created_by.clone(),
            AdminRole::ProjectDeveloper,
            "Workflow initialized",
        ));
    }

    /// Validate, initialize and record a new contract.
    pub async fn create_contract(&self, new: NewContract) -> Result<Transition, WorkflowError> {
        validate_new_contract(&new)?;

        let id = new
            .id
            .clone()
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let mut ledger = self.ledger.write().await;
        if ledger.contains_contract(&id) {
            return Err(WorkflowError::ContractAlreadyExists(id));
        }

        let mut contract = Contract::draft(new, id, unix_now());
        self.initialize_workflow(&mut contract);

        let block = ledger.append(Payload::ContractCreation(contract.creation_data()))?;
        backfill_block_hash(&mut contract, &block);
        ledger.put_contract(contract.clone());

        info!(contract = %contract.id, amount = contract.amount, "contract created");
        Ok(Transition { contract, block })
    }

    /// Approve or reject the contract's current step.
    pub async fn validate_step(&self, decision: StepDecision) -> Result<Transition, WorkflowError> {
        let mut ledger = self.ledger.write().await;
        let mut contract = ledger
            .contract(&decision.contract_id)
            .cloned()
            .ok_or_else(|| WorkflowError::ContractNotFound(decision.contract_id.clone()))?;

        if contract.status.is_closed() {
            return Err(WorkflowError::WorkflowClosed {
                status: contract.status,
            });
        }
        if decision.step_number != contract.current_step {
            return Err(WorkflowError::StepMismatch {
                current: contract.current_step,
                requested: decision.step_number,
            });
        }
        let total = contract.validation_steps.len();
        let index = decision.step_number as usize - 1;
        if index >= total {
            return Err(WorkflowError::StepOutOfRange {
                step: decision.step_number,
                total,
            });
        }

        let now = unix_now();
        let step = &mut contract.validation_steps[index];
        step.validator_id = decision.validator_id.clone();
        step.validator_name = decision.validator_name.clone();
        step.timestamp = Some(now);
        step.comments = decision.comments.clone();

        let entry = if decision.approved {
            step.status = StepStatus::Approved;
            contract.current_step += 1;
            contract.status = ContractStatus::for_step(contract.current_step);
            AuditEntry::new(
                AuditAction::StepApproved,
                decision.validator_id.clone(),
                decision.role,
                format!("Step {} approved: {}", decision.step_number, decision.comments),
            )
        } else {
            step.status = StepStatus::Rejected;
            contract.status = ContractStatus::Rejected;
            AuditEntry::new(
                AuditAction::StepRejected,
                decision.validator_id.clone(),
                decision.role,
                format!("Step {} rejected: {}", decision.step_number, decision.comments),
            )
        };
        contract.audit_trail.push(entry);
        contract.updated_at = now;

        let block = ledger.append(Payload::Validation(ValidationData {
            contract_id: contract.id.clone(),
            step: decision.step_number,
            validator_id: decision.validator_id,
            validator_name: decision.validator_name,
            role: decision.role,
            approved: decision.approved,
            comments: decision.comments,
            timestamp: now,
        }))?;
        backfill_block_hash(&mut contract, &block);
        ledger.put_contract(contract.clone());

        info!(
            contract = %contract.id,
            step = decision.step_number,
            approved = decision.approved,
            status = %contract.status,
            "workflow step decided"
        );
        Ok(Transition { contract, block })
    }

    /// File an observation from an external control role. Never changes status.
    pub async fn add_audit_observation(
        &self,
        contract_id: &str,
        auditor_id: &str,
        role: AdminRole,
        observation: &str,
    ) -> Result<Transition, WorkflowError> {
        let mut ledger = self.ledger.write().await;
        let mut contract = ledger
            .contract(contract_id)
            .cloned()
            .ok_or_else(|| WorkflowError::ContractNotFound(contract_id.to_string()))?;

        if !role.is_external_control() {
            return Err(WorkflowError::RoleNotAuthorized(role));
        }

        let entry = AuditEntry::new(AuditAction::AuditObservation, auditor_id, role, observation);
        let timestamp = entry.timestamp;
        contract.audit_trail.push(entry);

        let block = ledger.append(Payload::AuditObservation(AuditObservationData {
            contract_id: contract.id.clone(),
            auditor_id: auditor_id.to_string(),
            role,
            observation: observation.to_string(),
            timestamp,
        }))?;
        backfill_block_hash(&mut contract, &block);
        ledger.put_contract(contract.clone());

        info!(contract = %contract.id, role = %role, "audit observation recorded");
        Ok(Transition { contract, block })
    }

    pub async fn contract(&self, contract_id: &str) -> Result<Contract, WorkflowError> {
        self.ledger
            .read()
            .await
            .contract(contract_id)
            .cloned()
            .ok_or_else(|| WorkflowError::ContractNotFound(contract_id.to_string()))
    }

    pub async fn status(&self, contract_id: &str) -> Result<WorkflowStatus, WorkflowError> {
        let contract = self.contract(contract_id).await?;
        Ok(WorkflowStatus::of(&contract))
    }

    /// All contracts, oldest first.
    pub async fn contracts(&self) -> Vec<Contract> {
        self.select(|_| true).await
    }

    pub async fn contracts_by_status(&self, status: ContractStatus) -> Vec<Contract> {
        self.select(|c| c.status == status).await
    }

    /// Contracts whose current step belongs to `role` and is still Pending.
    pub async fn contracts_pending_role(&self, role: AdminRole) -> Vec<Contract> {
        self.select(|c| {
            c.current_validation_step()
                .is_some_and(|s| s.role == role && s.status == StepStatus::Pending)
        })
        .await
    }

    pub async fn audit_trail(
        &self,
        contract_id: &str,
        query: &AuditQuery,
    ) -> Result<Vec<AuditEntry>, WorkflowError> {
        let contract = self.contract(contract_id).await?;
        Ok(query_audit_log(&contract.audit_trail, query))
    }

    async fn select(&self, keep: impl Fn(&Contract) -> bool) -> Vec<Contract> {
        let ledger = self.ledger.read().await;
        let mut contracts: Vec<Contract> = ledger.contracts().filter(|c| keep(c)).cloned().collect();
        contracts.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        contracts
    }
}

fn validate_new_contract(new: &NewContract) -> Result<(), WorkflowError> {
    let required = [
        (&new.entity_code, "entity code is required"),
        (&new.entity_name, "entity name is required"),
        (&new.description, "description is required"),
        (&new.created_by, "creator is required"),
    ];
    for (value, message) in required {
        if value.trim().is_empty() {
            return Err(WorkflowError::InvalidContract(message.to_string()));
        }
    }
    if !(new.amount.is_finite() && new.amount > 0.0) {
        return Err(WorkflowError::InvalidContract(
            "amount must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn backfill_block_hash(contract: &mut Contract, block: &Block) {
    if let Some(entry) = contract.audit_trail.last_mut() {
        entry.block_hash = Some(block.hash.clone());
    }
}
