//! Contract domain types.
//!
//! Wire names for every enum are SCREAMING_SNAKE_CASE so that payloads from
//! other nodes decode unchanged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use super::audit::{AuditAction, AuditEntry};
use crate::ledger::block::ContractCreationData;

/// Lifecycle status of a contract.
///
/// Only the review states driven by the approval pipeline are reachable
/// through the workflow. The later phases exist so that contracts replicated
/// from other nodes still decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContractStatus {
    Draft,
    TechnicalReview,
    TechnicalApproved,
    LegalReview,
    LegalApproved,
    ContractsReview,
    ContractsApproved,
    AdminReview,
    AdminApproved,
    BudgetReview,
    AuthorizedForPublication,
    Published,
    ProposalsReceived,
    Evaluated,
    Awarded,
    Executed,
    Completed,
    UnderAudit,
    AuditObservations,
    Rejected,
}

impl ContractStatus {
    pub const ALL: [ContractStatus; 20] = [
        ContractStatus::Draft,
        ContractStatus::TechnicalReview,
        ContractStatus::TechnicalApproved,
        ContractStatus::LegalReview,
        ContractStatus::LegalApproved,
        ContractStatus::ContractsReview,
        ContractStatus::ContractsApproved,
        ContractStatus::AdminReview,
        ContractStatus::AdminApproved,
        ContractStatus::BudgetReview,
        ContractStatus::AuthorizedForPublication,
        ContractStatus::Published,
        ContractStatus::ProposalsReceived,
        ContractStatus::Evaluated,
        ContractStatus::Awarded,
        ContractStatus::Executed,
        ContractStatus::Completed,
        ContractStatus::UnderAudit,
        ContractStatus::AuditObservations,
        ContractStatus::Rejected,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractStatus::Draft => "DRAFT",
            ContractStatus::TechnicalReview => "TECHNICAL_REVIEW",
            ContractStatus::TechnicalApproved => "TECHNICAL_APPROVED",
            ContractStatus::LegalReview => "LEGAL_REVIEW",
            ContractStatus::LegalApproved => "LEGAL_APPROVED",
            ContractStatus::ContractsReview => "CONTRACTS_REVIEW",
            ContractStatus::ContractsApproved => "CONTRACTS_APPROVED",
            ContractStatus::AdminReview => "ADMIN_REVIEW",
            ContractStatus::AdminApproved => "ADMIN_APPROVED",
            ContractStatus::BudgetReview => "BUDGET_REVIEW",
            ContractStatus::AuthorizedForPublication => "AUTHORIZED_FOR_PUBLICATION",
            ContractStatus::Published => "PUBLISHED",
            ContractStatus::ProposalsReceived => "PROPOSALS_RECEIVED",
            ContractStatus::Evaluated => "EVALUATED",
            ContractStatus::Awarded => "AWARDED",
            ContractStatus::Executed => "EXECUTED",
            ContractStatus::Completed => "COMPLETED",
            ContractStatus::UnderAudit => "UNDER_AUDIT",
            ContractStatus::AuditObservations => "AUDIT_OBSERVATIONS",
            ContractStatus::Rejected => "REJECTED",
        }
    }

    /// No further workflow transitions are possible.
    pub fn is_closed(&self) -> bool {
        matches!(self, ContractStatus::Rejected | ContractStatus::Completed)
    }

    /// Status a contract carries while `step` is the current step.
    pub fn for_step(step: u32) -> Self {
        match step {
            1 => ContractStatus::Draft,
            2 => ContractStatus::TechnicalReview,
            3 => ContractStatus::LegalReview,
            4 => ContractStatus::ContractsReview,
            5 => ContractStatus::AdminReview,
            6 => ContractStatus::BudgetReview,
            _ => ContractStatus::AuthorizedForPublication,
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContractStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ContractStatus::ALL
            .iter()
            .find(|status| status.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown contract status '{}'", s))
    }
}

/// Administrative role of a user acting on a contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AdminRole {
    ProjectDeveloper,
    TechnicalCommission,
    LegalCommission,
    ContractsChief,
    AdminChief,
    BudgetAuthority,
    // External control roles, audit only.
    Comptroller,
    Prosecutor,
    Citizen,
}

impl AdminRole {
    pub const ALL: [AdminRole; 9] = [
        AdminRole::ProjectDeveloper,
        AdminRole::TechnicalCommission,
        AdminRole::LegalCommission,
        AdminRole::ContractsChief,
        AdminRole::AdminChief,
        AdminRole::BudgetAuthority,
        AdminRole::Comptroller,
        AdminRole::Prosecutor,
        AdminRole::Citizen,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AdminRole::ProjectDeveloper => "PROJECT_DEVELOPER",
            AdminRole::TechnicalCommission => "TECHNICAL_COMMISSION",
            AdminRole::LegalCommission => "LEGAL_COMMISSION",
            AdminRole::ContractsChief => "CONTRACTS_CHIEF",
            AdminRole::AdminChief => "ADMIN_CHIEF",
            AdminRole::BudgetAuthority => "BUDGET_AUTHORITY",
            AdminRole::Comptroller => "COMPTROLLER",
            AdminRole::Prosecutor => "PROSECUTOR",
            AdminRole::Citizen => "CITIZEN",
        }
    }

    /// Roles allowed to file audit observations.
    pub fn is_external_control(&self) -> bool {
        matches!(
            self,
            AdminRole::Comptroller | AdminRole::Prosecutor | AdminRole::Citizen
        )
    }
}

impl fmt::Display for AdminRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AdminRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AdminRole::ALL
            .iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| format!("unknown role '{}'", s))
    }
}

/// Kind of government entity operating a node.
///
/// Registry values this node does not know are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityType {
    Government,
    Municipality,
    Department,
    Ministry,
    Control,
    Dnp,
    Other(String),
}

impl EntityType {
    pub fn as_str(&self) -> &str {
        match self {
            EntityType::Government => "GOVERNMENT",
            EntityType::Municipality => "MUNICIPALITY",
            EntityType::Department => "DEPARTMENT",
            EntityType::Ministry => "MINISTRY",
            EntityType::Control => "CONTROL",
            EntityType::Dnp => "DNP",
            EntityType::Other(s) => s,
        }
    }
}

impl From<String> for EntityType {
    fn from(s: String) -> Self {
        match s.to_ascii_uppercase().as_str() {
            "GOVERNMENT" => EntityType::Government,
            "MUNICIPALITY" => EntityType::Municipality,
            "DEPARTMENT" => EntityType::Department,
            "MINISTRY" => EntityType::Ministry,
            "CONTROL" => EntityType::Control,
            "DNP" => EntityType::Dnp,
            _ => EntityType::Other(s),
        }
    }
}

impl From<&str> for EntityType {
    fn from(s: &str) -> Self {
        EntityType::from(s.to_string())
    }
}

impl From<EntityType> for String {
    fn from(entity_type: EntityType) -> Self {
        entity_type.as_str().to_string()
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepStatus {
    Pending,
    InReview,
    Approved,
    Rejected,
}

/// One role-gated approval slot in a contract's pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationStep {
    pub step_number: u32,
    pub role: AdminRole,
    #[serde(default)]
    pub validator_id: String,
    #[serde(default)]
    pub validator_name: String,
    pub status: StepStatus,
    /// Unix seconds; `None` until the step is decided.
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub comments: String,
    pub required: bool,
    #[serde(default)]
    pub documents: Vec<String>,
}

impl ValidationStep {
    pub fn pending(definition: &PipelineStep) -> Self {
        Self {
            step_number: definition.step_number,
            role: definition.role,
            validator_id: String::new(),
            validator_name: String::new(),
            status: StepStatus::Pending,
            timestamp: None,
            comments: String::new(),
            required: definition.required,
            documents: Vec::new(),
        }
    }
}

/// Static definition of one pipeline step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStep {
    pub step_number: u32,
    pub role: AdminRole,
    pub name: String,
    pub required: bool,
}

/// The fixed six-step approval pipeline.
pub fn default_pipeline() -> Vec<PipelineStep> {
    [
        (AdminRole::ProjectDeveloper, "Project creation"),
        (AdminRole::TechnicalCommission, "Technical review"),
        (AdminRole::LegalCommission, "Legal review"),
        (AdminRole::ContractsChief, "Contracts chief approval"),
        (AdminRole::AdminChief, "Administrative chief approval"),
        (AdminRole::BudgetAuthority, "Spending authorization"),
    ]
    .into_iter()
    .enumerate()
    .map(|(i, (role, name))| PipelineStep {
        step_number: i as u32 + 1,
        role,
        name: name.to_string(),
        required: true,
    })
    .collect()
}

/// A procurement case moving through the approval workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contract {
    pub id: String,
    pub entity_code: String,
    pub entity_name: String,
    pub contract_type: String,
    pub description: String,
    pub amount: f64,
    pub status: ContractStatus,
    pub created_by: String,
    pub created_at: u64,
    pub updated_at: u64,
    pub validation_steps: Vec<ValidationStep>,
    /// 1-based, monotonic. One past the pipeline once every step is approved.
    pub current_step: u32,
    pub required_roles: Vec<AdminRole>,
    pub audit_trail: Vec<AuditEntry>,
}

impl Contract {
    /// Bare contract in `Draft` with no workflow attached yet.
    pub fn draft(new: NewContract, id: String, now: u64) -> Self {
        Self {
            id,
            entity_code: new.entity_code,
            entity_name: new.entity_name,
            contract_type: new.contract_type,
            description: new.description,
            amount: new.amount,
            status: ContractStatus::Draft,
            created_by: new.created_by,
            created_at: now,
            updated_at: now,
            validation_steps: Vec::new(),
            current_step: 1,
            required_roles: Vec::new(),
            audit_trail: Vec::new(),
        }
    }

    /// Rebuild a contract from its creation record alone.
    ///
    /// The result sits at step 1 with every step Pending; later validations
    /// are not replayed.
    pub fn from_creation(data: &ContractCreationData, pipeline: &[PipelineStep]) -> Self {
        Self {
            id: data.contract_id.clone(),
            entity_code: data.entity_code.clone(),
            entity_name: data.entity_name.clone(),
            contract_type: data.contract_type.clone(),
            description: data.description.clone(),
            amount: data.amount,
            status: ContractStatus::Draft,
            created_by: data.created_by.clone(),
            created_at: data.created_at,
            updated_at: data.created_at,
            validation_steps: pipeline.iter().map(ValidationStep::pending).collect(),
            current_step: 1,
            required_roles: pipeline.iter().map(|s| s.role).collect(),
            audit_trail: Vec::new(),
        }
    }

    /// Creation record written to the ledger.
    pub fn creation_data(&self) -> ContractCreationData {
        ContractCreationData {
            contract_id: self.id.clone(),
            entity_code: self.entity_code.clone(),
            entity_name: self.entity_name.clone(),
            contract_type: self.contract_type.clone(),
            description: self.description.clone(),
            amount: self.amount,
            created_by: self.created_by.clone(),
            created_at: self.created_at,
        }
    }

    /// The step currently awaiting a decision, if the pipeline is not exhausted.
    pub fn current_validation_step(&self) -> Option<&ValidationStep> {
        let index = self.current_step.checked_sub(1)? as usize;
        self.validation_steps.get(index)
    }

    pub fn completed_steps(&self) -> usize {
        self.validation_steps
            .iter()
            .filter(|s| s.status == StepStatus::Approved)
            .count()
    }
}

/// Input for contract creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewContract {
    /// Assigned a fresh UUID when absent.
    #[serde(default)]
    pub id: Option<String>,
    pub entity_code: String,
    pub entity_name: String,
    #[serde(default)]
    pub contract_type: String,
    pub description: String,
    pub amount: f64,
    pub created_by: String,
}

/// Snapshot of a contract's progress through the pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatus {
    pub contract_id: String,
    pub current_step: u32,
    pub total_steps: usize,
    pub completed_steps: usize,
    /// Percent of steps approved.
    pub progress: f64,
    pub status: ContractStatus,
    pub can_advance: bool,
    /// Role expected to act next, `None` once the pipeline is exhausted.
    pub next_role: Option<AdminRole>,
}

impl WorkflowStatus {
    pub fn of(contract: &Contract) -> Self {
        let total_steps = contract.validation_steps.len();
        let completed_steps = contract.completed_steps();
        let progress = if total_steps == 0 {
            0.0
        } else {
            completed_steps as f64 / total_steps as f64 * 100.0
        };

        let next_role = contract.current_validation_step().map(|s| s.role);

        Self {
            contract_id: contract.id.clone(),
            current_step: contract.current_step,
            total_steps,
            completed_steps,
            progress,
            status: contract.status,
            can_advance: !contract.status.is_closed(),
            next_role,
        }
    }
}
