//! Contract approval workflow.
//!
//! Contracts move through a fixed pipeline of role approvals. Each decision is
//! recorded on the contract's audit trail and as a ledger block.

pub mod audit;
pub mod engine;
pub mod model;

pub use audit::{AuditAction, AuditEntry, AuditQuery};
pub use engine::{StepDecision, Transition, WorkflowEngine, WorkflowError};
pub use model::{
    AdminRole, Contract, ContractStatus, EntityType, NewContract, PipelineStep, StepStatus,
    ValidationStep, WorkflowStatus,
};
