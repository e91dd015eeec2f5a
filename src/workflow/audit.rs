//! Contract audit trail
//!
//! - Every workflow action on a contract appends one entry
//! - Entries are immutable once written, except for the block hash back-fill
//! - Query interface with filters, most recent first

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::model::AdminRole;
use crate::unix_now;

/// Audit action types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    /// Pipeline attached to a freshly created contract.
    WorkflowInitialized,
    StepApproved,
    StepRejected,
    /// Observation filed by an external control role.
    AuditObservation,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::WorkflowInitialized => "WORKFLOW_INITIALIZED",
            AuditAction::StepApproved => "STEP_APPROVED",
            AuditAction::StepRejected => "STEP_REJECTED",
            AuditAction::AuditObservation => "AUDIT_OBSERVATION",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        [
            AuditAction::WorkflowInitialized,
            AuditAction::StepApproved,
            AuditAction::StepRejected,
            AuditAction::AuditObservation,
        ]
        .into_iter()
        .find(|action| action.as_str().eq_ignore_ascii_case(s))
        .ok_or_else(|| format!("unknown audit action '{}'", s))
    }
}

/// Single audit log entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub action: AuditAction,
    pub user_id: String,
    pub user_role: AdminRole,
    /// Unix timestamp (seconds since epoch).
    pub timestamp: u64,
    pub description: String,
    /// Hash of the block recording this action, filled in after append.
    #[serde(default)]
    pub block_hash: Option<String>,
}

impl AuditEntry {
    /// Create a new audit entry with a fresh id and the current timestamp.
    pub fn new(
        action: AuditAction,
        user_id: impl Into<String>,
        user_role: AdminRole,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            action,
            user_id: user_id.into(),
            user_role,
            timestamp: unix_now(),
            description: description.into(),
            block_hash: None,
        }
    }
}

/// Query options for a contract's audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditQuery {
    /// Filter by action type.
    pub action: Option<AuditAction>,
    /// Filter by acting user.
    pub user_id: Option<String>,
    /// Only show entries strictly after this timestamp.
    pub after_timestamp: Option<u64>,
    /// Limit number of results (most recent first).
    pub limit: Option<usize>,
}

impl Default for AuditQuery {
    fn default() -> Self {
        Self {
            action: None,
            user_id: None,
            after_timestamp: None,
            limit: Some(50),
        }
    }
}

/// Query audit entries with filters.
///
/// Returns entries in reverse chronological order (most recent first). Entries
/// sharing a timestamp keep reverse insertion order.
pub fn query_audit_log(entries: &[AuditEntry], query: &AuditQuery) -> Vec<AuditEntry> {
    let mut filtered: Vec<AuditEntry> = entries
        .iter()
        .rev()
        .filter(|entry| {
            if let Some(action) = query.action {
                if entry.action != action {
                    return false;
                }
            }

            if let Some(ref user_id) = query.user_id {
                if &entry.user_id != user_id {
                    return false;
                }
            }

            if let Some(after_ts) = query.after_timestamp {
                if entry.timestamp <= after_ts {
                    return false;
                }
            }

            true
        })
        .cloned()
        .collect();

    // Stable sort keeps the reversed insertion order for equal timestamps.
    filtered.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));

    if let Some(limit) = query.limit {
        filtered.truncate(limit);
    }

    filtered
}
