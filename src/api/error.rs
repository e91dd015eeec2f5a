//! JSON error responses and the JSON body extractor that produces them.

use axum::async_trait;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::ledger::LedgerError;
use crate::network::{PeerError, TransportError};
use crate::node::NodeError;
use crate::workflow::WorkflowError;

/// An error rendered as `{ "error": message }` with a status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }
}

fn workflow_status(err: &WorkflowError) -> StatusCode {
    match err {
        WorkflowError::ContractNotFound(_) => StatusCode::NOT_FOUND,
        WorkflowError::ContractAlreadyExists(_) | WorkflowError::WorkflowClosed { .. } => {
            StatusCode::CONFLICT
        }
        WorkflowError::InvalidContract(_)
        | WorkflowError::StepMismatch { .. }
        | WorkflowError::StepOutOfRange { .. } => StatusCode::BAD_REQUEST,
        WorkflowError::RoleNotAuthorized(_) => StatusCode::FORBIDDEN,
        WorkflowError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn ledger_status(err: &LedgerError) -> StatusCode {
    match err {
        LedgerError::InvalidBlock(_) | LedgerError::ChainInvalid => StatusCode::BAD_REQUEST,
        LedgerError::ChainTooShort { .. } => StatusCode::CONFLICT,
    }
}

impl From<NodeError> for ApiError {
    fn from(err: NodeError) -> Self {
        let status = match &err {
            NodeError::Workflow(e) => workflow_status(e),
            NodeError::Ledger(e) => ledger_status(e),
            NodeError::Peer(PeerError::PeerNotFound(_)) => StatusCode::NOT_FOUND,
            NodeError::Peer(PeerError::PeerAlreadyExists(_)) => StatusCode::CONFLICT,
            NodeError::BlockNotFound(_) => StatusCode::NOT_FOUND,
            NodeError::Transport(TransportError::Timeout(_)) => StatusCode::GATEWAY_TIMEOUT,
            NodeError::Transport(_) => StatusCode::BAD_GATEWAY,
            NodeError::Config(_) | NodeError::Task(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

/// `Json<T>` whose rejection is an [`ApiError`], so malformed bodies get the
/// same error shape as every other failure.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| ApiError::new(rejection.status(), rejection.body_text()))?;
        Ok(Self(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflow::{AdminRole, ContractStatus};

    fn status_of(err: impl Into<NodeError>) -> StatusCode {
        ApiError::from(err.into()).status
    }

    #[test]
    fn test_not_found_maps_to_404() {
        assert_eq!(
            status_of(WorkflowError::ContractNotFound("c".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(PeerError::PeerNotFound("p".into())),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status_of(NodeError::BlockNotFound("h".into())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn test_misuse_maps_to_client_errors() {
        assert_eq!(
            status_of(WorkflowError::StepMismatch {
                current: 1,
                requested: 3
            }),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status_of(WorkflowError::WorkflowClosed {
                status: ContractStatus::Rejected
            }),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(WorkflowError::RoleNotAuthorized(AdminRole::LegalCommission)),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status_of(PeerError::PeerAlreadyExists("p".into())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(LedgerError::InvalidBlock("bad".into())),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn test_internal_ledger_failure_maps_to_500() {
        assert_eq!(
            status_of(WorkflowError::Ledger(LedgerError::InvalidBlock("x".into()))),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
