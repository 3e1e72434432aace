//! Error taxonomy exposed to the HTTP layer
//!
//! Every component error converts into [`CoordinatorError`]. Each variant carries
//! the status code the caller should answer with and whether retrying the whole
//! request can succeed.

use serde::Serialize;
use thiserror::Error;

use crate::identity::{DirectoryError, VerificationError};
use crate::membership::MembershipError;
use crate::provider::ProviderError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("invalid request: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("group provider rejected the operation (HTTP {status}): {reason}")]
    ProviderRejected { status: u16, reason: String },

    #[error("group provider unavailable: {0}")]
    ProviderUnavailable(String),

    #[error("group provider returned a malformed reply: {0}")]
    ProviderBadResponse(String),

    #[error("record store conflict: {0}")]
    StoreConflict(String),

    #[error("record store unavailable: {0}")]
    StoreUnavailable(String),
}

/// Machine-readable error class carried in [`ErrorPayload`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    NotFound,
    ProviderRejected,
    ProviderUnavailable,
    ProviderBadResponse,
    StoreConflict,
    StoreUnavailable,
}

impl CoordinatorError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CoordinatorError::Validation(_) => ErrorKind::Validation,
            CoordinatorError::NotFound(_) => ErrorKind::NotFound,
            CoordinatorError::ProviderRejected { .. } => ErrorKind::ProviderRejected,
            CoordinatorError::ProviderUnavailable(_) => ErrorKind::ProviderUnavailable,
            CoordinatorError::ProviderBadResponse(_) => ErrorKind::ProviderBadResponse,
            CoordinatorError::StoreConflict(_) => ErrorKind::StoreConflict,
            CoordinatorError::StoreUnavailable(_) => ErrorKind::StoreUnavailable,
        }
    }

    pub fn status_code(&self) -> u16 {
        match self {
            CoordinatorError::Validation(_) => 400,
            CoordinatorError::NotFound(_) => 404,
            CoordinatorError::ProviderRejected { status, .. } if (400..500).contains(status) => *status,
            CoordinatorError::ProviderRejected { .. } => 400,
            CoordinatorError::ProviderUnavailable(_) => 503,
            CoordinatorError::ProviderBadResponse(_) => 502,
            CoordinatorError::StoreConflict(_) => 409,
            CoordinatorError::StoreUnavailable(_) => 500,
        }
    }

    /// Whether the caller may resubmit the same request.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            CoordinatorError::ProviderUnavailable(_) | CoordinatorError::StoreConflict(_)
        )
    }

    pub fn is_store_conflict(&self) -> bool {
        matches!(self, CoordinatorError::StoreConflict(_))
    }

    pub fn payload(&self) -> ErrorPayload {
        ErrorPayload {
            kind: self.kind(),
            message: self.to_string(),
            retryable: self.is_retryable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

/// Status code plus optional structured error, as handed to the HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Reply {
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

impl Reply {
    pub fn from_result<T>(result: &Result<T, CoordinatorError>, success_status: u16) -> Self {
        match result {
            Ok(_) => Self {
                status: success_status,
                error: None,
            },
            Err(err) => Self {
                status: err.status_code(),
                error: Some(err.payload()),
            },
        }
    }
}

impl From<ProviderError> for CoordinatorError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Unavailable { message } => CoordinatorError::ProviderUnavailable(message),
            ProviderError::Rejected { status, reason, .. } => {
                CoordinatorError::ProviderRejected { status, reason }
            }
            ProviderError::BadResponse { message } => CoordinatorError::ProviderBadResponse(message),
        }
    }
}

impl From<StoreError> for CoordinatorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { kind, id } => CoordinatorError::NotFound(format!("{kind} {id}")),
            StoreError::Conflict { .. } => CoordinatorError::StoreConflict(err.to_string()),
            StoreError::Unavailable { .. } | StoreError::Codec(_) => {
                CoordinatorError::StoreUnavailable(err.to_string())
            }
        }
    }
}

impl From<MembershipError> for CoordinatorError {
    fn from(err: MembershipError) -> Self {
        CoordinatorError::Validation(err.to_string())
    }
}

impl From<DirectoryError> for CoordinatorError {
    fn from(err: DirectoryError) -> Self {
        CoordinatorError::StoreUnavailable(err.to_string())
    }
}

impl From<VerificationError> for CoordinatorError {
    fn from(err: VerificationError) -> Self {
        CoordinatorError::ProviderUnavailable(err.to_string())
    }
}

impl From<validator::ValidationErrors> for CoordinatorError {
    fn from(err: validator::ValidationErrors) -> Self {
        CoordinatorError::Validation(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Kind;

    #[test]
    fn test_status_codes_follow_taxonomy() {
        assert_eq!(CoordinatorError::Validation("x".into()).status_code(), 400);
        assert_eq!(CoordinatorError::NotFound("Item 1".into()).status_code(), 404);
        assert_eq!(CoordinatorError::ProviderUnavailable("x".into()).status_code(), 503);
        assert_eq!(CoordinatorError::ProviderBadResponse("x".into()).status_code(), 502);
        assert_eq!(CoordinatorError::StoreConflict("x".into()).status_code(), 409);
        assert_eq!(CoordinatorError::StoreUnavailable("x".into()).status_code(), 500);
    }

    #[test]
    fn test_provider_rejection_surfaces_provider_status() {
        let err: CoordinatorError = ProviderError::Rejected {
            operation: "add".into(),
            status: 401,
            reason: "bad key".into(),
        }
        .into();

        assert_eq!(err.status_code(), 401);
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::ProviderRejected);
    }

    #[test]
    fn test_only_transient_errors_are_retryable() {
        assert!(CoordinatorError::ProviderUnavailable("x".into()).is_retryable());
        assert!(CoordinatorError::StoreConflict("x".into()).is_retryable());
        assert!(!CoordinatorError::StoreUnavailable("x".into()).is_retryable());
        assert!(!CoordinatorError::Validation("x".into()).is_retryable());
    }

    #[test]
    fn test_store_errors_map_to_taxonomy() {
        let not_found: CoordinatorError = StoreError::NotFound {
            kind: Kind::Item,
            id: "42".into(),
        }
        .into();
        assert_eq!(not_found.to_string(), "Item 42 not found");

        let conflict: CoordinatorError = StoreError::Conflict {
            kind: Kind::Item,
            id: "42".into(),
        }
        .into();
        assert!(conflict.is_store_conflict());
    }

    #[test]
    fn test_reply_carries_payload_on_error() {
        let result: Result<(), CoordinatorError> = Err(CoordinatorError::NotFound("Group teamA".into()));
        let reply = Reply::from_result(&result, 204);

        assert_eq!(reply.status, 404);
        let payload = reply.error.unwrap();
        assert_eq!(payload.kind, ErrorKind::NotFound);
        assert!(!payload.retryable);

        let ok: Result<(), CoordinatorError> = Ok(());
        assert_eq!(Reply::from_result(&ok, 201), Reply { status: 201, error: None });
    }
}
