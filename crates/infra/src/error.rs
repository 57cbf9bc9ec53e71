//! Application-level error returned by the ledger services.

use thiserror::Error;

use bahari_auth::AuthzError;
use bahari_core::DomainError;

use crate::document_store::StoreError;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitError {
    #[error("authentication required")]
    Unauthenticated,

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Missing or malformed input; raised before any read.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The pre-read state does not allow the operation. Nothing was written.
    #[error("failed precondition: {0}")]
    FailedPrecondition(String),

    /// Conflicting writers kept winning until the retry budget ran out.
    #[error("aborted: {0}")]
    Aborted(String),

    /// Anything unexpected. Carries the underlying message as-is.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CommitError {
    /// Wire-level error kind.
    pub fn code(&self) -> &'static str {
        match self {
            CommitError::Unauthenticated => "unauthenticated",
            CommitError::PermissionDenied(_) => "permission-denied",
            CommitError::InvalidArgument(_) => "invalid-argument",
            CommitError::FailedPrecondition(_) => "failed-precondition",
            CommitError::Aborted(_) => "aborted",
            CommitError::Internal(_) => "internal",
        }
    }
}

impl From<DomainError> for CommitError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => CommitError::InvalidArgument(msg),
            DomainError::PreconditionFailed(msg) | DomainError::NotFound(msg) => {
                CommitError::FailedPrecondition(msg)
            }
            DomainError::Conflict(msg) => CommitError::Aborted(msg),
        }
    }
}

impl From<AuthzError> for CommitError {
    fn from(value: AuthzError) -> Self {
        match value {
            AuthzError::Unauthenticated => CommitError::Unauthenticated,
            AuthzError::NoRole => CommitError::PermissionDenied("no role assigned to caller".into()),
            AuthzError::Forbidden(msg) => CommitError::PermissionDenied(msg),
        }
    }
}

impl From<StoreError> for CommitError {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Concurrency(msg) => CommitError::Aborted(msg),
            other => CommitError::Internal(other.to_string()),
        }
    }
}
