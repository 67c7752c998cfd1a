use claimflow_core::{ApprovalId, ClaimId, DomainError, UserId};
use claimflow_db::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("claim {id} not found", id = .0 .0)]
    ClaimNotFound(ClaimId),

    #[error("submitter {id} not found or inactive", id = .0 .0)]
    SubmitterNotFound(UserId),

    /// The guarded UPDATE changed nothing: the approval does not exist, is
    /// not assigned to this approver, or was already decided.
    #[error("approval {id} has no pending decision for this approver", id = .0 .0)]
    ApprovalNotPending(ApprovalId),

    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
