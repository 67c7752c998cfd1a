use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("unknown role `{0}` (expected admin|manager|employee)")]
    UnknownRole(String),
    #[error("unknown claim status `{0}` (expected pending|processing|approved|rejected)")]
    UnknownClaimStatus(String),
    #[error("unknown approval decision `{0}` (expected pending|approved|rejected)")]
    UnknownDecision(String),
    #[error("`pending` is not a recordable decision")]
    PendingNotRecordable,
}
