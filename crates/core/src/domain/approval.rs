use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::claim::ClaimId;
use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ApprovalId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Pending,
    Approved,
    Rejected,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Validates a decision arriving from a caller: only approved and
    /// rejected may be recorded onto an approval row.
    pub fn recordable(self) -> Result<Self, crate::errors::DomainError> {
        match self {
            Self::Pending => Err(crate::errors::DomainError::PendingNotRecordable),
            other => Ok(other),
        }
    }
}

impl std::str::FromStr for Decision {
    type Err = crate::errors::DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(crate::errors::DomainError::UnknownDecision(other.to_string())),
        }
    }
}

/// One approver's slot against a specific claim. Rows are created pending
/// at workflow-creation time and are immutable once decided.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Approval {
    pub id: ApprovalId,
    pub claim_id: ClaimId,
    pub approver_id: UserId,
    /// 1-based position in the resolved chain. Advisory metadata only:
    /// decisions are not gated on it.
    pub sequence_order: u32,
    pub decision: Decision,
    pub comment: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}
