use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Approved,
    Rejected,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "CREATE",
            Self::Update => "UPDATE",
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EntityKind {
    Company,
    User,
    ExpenseClaim,
    ExpenseApproval,
    ApprovalWorkflow,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Company => "COMPANY",
            Self::User => "USER",
            Self::ExpenseClaim => "EXPENSE_CLAIM",
            Self::ExpenseApproval => "EXPENSE_APPROVAL",
            Self::ApprovalWorkflow => "APPROVAL_WORKFLOW",
        }
    }
}

/// One append-only action record, written after the business mutation it
/// describes has committed. Never updated or deleted.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor: UserId,
    pub action: AuditAction,
    pub entity: EntityKind,
    pub entity_id: i64,
    pub details: String,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(
        actor: UserId,
        action: AuditAction,
        entity: EntityKind,
        entity_id: i64,
        details: impl Into<String>,
    ) -> Self {
        Self { actor, action, entity, entity_id, details: details.into(), occurred_at: Utc::now() }
    }
}
