use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::company::CompanyId;
use crate::domain::user::UserId;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClaimId(pub i64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimStatus {
    Pending,
    /// Reserved stored value. The workflow engine never produces it but
    /// must accept it when reading claims that carry it.
    Processing,
    Approved,
    Rejected,
}

impl ClaimStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Approved and rejected are terminal: no further transition is
    /// permitted once either is stored.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Approved | Self::Rejected)
    }
}

impl std::str::FromStr for ClaimStatus {
    type Err = crate::errors::DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            other => Err(crate::errors::DomainError::UnknownClaimStatus(other.to_string())),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExpenseClaim {
    pub id: ClaimId,
    pub user_id: UserId,
    pub company_id: CompanyId,
    pub title: String,
    pub category: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    /// Amount expressed in the company base currency, converted upstream.
    pub converted_amount: Decimal,
    pub expense_date: NaiveDate,
    pub status: ClaimStatus,
    pub created_at: DateTime<Utc>,
}

/// Submission fields, validated for presence by the web layer.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NewClaim {
    pub title: String,
    pub category: String,
    pub description: Option<String>,
    pub amount: Decimal,
    pub currency: String,
    pub converted_amount: Decimal,
    pub expense_date: NaiveDate,
}
