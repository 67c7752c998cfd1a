use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use thiserror::Error;

pub mod approval;
pub mod audit;
pub mod claim;
pub mod company;
pub mod sequence;
pub mod user;

pub use approval::PendingApproval;
pub use audit::AuditRecorder;
pub use claim::ClaimStats;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

impl From<claimflow_core::DomainError> for RepositoryError {
    fn from(error: claimflow_core::DomainError) -> Self {
        Self::Decode(error.to_string())
    }
}

/// Timestamps are stored as RFC 3339 text and always written by this crate,
/// so parsing is strict.
pub(crate) fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("bad timestamp `{raw}`: {error}")))
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, RepositoryError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|error| RepositoryError::Decode(format!("bad date `{raw}`: {error}")))
}

/// Monetary amounts are stored as decimal text, never as floats.
pub(crate) fn parse_amount(raw: &str) -> Result<Decimal, RepositoryError> {
    raw.parse::<Decimal>()
        .map_err(|error| RepositoryError::Decode(format!("bad amount `{raw}`: {error}")))
}
