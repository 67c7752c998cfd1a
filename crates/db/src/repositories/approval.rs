use chrono::{DateTime, Utc};
use claimflow_core::{Approval, ApprovalId, ClaimId, Decision, UserId};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteExecutor, SqliteRow};
use sqlx::Row;

use super::{parse_amount, parse_timestamp, RepositoryError};

pub async fn insert_pending<'e>(
    executor: impl SqliteExecutor<'e>,
    claim_id: ClaimId,
    approver_id: UserId,
    sequence_order: u32,
) -> Result<ApprovalId, RepositoryError> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        INSERT INTO approvals (claim_id, approver_id, sequence_order, decision, created_at)
        VALUES (?1, ?2, ?3, 'pending', ?4)
        "#,
    )
    .bind(claim_id.0)
    .bind(approver_id.0)
    .bind(sequence_order)
    .bind(&now)
    .execute(executor)
    .await?;

    Ok(ApprovalId(result.last_insert_rowid()))
}

/// Stamps a decision onto a still-pending approval owned by `approver_id`.
/// The WHERE clause is the concurrency guard: a second decision, a decision
/// by the wrong user, or a decision on a missing row all change zero rows.
pub async fn record_decision<'e>(
    executor: impl SqliteExecutor<'e>,
    approval_id: ApprovalId,
    approver_id: UserId,
    decision: Decision,
    comment: Option<&str>,
    decided_at: DateTime<Utc>,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        r#"
        UPDATE approvals
        SET decision = ?3, comment = ?4, decided_at = ?5
        WHERE approval_id = ?1
          AND approver_id = ?2
          AND decision = 'pending'
        "#,
    )
    .bind(approval_id.0)
    .bind(approver_id.0)
    .bind(decision.as_str())
    .bind(comment)
    .bind(decided_at.to_rfc3339())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub async fn find_by_id<'e>(
    executor: impl SqliteExecutor<'e>,
    id: ApprovalId,
) -> Result<Option<Approval>, RepositoryError> {
    let row = sqlx::query(&format!("{SELECT_APPROVAL} WHERE approval_id = ?1"))
        .bind(id.0)
        .fetch_optional(executor)
        .await?;

    row.map(row_to_approval).transpose()
}

pub async fn list_for_claim<'e>(
    executor: impl SqliteExecutor<'e>,
    claim_id: ClaimId,
) -> Result<Vec<Approval>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "{SELECT_APPROVAL} WHERE claim_id = ?1 ORDER BY sequence_order, approval_id"
    ))
    .bind(claim_id.0)
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(row_to_approval).collect()
}

/// A pending approval joined with enough claim context to render a work
/// queue without further lookups.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct PendingApproval {
    pub approval_id: ApprovalId,
    pub claim_id: ClaimId,
    pub sequence_order: u32,
    pub claim_title: String,
    pub claim_category: String,
    pub amount: Decimal,
    pub currency: String,
    pub converted_amount: Decimal,
    pub submitter_id: UserId,
    pub submitter_name: String,
    pub submitted_at: DateTime<Utc>,
}

/// Pending work for one approver, newest claim first. Filtered on the
/// approval row's decision alone: an undecided row stays queued even after
/// the claim settled through another approver, and draining it is the
/// approver's own straggler decision.
pub async fn list_pending_for_approver<'e>(
    executor: impl SqliteExecutor<'e>,
    approver_id: UserId,
) -> Result<Vec<PendingApproval>, RepositoryError> {
    let rows = sqlx::query(
        r#"
        SELECT a.approval_id, a.claim_id, a.sequence_order,
               c.title, c.category, c.amount, c.currency, c.converted_amount,
               c.user_id AS submitter_id, u.name AS submitter_name,
               c.created_at AS submitted_at
        FROM approvals a
        JOIN expense_claims c ON c.claim_id = a.claim_id
        JOIN users u ON u.user_id = c.user_id
        WHERE a.approver_id = ?1
          AND a.decision = 'pending'
        ORDER BY c.created_at DESC, a.approval_id DESC
        "#,
    )
    .bind(approver_id.0)
    .fetch_all(executor)
    .await?;

    rows.into_iter()
        .map(|row| {
            Ok(PendingApproval {
                approval_id: ApprovalId(row.get("approval_id")),
                claim_id: ClaimId(row.get("claim_id")),
                sequence_order: row.get("sequence_order"),
                claim_title: row.get("title"),
                claim_category: row.get("category"),
                amount: parse_amount(row.get("amount"))?,
                currency: row.get("currency"),
                converted_amount: parse_amount(row.get("converted_amount"))?,
                submitter_id: UserId(row.get("submitter_id")),
                submitter_name: row.get("submitter_name"),
                submitted_at: parse_timestamp(row.get("submitted_at"))?,
            })
        })
        .collect()
}

const SELECT_APPROVAL: &str = r#"
    SELECT approval_id, claim_id, approver_id, sequence_order, decision,
           comment, decided_at, created_at
    FROM approvals
"#;

fn row_to_approval(row: SqliteRow) -> Result<Approval, RepositoryError> {
    let decided_at = row
        .get::<Option<String>, _>("decided_at")
        .map(|raw| parse_timestamp(&raw))
        .transpose()?;
    Ok(Approval {
        id: ApprovalId(row.get("approval_id")),
        claim_id: ClaimId(row.get("claim_id")),
        approver_id: UserId(row.get("approver_id")),
        sequence_order: row.get("sequence_order"),
        decision: row.get::<String, _>("decision").parse()?,
        comment: row.get("comment"),
        decided_at,
        created_at: parse_timestamp(row.get("created_at"))?,
    })
}
