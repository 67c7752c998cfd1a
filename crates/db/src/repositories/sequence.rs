use chrono::Utc;
use claimflow_core::{CompanyId, Role, SequenceSlot, UserId};
use sqlx::sqlite::SqliteExecutor;
use sqlx::{Row, SqliteConnection};

use super::RepositoryError;

/// Company default approver order, lowest sequence_order first.
pub async fn list_for_company<'e>(
    executor: impl SqliteExecutor<'e>,
    company_id: CompanyId,
) -> Result<Vec<SequenceSlot>, RepositoryError> {
    let rows = sqlx::query(
        r#"
        SELECT user_id, is_manager_approver
        FROM approval_sequences
        WHERE company_id = ?1
        ORDER BY sequence_order, sequence_id
        "#,
    )
    .bind(company_id.0)
    .fetch_all(executor)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| SequenceSlot {
            user_id: UserId(row.get("user_id")),
            is_manager_slot: row.get("is_manager_approver"),
        })
        .collect())
}

pub async fn insert_slot<'e>(
    executor: impl SqliteExecutor<'e>,
    company_id: CompanyId,
    user_id: UserId,
    sequence_order: u32,
    is_manager_slot: bool,
) -> Result<(), RepositoryError> {
    let now = Utc::now().to_rfc3339();
    sqlx::query(
        r#"
        INSERT INTO approval_sequences
            (company_id, user_id, sequence_order, is_manager_approver, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
    )
    .bind(company_id.0)
    .bind(user_id.0)
    .bind(sequence_order)
    .bind(is_manager_slot)
    .bind(&now)
    .execute(executor)
    .await?;
    Ok(())
}

/// Seeds a company's default sequence when none exists yet: every active
/// manager as a manager slot, then every active admin, both in ascending
/// user-id order. Idempotent; an existing template is left untouched.
/// Returns how many slots were inserted.
pub async fn ensure_default_sequence(
    conn: &mut SqliteConnection,
    company_id: CompanyId,
) -> Result<u32, RepositoryError> {
    let existing: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM approval_sequences WHERE company_id = ?1")
            .bind(company_id.0)
            .fetch_one(&mut *conn)
            .await?;
    if existing > 0 {
        return Ok(0);
    }

    let approvers = sqlx::query(
        r#"
        SELECT user_id, role_type
        FROM users
        WHERE company_id = ?1
          AND is_active = 1
          AND role_type IN ('manager', 'admin')
        ORDER BY CASE role_type WHEN 'manager' THEN 0 ELSE 1 END, user_id
        "#,
    )
    .bind(company_id.0)
    .fetch_all(&mut *conn)
    .await?;

    let mut inserted = 0u32;
    for row in approvers {
        let role: Role = row.get::<String, _>("role_type").parse()?;
        insert_slot(
            &mut *conn,
            company_id,
            UserId(row.get("user_id")),
            inserted + 1,
            role == Role::Manager,
        )
        .await?;
        inserted += 1;
    }
    Ok(inserted)
}
