use chrono::{DateTime, Utc};
use claimflow_core::{AuditEntry, EntityKind, UserId};
use sqlx::sqlite::{SqliteExecutor, SqliteRow};
use sqlx::Row;

use super::{parse_timestamp, RepositoryError};
use crate::connection::DbPool;
use crate::tx::{write_scope, StoreError};

/// Append-only recorder for the audit trail. Each entry is written in its
/// own transaction scope so a failed audit write can never roll back the
/// business mutation it describes, and vice versa.
#[derive(Clone, Debug)]
pub struct AuditRecorder {
    pool: DbPool,
}

impl AuditRecorder {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn record(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        let entry = entry.clone();
        write_scope(&self.pool, move |conn| {
            let entry = entry.clone();
            Box::pin(async move { insert(&mut *conn, &entry).await.map_err(StoreError::from) })
        })
        .await
    }
}

pub async fn insert<'e>(
    executor: impl SqliteExecutor<'e>,
    entry: &AuditEntry,
) -> Result<(), RepositoryError> {
    sqlx::query(
        r#"
        INSERT INTO audit_log (user_id, action, entity, entity_id, details, timestamp)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6)
        "#,
    )
    .bind(entry.actor.0)
    .bind(entry.action.as_str())
    .bind(entry.entity.as_str())
    .bind(entry.entity_id)
    .bind(&entry.details)
    .bind(entry.occurred_at.to_rfc3339())
    .execute(executor)
    .await?;
    Ok(())
}

/// A stored trail row. Action and entity come back as raw text because the
/// trail outlives any one version of those enums.
#[derive(Clone, Debug, PartialEq, serde::Serialize)]
pub struct AuditRecord {
    pub log_id: i64,
    pub actor: UserId,
    pub action: String,
    pub entity: String,
    pub entity_id: i64,
    pub details: String,
    pub occurred_at: DateTime<Utc>,
}

pub async fn list_for_entity<'e>(
    executor: impl SqliteExecutor<'e>,
    entity: EntityKind,
    entity_id: i64,
) -> Result<Vec<AuditRecord>, RepositoryError> {
    let rows = sqlx::query(
        r#"
        SELECT log_id, user_id, action, entity, entity_id, details, timestamp
        FROM audit_log
        WHERE entity = ?1 AND entity_id = ?2
        ORDER BY log_id
        "#,
    )
    .bind(entity.as_str())
    .bind(entity_id)
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(row_to_record).collect()
}

fn row_to_record(row: SqliteRow) -> Result<AuditRecord, RepositoryError> {
    Ok(AuditRecord {
        log_id: row.get("log_id"),
        actor: UserId(row.get("user_id")),
        action: row.get("action"),
        entity: row.get("entity"),
        entity_id: row.get("entity_id"),
        details: row.get("details"),
        occurred_at: parse_timestamp(row.get("timestamp"))?,
    })
}