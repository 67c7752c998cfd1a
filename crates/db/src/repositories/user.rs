use chrono::Utc;
use claimflow_core::{CompanyId, Directory, Role, User, UserId};
use sqlx::sqlite::{SqliteExecutor, SqliteRow};
use sqlx::Row;

use super::{parse_timestamp, RepositoryError};

pub async fn insert<'e>(
    executor: impl SqliteExecutor<'e>,
    company_id: CompanyId,
    name: &str,
    email: &str,
    role: Role,
    manager_id: Option<UserId>,
) -> Result<UserId, RepositoryError> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        INSERT INTO users (company_id, name, email, role_type, manager_id, is_active, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, 1, ?6)
        "#,
    )
    .bind(company_id.0)
    .bind(name)
    .bind(email)
    .bind(role.as_str())
    .bind(manager_id.map(|id| id.0))
    .bind(&now)
    .execute(executor)
    .await?;

    Ok(UserId(result.last_insert_rowid()))
}

pub async fn find_by_id<'e>(
    executor: impl SqliteExecutor<'e>,
    id: UserId,
) -> Result<Option<User>, RepositoryError> {
    let row = sqlx::query(
        r#"
        SELECT user_id, company_id, name, email, role_type, manager_id, is_active, created_at
        FROM users
        WHERE user_id = ?1
        "#,
    )
    .bind(id.0)
    .fetch_optional(executor)
    .await?;

    row.map(row_to_user).transpose()
}

/// Loads every user of a company into the role/activity lookup the
/// sequence resolver walks. Includes inactive users so eligibility checks
/// see them rather than treating them as unknown ids.
pub async fn load_directory<'e>(
    executor: impl SqliteExecutor<'e>,
    company_id: CompanyId,
) -> Result<Directory, RepositoryError> {
    let rows = sqlx::query(
        r#"
        SELECT user_id, role_type, is_active
        FROM users
        WHERE company_id = ?1
        "#,
    )
    .bind(company_id.0)
    .fetch_all(executor)
    .await?;

    let mut directory = Directory::new();
    for row in rows {
        let role: Role = row.get::<String, _>("role_type").parse()?;
        directory.insert(UserId(row.get("user_id")), role, row.get("is_active"));
    }
    Ok(directory)
}

fn row_to_user(row: SqliteRow) -> Result<User, RepositoryError> {
    Ok(User {
        id: UserId(row.get("user_id")),
        company_id: CompanyId(row.get("company_id")),
        name: row.get("name"),
        email: row.get("email"),
        role: row.get::<String, _>("role_type").parse()?,
        manager_id: row.get::<Option<i64>, _>("manager_id").map(UserId),
        is_active: row.get("is_active"),
        created_at: parse_timestamp(row.get("created_at"))?,
    })
}
