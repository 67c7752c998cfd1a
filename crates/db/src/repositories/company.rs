use chrono::Utc;
use claimflow_core::{Company, CompanyId};
use sqlx::sqlite::{SqliteExecutor, SqliteRow};
use sqlx::Row;

use super::{parse_timestamp, RepositoryError};

pub async fn insert<'e>(
    executor: impl SqliteExecutor<'e>,
    name: &str,
    country_code: Option<&str>,
    base_currency: &str,
) -> Result<CompanyId, RepositoryError> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        INSERT INTO companies (name, country_code, base_currency, created_at)
        VALUES (?1, ?2, ?3, ?4)
        "#,
    )
    .bind(name)
    .bind(country_code)
    .bind(base_currency)
    .bind(&now)
    .execute(executor)
    .await?;

    Ok(CompanyId(result.last_insert_rowid()))
}

pub async fn find_by_id<'e>(
    executor: impl SqliteExecutor<'e>,
    id: CompanyId,
) -> Result<Option<Company>, RepositoryError> {
    let row = sqlx::query(
        r#"
        SELECT company_id, name, country_code, base_currency, created_at
        FROM companies
        WHERE company_id = ?1
        "#,
    )
    .bind(id.0)
    .fetch_optional(executor)
    .await?;

    row.map(row_to_company).transpose()
}

fn row_to_company(row: SqliteRow) -> Result<Company, RepositoryError> {
    Ok(Company {
        id: CompanyId(row.get("company_id")),
        name: row.get("name"),
        country_code: row.get("country_code"),
        base_currency: row.get("base_currency"),
        created_at: parse_timestamp(row.get("created_at"))?,
    })
}
