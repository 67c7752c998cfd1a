use chrono::Utc;
use claimflow_core::{ClaimId, ClaimStatus, CompanyId, ExpenseClaim, NewClaim, UserId};
use rust_decimal::Decimal;
use sqlx::sqlite::{SqliteExecutor, SqliteRow};
use sqlx::Row;

use super::{parse_amount, parse_date, parse_timestamp, RepositoryError};

pub async fn insert<'e>(
    executor: impl SqliteExecutor<'e>,
    user_id: UserId,
    company_id: CompanyId,
    claim: &NewClaim,
) -> Result<ClaimId, RepositoryError> {
    let now = Utc::now().to_rfc3339();
    let result = sqlx::query(
        r#"
        INSERT INTO expense_claims
            (user_id, company_id, title, category, description, amount, currency,
             converted_amount, expense_date, status, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, 'pending', ?10)
        "#,
    )
    .bind(user_id.0)
    .bind(company_id.0)
    .bind(&claim.title)
    .bind(&claim.category)
    .bind(claim.description.as_deref())
    .bind(claim.amount.to_string())
    .bind(&claim.currency)
    .bind(claim.converted_amount.to_string())
    .bind(claim.expense_date.format("%Y-%m-%d").to_string())
    .bind(&now)
    .execute(executor)
    .await?;

    Ok(ClaimId(result.last_insert_rowid()))
}

pub async fn find_by_id<'e>(
    executor: impl SqliteExecutor<'e>,
    id: ClaimId,
) -> Result<Option<ExpenseClaim>, RepositoryError> {
    let row = sqlx::query(&format!("{SELECT_CLAIM} WHERE claim_id = ?1"))
        .bind(id.0)
        .fetch_optional(executor)
        .await?;

    row.map(row_to_claim).transpose()
}

/// Moves a claim to `status` unless it already reached a terminal state.
/// Returns the number of rows changed; zero means the claim was missing or
/// already settled, and the caller decides which of those it cares about.
pub async fn set_status_if_open<'e>(
    executor: impl SqliteExecutor<'e>,
    id: ClaimId,
    status: ClaimStatus,
) -> Result<u64, RepositoryError> {
    let result = sqlx::query(
        r#"
        UPDATE expense_claims
        SET status = ?2
        WHERE claim_id = ?1
          AND status NOT IN ('approved', 'rejected')
        "#,
    )
    .bind(id.0)
    .bind(status.as_str())
    .execute(executor)
    .await?;

    Ok(result.rows_affected())
}

pub async fn list_for_user<'e>(
    executor: impl SqliteExecutor<'e>,
    user_id: UserId,
) -> Result<Vec<ExpenseClaim>, RepositoryError> {
    let rows = sqlx::query(&format!(
        "{SELECT_CLAIM} WHERE user_id = ?1 ORDER BY created_at DESC, claim_id DESC"
    ))
    .bind(user_id.0)
    .fetch_all(executor)
    .await?;

    rows.into_iter().map(row_to_claim).collect()
}

#[derive(Clone, Debug, Default, PartialEq, serde::Serialize)]
pub struct ClaimStats {
    pub total: u32,
    pub pending: u32,
    pub approved: u32,
    pub rejected: u32,
    /// Sum of converted amounts over approved claims.
    pub approved_total: Decimal,
}

pub async fn stats_for_user<'e>(
    executor: impl SqliteExecutor<'e>,
    user_id: UserId,
) -> Result<ClaimStats, RepositoryError> {
    let rows = sqlx::query(
        r#"
        SELECT status, converted_amount
        FROM expense_claims
        WHERE user_id = ?1
        "#,
    )
    .bind(user_id.0)
    .fetch_all(executor)
    .await?;

    // Summed in Rust so the decimal arithmetic never round-trips through
    // SQLite's float affinity.
    let mut stats = ClaimStats::default();
    for row in rows {
        let status: ClaimStatus = row.get::<String, _>("status").parse()?;
        stats.total += 1;
        match status {
            ClaimStatus::Pending | ClaimStatus::Processing => stats.pending += 1,
            ClaimStatus::Approved => {
                stats.approved += 1;
                stats.approved_total += parse_amount(row.get("converted_amount"))?;
            }
            ClaimStatus::Rejected => stats.rejected += 1,
        }
    }
    Ok(stats)
}

const SELECT_CLAIM: &str = r#"
    SELECT claim_id, user_id, company_id, title, category, description, amount,
           currency, converted_amount, expense_date, status, created_at
    FROM expense_claims
"#;

fn row_to_claim(row: SqliteRow) -> Result<ExpenseClaim, RepositoryError> {
    Ok(ExpenseClaim {
        id: ClaimId(row.get("claim_id")),
        user_id: UserId(row.get("user_id")),
        company_id: CompanyId(row.get("company_id")),
        title: row.get("title"),
        category: row.get("category"),
        description: row.get("description"),
        amount: parse_amount(row.get("amount"))?,
        currency: row.get("currency"),
        converted_amount: parse_amount(row.get("converted_amount"))?,
        expense_date: parse_date(row.get("expense_date"))?,
        status: row.get::<String, _>("status").parse()?,
        created_at: parse_timestamp(row.get("created_at"))?,
    })
}

#[cfg(test)]
mod tests {
    use claimflow_core::{ClaimStatus, NewClaim, Role};
    use rust_decimal::Decimal;

    use super::{find_by_id, insert, list_for_user, set_status_if_open, stats_for_user};
    use crate::repositories::{company, user};
    use crate::{connect_with_settings, migrations};

    async fn setup() -> sqlx::SqlitePool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrations");
        pool
    }

    fn sample_claim(title: &str, converted: &str) -> NewClaim {
        NewClaim {
            title: title.to_string(),
            category: "travel".to_string(),
            description: None,
            amount: converted.parse::<Decimal>().expect("amount"),
            currency: "USD".to_string(),
            converted_amount: converted.parse::<Decimal>().expect("amount"),
            expense_date: chrono::NaiveDate::from_ymd_opt(2026, 3, 14).expect("date"),
        }
    }

    #[tokio::test]
    async fn inserted_claim_round_trips_with_decimal_amounts() {
        let pool = setup().await;
        let company_id = company::insert(&pool, "Acme", None, "USD").await.expect("company");
        let submitter = user::insert(&pool, company_id, "Eve", "eve@acme.test", Role::Employee, None)
            .await
            .expect("user");

        let claim_id =
            insert(&pool, submitter, company_id, &sample_claim("Taxi", "12.34")).await.expect("insert");
        let claim = find_by_id(&pool, claim_id).await.expect("find").expect("present");

        assert_eq!(claim.status, ClaimStatus::Pending);
        assert_eq!(claim.converted_amount, "12.34".parse::<Decimal>().expect("amount"));
        assert_eq!(claim.expense_date, chrono::NaiveDate::from_ymd_opt(2026, 3, 14).expect("date"));

        let listed = list_for_user(&pool, submitter).await.expect("list");
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, claim_id);
    }

    #[tokio::test]
    async fn terminal_status_is_never_overwritten() {
        let pool = setup().await;
        let company_id = company::insert(&pool, "Acme", None, "USD").await.expect("company");
        let submitter = user::insert(&pool, company_id, "Eve", "eve@acme.test", Role::Employee, None)
            .await
            .expect("user");
        let claim_id =
            insert(&pool, submitter, company_id, &sample_claim("Taxi", "10")).await.expect("insert");

        assert_eq!(
            set_status_if_open(&pool, claim_id, ClaimStatus::Rejected).await.expect("reject"),
            1
        );
        assert_eq!(
            set_status_if_open(&pool, claim_id, ClaimStatus::Approved).await.expect("no-op"),
            0
        );

        let claim = find_by_id(&pool, claim_id).await.expect("find").expect("present");
        assert_eq!(claim.status, ClaimStatus::Rejected);
    }

    #[tokio::test]
    async fn stats_split_by_status_and_sum_approved_amounts() {
        let pool = setup().await;
        let company_id = company::insert(&pool, "Acme", None, "USD").await.expect("company");
        let submitter = user::insert(&pool, company_id, "Eve", "eve@acme.test", Role::Employee, None)
            .await
            .expect("user");

        let approved_a =
            insert(&pool, submitter, company_id, &sample_claim("Hotel", "100.50")).await.expect("a");
        let approved_b =
            insert(&pool, submitter, company_id, &sample_claim("Meals", "20.25")).await.expect("b");
        let rejected =
            insert(&pool, submitter, company_id, &sample_claim("Taxi", "7")).await.expect("c");
        insert(&pool, submitter, company_id, &sample_claim("Rail", "15")).await.expect("d");

        set_status_if_open(&pool, approved_a, ClaimStatus::Approved).await.expect("approve");
        set_status_if_open(&pool, approved_b, ClaimStatus::Approved).await.expect("approve");
        set_status_if_open(&pool, rejected, ClaimStatus::Rejected).await.expect("reject");

        let stats = stats_for_user(&pool, submitter).await.expect("stats");
        assert_eq!((stats.total, stats.pending, stats.approved, stats.rejected), (4, 1, 2, 1));
        assert_eq!(stats.approved_total, "120.75".parse::<Decimal>().expect("sum"));
    }
}
