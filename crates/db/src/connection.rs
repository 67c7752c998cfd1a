use std::time::Duration;

use sqlx::sqlite::SqlitePoolOptions;

pub type DbPool = sqlx::SqlitePool;

pub async fn connect(database_url: &str) -> Result<DbPool, sqlx::Error> {
    connect_with_settings(database_url, 5, 30).await
}

/// Durability configuration favors throughput under moderate write
/// concurrency: WAL journaling, relaxed fsync, a bounded page cache, and a
/// long busy-wait ceiling. Exceeding the ceiling surfaces SQLITE_BUSY, which
/// the write scope in `tx` then retries.
pub async fn connect_with_settings(
    database_url: &str,
    max_connections: u32,
    acquire_timeout_secs: u64,
) -> Result<DbPool, sqlx::Error> {
    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .acquire_timeout(Duration::from_secs(acquire_timeout_secs.max(1)))
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
                sqlx::query("PRAGMA journal_mode = WAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA synchronous = NORMAL").execute(&mut *conn).await?;
                sqlx::query("PRAGMA cache_size = 2000").execute(&mut *conn).await?;
                sqlx::query("PRAGMA temp_store = memory").execute(&mut *conn).await?;
                sqlx::query("PRAGMA busy_timeout = 120000").execute(&mut *conn).await?;
                sqlx::query("PRAGMA wal_autocheckpoint = 1000").execute(&mut *conn).await?;
                Ok(())
            })
        })
        .connect(database_url)
        .await
}
