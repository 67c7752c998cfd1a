use std::time::Duration;

use futures::future::BoxFuture;
use sqlx::SqliteConnection;
use thiserror::Error;
use tracing::warn;

use crate::repositories::RepositoryError;
use crate::DbPool;

#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLITE_BUSY/SQLITE_LOCKED that survived every retry attempt.
    #[error("database lock contention persisted across {attempts} attempts")]
    LockContention {
        attempts: u32,
        #[source]
        source: sqlx::Error,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl From<sqlx::Error> for StoreError {
    fn from(source: sqlx::Error) -> Self {
        Self::Repository(RepositoryError::Database(source))
    }
}

impl StoreError {
    /// Splits off the retryable case: `Ok` carries the underlying busy
    /// error, `Err` returns the original error untouched.
    fn into_contention_source(self) -> Result<sqlx::Error, StoreError> {
        match self {
            Self::Repository(RepositoryError::Database(source))
                if is_lock_contention(&source) =>
            {
                Ok(source)
            }
            other => Err(other),
        }
    }
}

/// SQLITE_BUSY (5) and SQLITE_LOCKED (6), including their extended codes.
/// The message check mirrors what sqlite reports when the busy-wait ceiling
/// is exceeded.
fn is_lock_contention(error: &sqlx::Error) -> bool {
    match error {
        sqlx::Error::Database(db_error) => {
            let code_matches = db_error
                .code()
                .map(|code| matches!(code.as_ref(), "5" | "6" | "261" | "262" | "517"))
                .unwrap_or(false);
            code_matches
                || db_error.message().contains("database is locked")
                || db_error.message().contains("database table is locked")
        }
        _ => false,
    }
}

/// Exponential backoff between write-scope attempts: 0.2s, 0.4s, 0.8s, 1.6s
/// for the default five-attempt budget.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetrySchedule {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetrySchedule {
    fn default() -> Self {
        Self { max_attempts: 5, base_delay: Duration::from_millis(200) }
    }
}

impl RetrySchedule {
    /// Delay to sleep after a failed attempt (1-based), or `None` when the
    /// budget is exhausted and the error should surface.
    pub fn delay_after(&self, attempt: u32) -> Option<Duration> {
        if attempt == 0 || attempt >= self.max_attempts {
            return None;
        }
        Some(self.base_delay * 2u32.pow(attempt - 1))
    }
}

/// Runs one mutating unit of work on a connection owned exclusively by this
/// scope. Commits on success; rolls back on any error. Lock contention
/// restarts the whole scope per the retry schedule; every other error
/// propagates immediately after rollback.
pub async fn write_scope<T, F>(pool: &DbPool, op: F) -> Result<T, StoreError>
where
    F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, StoreError>> + Send,
    T: Send,
{
    write_scope_with_schedule(pool, RetrySchedule::default(), op).await
}

pub async fn write_scope_with_schedule<T, F>(
    pool: &DbPool,
    schedule: RetrySchedule,
    op: F,
) -> Result<T, StoreError>
where
    F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, StoreError>> + Send,
    T: Send,
{
    let mut scope = Scope { pool, op };
    retry_with_backoff(schedule, &mut scope, |scope| {
        Box::pin(async move { attempt_scope(scope.pool, &mut scope.op).await })
    })
    .await
}

struct Scope<'p, F> {
    pool: &'p DbPool,
    op: F,
}

/// Generic retry driver, separated from the transaction plumbing so the
/// attempt/delay behavior is testable without contending real connections.
pub(crate) async fn retry_with_backoff<Ctx, T, Run>(
    schedule: RetrySchedule,
    ctx: &mut Ctx,
    run: Run,
) -> Result<T, StoreError>
where
    Ctx: ?Sized,
    Run: for<'c> Fn(&'c mut Ctx) -> BoxFuture<'c, Result<T, StoreError>>,
{
    let mut attempt = 1u32;
    loop {
        match run(ctx).await {
            Ok(value) => return Ok(value),
            Err(error) => {
                let source = match error.into_contention_source() {
                    Ok(source) => source,
                    Err(other) => return Err(other),
                };
                match schedule.delay_after(attempt) {
                    Some(delay) => {
                        warn!(
                            event_name = "store.write_scope.retry",
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            "database locked, retrying write scope"
                        );
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                    }
                    None => {
                        return Err(StoreError::LockContention { attempts: attempt, source });
                    }
                }
            }
        }
    }
}

async fn attempt_scope<T, F>(pool: &DbPool, op: &mut F) -> Result<T, StoreError>
where
    F: for<'c> FnMut(&'c mut SqliteConnection) -> BoxFuture<'c, Result<T, StoreError>>,
{
    let mut conn = pool.acquire().await.map_err(StoreError::from)?;

    // BEGIN IMMEDIATE takes the write lock up front so contention surfaces
    // here, before any statement in the scope has run.
    sqlx::query("BEGIN IMMEDIATE").execute(conn.as_mut()).await?;

    match op(conn.as_mut()).await {
        Ok(value) => {
            sqlx::query("COMMIT").execute(conn.as_mut()).await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = sqlx::query("ROLLBACK").execute(conn.as_mut()).await {
                warn!(
                    event_name = "store.write_scope.rollback_failed",
                    error = %rollback_error,
                    "rollback failed after write scope error"
                );
            }
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::borrow::Cow;
    use std::error::Error as StdError;
    use std::time::Duration;

    use futures::future::BoxFuture;
    use sqlx::error::{DatabaseError, ErrorKind};

    use crate::repositories::RepositoryError;

    use super::{retry_with_backoff, RetrySchedule, StoreError};

    #[derive(Debug)]
    struct FakeBusy;

    impl std::fmt::Display for FakeBusy {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            f.write_str("database is locked")
        }
    }

    impl StdError for FakeBusy {}

    impl DatabaseError for FakeBusy {
        fn message(&self) -> &str {
            "database is locked"
        }

        fn code(&self) -> Option<Cow<'_, str>> {
            Some(Cow::Borrowed("5"))
        }

        fn as_error(&self) -> &(dyn StdError + Send + Sync + 'static) {
            self
        }

        fn as_error_mut(&mut self) -> &mut (dyn StdError + Send + Sync + 'static) {
            self
        }

        fn into_error(self: Box<Self>) -> Box<dyn StdError + Send + Sync + 'static> {
            self
        }

        fn kind(&self) -> ErrorKind {
            ErrorKind::Other
        }
    }

    fn busy() -> StoreError {
        StoreError::from(sqlx::Error::Database(Box::new(FakeBusy)))
    }

    fn record_attempt(attempts: &mut Vec<tokio::time::Instant>) -> BoxFuture<'_, Result<(), StoreError>> {
        Box::pin(async move {
            attempts.push(tokio::time::Instant::now());
            Err(busy())
        })
    }

    #[test]
    fn schedule_doubles_from_base_delay() {
        let schedule = RetrySchedule::default();
        assert_eq!(schedule.delay_after(1), Some(Duration::from_millis(200)));
        assert_eq!(schedule.delay_after(2), Some(Duration::from_millis(400)));
        assert_eq!(schedule.delay_after(3), Some(Duration::from_millis(800)));
        assert_eq!(schedule.delay_after(4), Some(Duration::from_millis(1600)));
        assert_eq!(schedule.delay_after(5), None);
    }

    #[tokio::test(start_paused = true)]
    async fn persistent_contention_runs_exactly_five_attempts_with_doubling_delays() {
        let mut attempts: Vec<tokio::time::Instant> = Vec::new();

        let result =
            retry_with_backoff(RetrySchedule::default(), &mut attempts, record_attempt).await;

        match result {
            Err(StoreError::LockContention { attempts: reported, .. }) => {
                assert_eq!(reported, 5);
            }
            other => panic!("expected lock contention error, got {other:?}"),
        }

        assert_eq!(attempts.len(), 5);
        let gaps: Vec<Duration> =
            attempts.windows(2).map(|pair| pair[1] - pair[0]).collect();
        assert_eq!(
            gaps,
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn contention_that_clears_stops_retrying() {
        let mut calls = 0u32;

        let result = retry_with_backoff(RetrySchedule::default(), &mut calls, |calls| {
            Box::pin(async move {
                *calls += 1;
                if *calls < 3 {
                    Err(busy())
                } else {
                    Ok(*calls)
                }
            })
        })
        .await;

        assert_eq!(result.expect("third attempt succeeds"), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn non_contention_errors_are_never_retried() {
        let mut calls = 0u32;

        let result: Result<(), StoreError> =
            retry_with_backoff(RetrySchedule::default(), &mut calls, |calls| {
                Box::pin(async move {
                    *calls += 1;
                    Err(StoreError::Repository(RepositoryError::Decode(
                        "bad row".to_string(),
                    )))
                })
            })
            .await;

        assert!(matches!(result, Err(StoreError::Repository(RepositoryError::Decode(_)))));
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn write_scope_commits_on_success_and_rolls_back_on_error() {
        let pool = crate::connect_with_settings("sqlite::memory:", 1, 5)
            .await
            .expect("connect");
        sqlx::query("CREATE TABLE t (id INTEGER PRIMARY KEY, v TEXT NOT NULL)")
            .execute(&pool)
            .await
            .expect("create table");

        super::write_scope(&pool, |conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO t (v) VALUES ('kept')")
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::from)?;
                Ok(())
            })
        })
        .await
        .expect("scope commits");

        let result: Result<(), StoreError> = super::write_scope(&pool, |conn| {
            Box::pin(async move {
                sqlx::query("INSERT INTO t (v) VALUES ('discarded')")
                    .execute(&mut *conn)
                    .await
                    .map_err(StoreError::from)?;
                Err(StoreError::Repository(RepositoryError::Decode(
                    "forced failure".to_string(),
                )))
            })
        })
        .await;
        assert!(result.is_err());

        let rows: Vec<String> = sqlx::query_scalar("SELECT v FROM t ORDER BY id")
            .fetch_all(&pool)
            .await
            .expect("read rows");
        assert_eq!(rows, vec!["kept".to_string()]);
    }
}
