//! Database-wide migration lock
//!
//! Only one process may run migrations against a database at a time.
//!
//! - PostgreSQL: session advisory lock held on a dedicated pooled connection
//!   for the whole run
//! - SQLite: single-row lock table; the process whose insert lands holds the
//!   lock. Rows older than [`STALE_LOCK_SECS`] belong to a crashed process and
//!   are cleared before each attempt.
//!
//! Acquisition polls until the configured timeout and then fails with
//! [`Error::LockUnavailable`]. The lock must be released explicitly with
//! [`MigrationLock::release`].

use crate::db::pool::DbPool;
use crate::{Error, Result};
use chrono::Utc;
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqlitePool;
use sqlx::Postgres;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Advisory lock key ("PQRSMIGR")
pub const ADVISORY_LOCK_KEY: i64 = 0x5051_5253_4d49_4752;

/// SQLite lock table
pub const LOCK_TABLE: &str = "schema_migration_lock";

/// Age after which a SQLite lock row is considered abandoned
pub const STALE_LOCK_SECS: i64 = 15 * 60;

const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Held migration lock
pub enum MigrationLock {
    Postgres(PoolConnection<Postgres>),
    Sqlite { pool: SqlitePool, holder: String },
}

impl MigrationLock {
    /// Wait up to `timeout` for the lock
    pub async fn acquire(db: &DbPool, timeout: Duration) -> Result<Self> {
        let start = Instant::now();
        match db {
            DbPool::Postgres(pool) => {
                let mut conn = pool.acquire().await?;
                loop {
                    let acquired: bool = sqlx::query_scalar("SELECT pg_try_advisory_lock($1)")
                        .bind(ADVISORY_LOCK_KEY)
                        .fetch_one(&mut *conn)
                        .await?;
                    if acquired {
                        debug!("Acquired advisory migration lock");
                        return Ok(MigrationLock::Postgres(conn));
                    }
                    wait_or_give_up(start, timeout).await?;
                }
            }
            DbPool::Sqlite(handle) => {
                let pool = handle.pool.clone();
                sqlx::query(&format!(
                    r#"
                    CREATE TABLE IF NOT EXISTS {} (
                        id INTEGER PRIMARY KEY CHECK (id = 1),
                        holder TEXT NOT NULL,
                        acquired_at INTEGER NOT NULL
                    )
                    "#,
                    LOCK_TABLE
                ))
                .execute(&pool)
                .await?;

                let holder = Uuid::new_v4().to_string();
                loop {
                    let now = Utc::now().timestamp();
                    let cleared = sqlx::query(&format!("DELETE FROM {} WHERE acquired_at < ?", LOCK_TABLE))
                        .bind(now - STALE_LOCK_SECS)
                        .execute(&pool)
                        .await?
                        .rows_affected();
                    if cleared > 0 {
                        warn!("Cleared stale migration lock");
                    }

                    let inserted = sqlx::query(&format!(
                        "INSERT OR IGNORE INTO {} (id, holder, acquired_at) VALUES (1, ?, ?)",
                        LOCK_TABLE
                    ))
                    .bind(&holder)
                    .bind(now)
                    .execute(&pool)
                    .await?
                    .rows_affected();
                    if inserted == 1 {
                        debug!("Acquired migration lock as {}", holder);
                        return Ok(MigrationLock::Sqlite { pool, holder });
                    }
                    wait_or_give_up(start, timeout).await?;
                }
            }
        }
    }

    pub async fn release(self) -> Result<()> {
        match self {
            MigrationLock::Postgres(mut conn) => {
                let released: bool = sqlx::query_scalar("SELECT pg_advisory_unlock($1)")
                    .bind(ADVISORY_LOCK_KEY)
                    .fetch_one(&mut *conn)
                    .await?;
                if !released {
                    warn!("Advisory migration lock was not held at release");
                }
            }
            MigrationLock::Sqlite { pool, holder } => {
                sqlx::query(&format!("DELETE FROM {} WHERE id = 1 AND holder = ?", LOCK_TABLE))
                    .bind(&holder)
                    .execute(&pool)
                    .await?;
            }
        }
        debug!("Released migration lock");
        Ok(())
    }
}

async fn wait_or_give_up(start: Instant, timeout: Duration) -> Result<()> {
    if start.elapsed() >= timeout {
        info!("Migration lock still held after {:?}", timeout);
        return Err(Error::LockUnavailable(format!(
            "another process is running migrations (waited {}s)",
            timeout.as_secs()
        )));
    }
    tokio::time::sleep(POLL_INTERVAL).await;
    Ok(())
}
