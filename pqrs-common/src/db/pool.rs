//! Database handle
//!
//! One connection pool per process, PostgreSQL or SQLite, chosen from the
//! scheme of the configured URL. Statements rendered by a dialect adapter are
//! executed here: transactional statements share one transaction, autocommit
//! statements run on a separately acquired connection after the open
//! transaction has been committed.

use crate::config::DatabaseConfig;
use crate::db::dialect::{Dialect, DialectKind, ExecMode, Statement};
use crate::Result;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Where a SQLite database lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqliteLocation {
    File(PathBuf),
    Memory,
}

impl SqliteLocation {
    /// Parse the location from a `sqlite:` URL
    pub fn from_url(url: &str) -> Self {
        let rest = url
            .strip_prefix("sqlite://")
            .or_else(|| url.strip_prefix("sqlite:"))
            .unwrap_or(url);
        let (path, query) = match rest.split_once('?') {
            Some((path, query)) => (path, query),
            None => (rest, ""),
        };
        if path.is_empty() || path == ":memory:" || query.contains("mode=memory") {
            SqliteLocation::Memory
        } else {
            SqliteLocation::File(PathBuf::from(path))
        }
    }
}

/// SQLite pool plus what is needed to reopen it after a reset
#[derive(Debug, Clone)]
pub struct SqliteHandle {
    pub pool: SqlitePool,
    pub location: SqliteLocation,
    config: DatabaseConfig,
}

impl SqliteHandle {
    async fn open(config: &DatabaseConfig) -> Result<Self> {
        let location = SqliteLocation::from_url(&config.url);
        let mut options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(5));

        let pool_options = match &location {
            SqliteLocation::File(path) => {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                let newly_created = !path.exists();
                options = options.journal_mode(SqliteJournalMode::Wal);
                if newly_created {
                    info!("Initializing new database: {}", path.display());
                } else {
                    info!("Opening existing database: {}", path.display());
                }
                SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(config.acquire_timeout())
                    .idle_timeout(Some(config.idle_timeout()))
                    .max_lifetime(Some(config.max_lifetime()))
            }
            // Every connection would otherwise see its own empty database
            SqliteLocation::Memory => {
                info!("Opening in-memory database");
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .min_connections(1)
                    .acquire_timeout(config.acquire_timeout())
                    .idle_timeout(None)
                    .max_lifetime(None)
            }
        };

        let pool = pool_options.connect_with(options).await?;
        Ok(Self {
            pool,
            location,
            config: config.clone(),
        })
    }

    /// Delete the database file and its WAL side files, then reopen
    async fn recreate_file(&mut self, path: &Path) -> Result<()> {
        self.pool.close().await;
        for candidate in [
            path.to_path_buf(),
            sidecar(path, "-wal"),
            sidecar(path, "-shm"),
        ] {
            match std::fs::remove_file(&candidate) {
                Ok(()) => debug!("Removed {}", candidate.display()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        *self = Self::open(&self.config).await?;
        Ok(())
    }

    /// Drop every user table of an in-memory database
    async fn drop_all_tables(&self) -> Result<()> {
        let mut conn = self.pool.acquire().await?;
        sqlx::query("PRAGMA foreign_keys = OFF").execute(&mut *conn).await?;
        let tables: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&mut *conn)
        .await?;
        for table in &tables {
            sqlx::query(&format!("DROP TABLE IF EXISTS {}", table))
                .execute(&mut *conn)
                .await?;
        }
        sqlx::query("PRAGMA foreign_keys = ON").execute(&mut *conn).await?;
        info!("Dropped {} tables", tables.len());
        Ok(())
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// Process-wide database handle
#[derive(Debug, Clone)]
pub enum DbPool {
    Postgres(PgPool),
    Sqlite(SqliteHandle),
}

impl DbPool {
    /// Connect using the dialect named by the URL scheme
    ///
    /// Unknown schemes fail with `UnsupportedDialect` before any connection
    /// attempt.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        match DialectKind::from_url(&config.url)? {
            DialectKind::Postgres => {
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .min_connections(config.min_connections)
                    .acquire_timeout(config.acquire_timeout())
                    .idle_timeout(Some(config.idle_timeout()))
                    .max_lifetime(Some(config.max_lifetime()))
                    .connect(&config.url)
                    .await?;
                info!("Connected to PostgreSQL");
                Ok(DbPool::Postgres(pool))
            }
            DialectKind::Sqlite => Ok(DbPool::Sqlite(SqliteHandle::open(config).await?)),
        }
    }

    pub fn dialect(&self) -> DialectKind {
        match self {
            DbPool::Postgres(_) => DialectKind::Postgres,
            DbPool::Sqlite(_) => DialectKind::Sqlite,
        }
    }

    pub fn adapter(&self) -> &'static dyn Dialect {
        self.dialect().adapter()
    }

    /// Round-trip a trivial query
    pub async fn ping(&self) -> Result<()> {
        match self {
            DbPool::Postgres(pool) => {
                sqlx::query("SELECT 1").execute(pool).await?;
            }
            DbPool::Sqlite(handle) => {
                sqlx::query("SELECT 1").execute(&handle.pool).await?;
            }
        }
        Ok(())
    }

    /// Execute statements as one unit of work
    ///
    /// Transactional statements run in a single transaction that rolls back
    /// on the first error. An autocommit statement first commits whatever is
    /// open, then runs on its own connection.
    pub async fn execute_statements(&self, statements: &[Statement]) -> Result<()> {
        match self {
            DbPool::Postgres(pool) => execute_pg(pool, statements).await,
            DbPool::Sqlite(handle) => execute_sqlite(&handle.pool, statements).await,
        }
    }

    /// Throw away every object in the database and reopen it empty
    ///
    /// PostgreSQL drops and recreates the `public` schema. A SQLite file is
    /// deleted along with its WAL side files; an in-memory SQLite database
    /// has its tables dropped.
    pub async fn recreate(&mut self) -> Result<()> {
        match self {
            DbPool::Postgres(pool) => {
                warn!("Dropping schema public");
                execute_pg(
                    pool,
                    &[
                        Statement::transactional("DROP SCHEMA IF EXISTS public CASCADE"),
                        Statement::transactional("CREATE SCHEMA public"),
                        Statement::transactional("GRANT ALL ON SCHEMA public TO public"),
                    ],
                )
                .await
            }
            DbPool::Sqlite(handle) => match handle.location.clone() {
                SqliteLocation::File(path) => {
                    warn!("Deleting database file {}", path.display());
                    handle.recreate_file(&path).await
                }
                SqliteLocation::Memory => {
                    warn!("Dropping all tables of in-memory database");
                    handle.drop_all_tables().await
                }
            },
        }
    }

    pub async fn close(&self) {
        match self {
            DbPool::Postgres(pool) => pool.close().await,
            DbPool::Sqlite(handle) => handle.pool.close().await,
        }
    }
}

async fn execute_pg(pool: &PgPool, statements: &[Statement]) -> Result<()> {
    let mut tx: Option<sqlx::Transaction<'_, sqlx::Postgres>> = None;
    for statement in statements {
        debug!("{}", statement);
        match statement.mode {
            ExecMode::Transactional => {
                if tx.is_none() {
                    tx = Some(pool.begin().await?);
                }
                if let Some(open) = tx.as_mut() {
                    sqlx::query(&statement.sql).execute(&mut **open).await?;
                }
            }
            ExecMode::Autocommit => {
                if let Some(open) = tx.take() {
                    open.commit().await?;
                }
                let mut conn = pool.acquire().await?;
                sqlx::query(&statement.sql).execute(&mut *conn).await?;
            }
        }
    }
    if let Some(open) = tx.take() {
        open.commit().await?;
    }
    Ok(())
}

async fn execute_sqlite(pool: &SqlitePool, statements: &[Statement]) -> Result<()> {
    let mut tx: Option<sqlx::Transaction<'_, sqlx::Sqlite>> = None;
    for statement in statements {
        debug!("{}", statement);
        match statement.mode {
            ExecMode::Transactional => {
                if tx.is_none() {
                    tx = Some(pool.begin().await?);
                }
                if let Some(open) = tx.as_mut() {
                    sqlx::query(&statement.sql).execute(&mut **open).await?;
                }
            }
            ExecMode::Autocommit => {
                if let Some(open) = tx.take() {
                    open.commit().await?;
                }
                let mut conn = pool.acquire().await?;
                sqlx::query(&statement.sql).execute(&mut *conn).await?;
            }
        }
    }
    if let Some(open) = tx.take() {
        open.commit().await?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sqlite_config(url: String) -> DatabaseConfig {
        DatabaseConfig {
            url,
            ..DatabaseConfig::default()
        }
    }

    #[test]
    fn test_sqlite_location_from_url() {
        assert_eq!(SqliteLocation::from_url("sqlite::memory:"), SqliteLocation::Memory);
        assert_eq!(SqliteLocation::from_url("sqlite://"), SqliteLocation::Memory);
        assert_eq!(
            SqliteLocation::from_url("sqlite://data/pqrs.db?mode=rwc"),
            SqliteLocation::File(PathBuf::from("data/pqrs.db"))
        );
        assert_eq!(
            SqliteLocation::from_url("sqlite:pqrs.db"),
            SqliteLocation::File(PathBuf::from("pqrs.db"))
        );
    }

    #[tokio::test]
    async fn test_unsupported_dialect_fails_before_connecting() {
        let err = DbPool::connect(&sqlite_config("mysql://root@localhost/pqrs".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::Error::UnsupportedDialect(_)));
    }

    #[tokio::test]
    async fn test_failed_statement_rolls_back_unit() {
        let dir = TempDir::new().unwrap();
        let url = format!("sqlite://{}", dir.path().join("unit.db").display());
        let db = DbPool::connect(&sqlite_config(url)).await.unwrap();

        let result = db
            .execute_statements(&[
                Statement::transactional("CREATE TABLE t (id INTEGER PRIMARY KEY)"),
                Statement::transactional("INSERT INTO missing VALUES (1)"),
            ])
            .await;
        assert!(result.is_err());

        let DbPool::Sqlite(handle) = &db else { panic!("expected sqlite") };
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE name = 't'")
            .fetch_one(&handle.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn test_recreate_file_database() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("reset.db");
        let url = format!("sqlite://{}", path.display());
        let mut db = DbPool::connect(&sqlite_config(url)).await.unwrap();

        db.execute_statements(&[Statement::transactional("CREATE TABLE t (id INTEGER)")])
            .await
            .unwrap();
        db.recreate().await.unwrap();

        let DbPool::Sqlite(handle) = &db else { panic!("expected sqlite") };
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
            .fetch_one(&handle.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_recreate_memory_database() {
        let mut db = DbPool::connect(&sqlite_config("sqlite::memory:".into())).await.unwrap();
        db.execute_statements(&[
            Statement::transactional("CREATE TABLE parent (id INTEGER PRIMARY KEY)"),
            Statement::transactional("CREATE TABLE child (id INTEGER, parent_id INTEGER REFERENCES parent(id))"),
        ])
        .await
        .unwrap();

        db.recreate().await.unwrap();

        let DbPool::Sqlite(handle) = &db else { panic!("expected sqlite") };
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'")
            .fetch_one(&handle.pool)
            .await
            .unwrap();
        assert_eq!(count, 0);
    }
}
