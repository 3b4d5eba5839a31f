//! Applied-migrations ledger
//!
//! Append-only record of step ids. For schema steps inspection stays
//! authoritative and the ledger is a cross-check; for data steps the ledger
//! is the only record that the step ran.

use crate::db::dialect::{quote_literal, Statement};
use crate::db::inspector::SchemaInspector;
use crate::db::pool::DbPool;
use crate::Result;
use chrono::NaiveDateTime;
use serde::Serialize;
use std::collections::HashSet;

pub const LEDGER_TABLE: &str = "applied_migrations";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LedgerEntry {
    pub id: String,
    pub applied_at: NaiveDateTime,
}

pub struct Ledger;

impl Ledger {
    /// Create the ledger table if needed
    pub async fn ensure(db: &DbPool) -> Result<()> {
        db.execute_statements(&[Statement::transactional(format!(
            r#"CREATE TABLE IF NOT EXISTS {} (
    id TEXT PRIMARY KEY,
    applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
)"#,
            LEDGER_TABLE
        ))])
        .await
    }

    /// Statement recording `id`; appended to a step's own unit of work so the
    /// change and its ledger row commit together
    pub fn record_statement(id: &str) -> Statement {
        Statement::transactional(format!(
            "INSERT INTO {} (id) VALUES ({}) ON CONFLICT (id) DO NOTHING",
            LEDGER_TABLE,
            quote_literal(id)
        ))
    }

    /// Record `id` on its own
    pub async fn record(db: &DbPool, id: &str) -> Result<()> {
        db.execute_statements(&[Self::record_statement(id)]).await
    }

    /// Ids of every recorded step
    pub async fn load(db: &DbPool) -> Result<HashSet<String>> {
        Ok(Self::entries(db).await?.into_iter().map(|e| e.id).collect())
    }

    /// Like [`Ledger::load`] but read-only: a missing ledger is empty
    pub async fn load_if_exists(db: &DbPool) -> Result<HashSet<String>> {
        if !SchemaInspector::new(db).table_exists(LEDGER_TABLE).await? {
            return Ok(HashSet::new());
        }
        Self::load(db).await
    }

    /// Entries in application order
    pub async fn entries(db: &DbPool) -> Result<Vec<LedgerEntry>> {
        let sql = format!("SELECT id, applied_at FROM {} ORDER BY applied_at, id", LEDGER_TABLE);
        let rows = match db {
            DbPool::Postgres(pool) => {
                sqlx::query_as::<_, (String, NaiveDateTime)>(&sql)
                    .fetch_all(pool)
                    .await?
            }
            DbPool::Sqlite(handle) => {
                sqlx::query_as::<_, (String, NaiveDateTime)>(&sql)
                    .fetch_all(&handle.pool)
                    .await?
            }
        };
        Ok(rows
            .into_iter()
            .map(|(id, applied_at)| LedgerEntry { id, applied_at })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;

    #[tokio::test]
    async fn test_record_is_idempotent() {
        let db = DbPool::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        })
        .await
        .unwrap();

        assert!(Ledger::load_if_exists(&db).await.unwrap().is_empty());

        Ledger::ensure(&db).await.unwrap();
        Ledger::ensure(&db).await.unwrap();
        Ledger::record(&db, "add_nit_column").await.unwrap();
        Ledger::record(&db, "add_nit_column").await.unwrap();
        Ledger::record(&db, "it's_quoted").await.unwrap();

        let ids = Ledger::load(&db).await.unwrap();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains("add_nit_column"));
        assert!(ids.contains("it's_quoted"));

        let entries = Ledger::entries(&db).await.unwrap();
        assert_eq!(entries.len(), 2);
    }
}
