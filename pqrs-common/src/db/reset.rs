//! Reset/Reseed Controller
//!
//! Destroys the target schema, rebuilds it from the catalog and seeds a
//! single privileged account. The controller only moves forward:
//!
//! ```text
//! Pristine → SchemaDropped → SchemaRecreated → SchemaMigrated → Seeded → Done
//! ```
//!
//! Nothing touches the database until [`ResetController::authorize`] has
//! accepted the confirmation phrase and the optional maintenance token.

use crate::auth::password::hash_password;
use crate::auth::secret::{check_optional_token, secrets_match};
use crate::config::AppConfig;
use crate::db::canonical::HIGHEST_PRIVILEGE_ROLE;
use crate::db::catalog;
use crate::db::pool::DbPool;
use crate::db::report::MigrationReport;
use crate::db::runner::{MigrationRunner, RunOptions};
use crate::{Error, Result};
use serde::Serialize;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResetState {
    Pristine,
    SchemaDropped,
    SchemaRecreated,
    SchemaMigrated,
    Seeded,
    Done,
}

/// Why a reset was refused before any database work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetRefusal {
    /// No confirmation phrase configured; reset is disabled
    NotConfigured,
    WrongConfirmation,
    BadToken,
    /// Nothing to seed the privileged account with
    SeedPasswordMissing,
}

impl std::fmt::Display for ResetRefusal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResetRefusal::NotConfigured => write!(f, "Database reset is not enabled on this server"),
            ResetRefusal::WrongConfirmation => write!(f, "Confirmation phrase does not match"),
            ResetRefusal::BadToken => write!(f, "Maintenance token missing or invalid"),
            ResetRefusal::SeedPasswordMissing => write!(f, "No superadmin password configured for reseed"),
        }
    }
}

impl std::error::Error for ResetRefusal {}

impl From<ResetRefusal> for Error {
    fn from(refusal: ResetRefusal) -> Self {
        Error::DestructiveActionRefused(refusal.to_string())
    }
}

/// What a completed reset produced
#[derive(Debug, Clone, Serialize)]
pub struct ResetSummary {
    pub superadmin: String,
    pub migrations: MigrationReport,
}

pub struct ResetController<'a> {
    db: &'a mut DbPool,
    config: &'a AppConfig,
    state: ResetState,
    authorized: bool,
    migrations: Option<MigrationReport>,
}

impl<'a> ResetController<'a> {
    pub fn new(db: &'a mut DbPool, config: &'a AppConfig) -> Self {
        Self {
            db,
            config,
            state: ResetState::Pristine,
            authorized: false,
            migrations: None,
        }
    }

    pub fn state(&self) -> ResetState {
        self.state
    }

    /// Check the confirmation phrase (exact match) and maintenance token
    pub fn authorize(&mut self, confirm: &str, token: Option<&str>) -> std::result::Result<(), ResetRefusal> {
        let maintenance = &self.config.maintenance;
        let phrase = maintenance
            .confirm_phrase
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(ResetRefusal::NotConfigured)?;
        if !secrets_match(confirm, phrase) {
            warn!("Database reset refused: wrong confirmation phrase");
            return Err(ResetRefusal::WrongConfirmation);
        }
        if check_optional_token(token, maintenance.token.as_deref()).is_err() {
            warn!("Database reset refused: bad maintenance token");
            return Err(ResetRefusal::BadToken);
        }
        if self.config.seed.password.as_deref().map_or(true, str::is_empty) {
            return Err(ResetRefusal::SeedPasswordMissing);
        }
        self.authorized = true;
        Ok(())
    }

    /// Authorize and run every transition
    pub async fn run(&mut self, confirm: &str, token: Option<&str>) -> Result<ResetSummary> {
        self.authorize(confirm, token)?;
        self.execute().await
    }

    /// Run every remaining transition of an authorized reset
    pub async fn execute(&mut self) -> Result<ResetSummary> {
        warn!("⚠ Resetting {} database", self.db.dialect());
        self.drop_and_recreate().await?;
        self.create_schema_and_migrate().await?;
        let superadmin = self.seed_superadmin().await?;
        self.finish()?;
        Ok(ResetSummary {
            superadmin,
            migrations: self.migrations.take().unwrap_or_else(|| MigrationReport::new(self.db.dialect())),
        })
    }

    pub async fn drop_and_recreate(&mut self) -> Result<()> {
        self.expect_state(ResetState::Pristine)?;
        if !self.authorized {
            return Err(Error::Internal("reset transition attempted before authorization".into()));
        }
        self.state = ResetState::SchemaDropped;
        self.db.recreate().await?;
        self.state = ResetState::SchemaRecreated;
        info!("  ✓ Schema dropped and recreated");
        Ok(())
    }

    /// Build the canonical schema through the catalog
    pub async fn create_schema_and_migrate(&mut self) -> Result<()> {
        self.expect_state(ResetState::SchemaRecreated)?;
        let options = RunOptions::from_config(&self.config.migrations, false);
        let report = MigrationRunner::new(&*self.db, options).run(&catalog::active_steps()).await?;

        let failed: Vec<String> = report.failed().map(|s| s.to_string()).collect();
        if !failed.is_empty() {
            error!("Schema rebuild failed: {}", failed.join("; "));
            return Err(Error::Internal(format!("schema rebuild failed: {}", failed.join("; "))));
        }
        info!("  ✓ Schema rebuilt ({} steps applied)", report.applied().count());
        self.migrations = Some(report);
        self.state = ResetState::SchemaMigrated;
        Ok(())
    }

    /// Replace every user with the configured superadmin; returns its username
    pub async fn seed_superadmin(&mut self) -> Result<String> {
        self.expect_state(ResetState::SchemaMigrated)?;
        let seed = &self.config.seed;
        let password = seed
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(ResetRefusal::SeedPasswordMissing)?;
        let hashed = hash_password(password)?;

        match &*self.db {
            DbPool::Postgres(pool) => {
                let mut tx = pool.begin().await?;
                sqlx::query("DELETE FROM users").execute(&mut *tx).await?;
                sqlx::query(
                    r#"
                    INSERT INTO users (username, email, full_name, hashed_password, role, is_active)
                    VALUES ($1, $2, $3, $4, CAST($5 AS userrole), $6)
                    "#,
                )
                .bind(&seed.username)
                .bind(&seed.email)
                .bind(&seed.full_name)
                .bind(&hashed)
                .bind(HIGHEST_PRIVILEGE_ROLE)
                .bind(true)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
            }
            DbPool::Sqlite(handle) => {
                let mut tx = handle.pool.begin().await?;
                sqlx::query("DELETE FROM users").execute(&mut *tx).await?;
                sqlx::query(
                    r#"
                    INSERT INTO users (username, email, full_name, hashed_password, role, is_active)
                    VALUES (?, ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(&seed.username)
                .bind(&seed.email)
                .bind(&seed.full_name)
                .bind(&hashed)
                .bind(HIGHEST_PRIVILEGE_ROLE)
                .bind(true)
                .execute(&mut *tx)
                .await?;
                tx.commit().await?;
            }
        }

        self.state = ResetState::Seeded;
        info!("  ✓ Seeded {} account '{}'", HIGHEST_PRIVILEGE_ROLE, seed.username);
        Ok(seed.username.clone())
    }

    pub fn finish(&mut self) -> Result<()> {
        self.expect_state(ResetState::Seeded)?;
        self.state = ResetState::Done;
        info!("Database reset complete");
        Ok(())
    }

    fn expect_state(&self, expected: ResetState) -> Result<()> {
        if self.state != expected {
            return Err(Error::Internal(format!(
                "reset transition out of order: expected {:?}, at {:?}",
                expected, self.state
            )));
        }
        Ok(())
    }
}
