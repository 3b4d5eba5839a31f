//! Migration Runner
//!
//! Applies an ordered list of steps under the database-wide lock:
//!
//! 1. Acquire the migration lock
//! 2. Ensure and load the ledger
//! 3. Take one schema snapshot
//! 4. For each step: evaluate, apply if needed, fold the effect into the
//!    snapshot, record it in the ledger
//! 5. Release the lock and return the report
//!
//! A failing step is rolled back, reported and skipped over. Connection-class
//! errors abort the whole run since nothing after them can succeed.

use crate::config::MigrationsConfig;
use crate::db::dialect::{Dialect, Statement};
use crate::db::inspector::{SchemaInspector, SchemaSnapshot};
use crate::db::ledger::Ledger;
use crate::db::lock::MigrationLock;
use crate::db::pool::DbPool;
use crate::db::report::{MigrationReport, SkipReason, StepOutcome};
use crate::db::step::{MigrationStep, Precondition, StepKind};
use crate::{Error, Result};
use serde::Serialize;
use std::collections::HashSet;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Per-run options
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Run destructive steps instead of skipping them as `requires-opt-in`
    pub allow_destructive: bool,
    pub lock_timeout: Duration,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            allow_destructive: false,
            lock_timeout: Duration::from_secs(30),
        }
    }
}

impl RunOptions {
    /// Destructive steps need both the configuration switch and a per-run
    /// request
    pub fn from_config(config: &MigrationsConfig, destructive_requested: bool) -> Self {
        Self {
            allow_destructive: config.allow_destructive && destructive_requested,
            lock_timeout: config.lock_timeout(),
        }
    }
}

/// Dry-run result for one step
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    pub id: String,
    pub destructive: bool,
    /// `None` when the step would run
    pub skip: Option<SkipReason>,
    pub statements: Vec<String>,
}

impl PlannedStep {
    pub fn is_pending(&self) -> bool {
        self.skip.is_none()
    }
}

pub struct MigrationRunner<'a> {
    db: &'a DbPool,
    options: RunOptions,
}

impl<'a> MigrationRunner<'a> {
    pub fn new(db: &'a DbPool, options: RunOptions) -> Self {
        Self { db, options }
    }

    /// Run `steps` in order and report every outcome
    ///
    /// Errors only when the run cannot proceed at all: lock unavailable,
    /// ledger or snapshot unreadable, or a connection failure mid-run.
    pub async fn run(&self, steps: &[MigrationStep]) -> Result<MigrationReport> {
        let lock = MigrationLock::acquire(self.db, self.options.lock_timeout).await?;
        let result = self.run_locked(steps).await;
        if let Err(e) = lock.release().await {
            warn!("Failed to release migration lock: {}", e);
        }
        result
    }

    async fn run_locked(&self, steps: &[MigrationStep]) -> Result<MigrationReport> {
        let dialect = self.db.adapter();
        Ledger::ensure(self.db).await?;
        let mut ledger = Ledger::load(self.db).await?;
        let mut snapshot = SchemaInspector::new(self.db).snapshot().await?;
        let mut report = MigrationReport::new(self.db.dialect());

        info!("Running migrations on {} ({} steps)", dialect.kind(), steps.len());

        for step in steps {
            if let Some(replacement) = step.superseded_by {
                debug!("  - {} superseded by {}", step.id, replacement);
                continue;
            }

            let in_ledger = ledger.contains(step.id);
            let outcome = match step.evaluate(&snapshot, dialect, in_ledger) {
                Precondition::Satisfied => {
                    if !in_ledger && !step.is_data_step() {
                        Ledger::record(self.db, step.id).await?;
                        ledger.insert(step.id.to_string());
                        debug!("  ✓ {} already satisfied; adopted into ledger", step.id);
                    }
                    StepOutcome::Skipped(SkipReason::AlreadySatisfied)
                }
                Precondition::Skip(reason) => {
                    match reason {
                        SkipReason::UnsupportedByDialect => warn!(
                            "  ⚠ {} ({}) cannot be applied on {}",
                            step.id,
                            step.target(),
                            dialect.kind()
                        ),
                        _ => info!("  - {} skipped: {}", step.id, reason),
                    }
                    StepOutcome::Skipped(reason)
                }
                Precondition::Needed if step.destructive && !self.options.allow_destructive => {
                    warn!(
                        "  ⚠ {} ({}) is destructive and needs explicit opt-in; skipped",
                        step.id,
                        step.target()
                    );
                    StepOutcome::Skipped(SkipReason::RequiresOptIn)
                }
                Precondition::Needed => {
                    if in_ledger && !step.is_data_step() {
                        warn!(
                            "  ⚠ Ledger records {} but {} is not in place; re-applying",
                            step.id,
                            step.target()
                        );
                    }
                    self.apply(step, dialect, &mut snapshot, &mut ledger).await?
                }
            };
            report.push(step.id, outcome, step.destructive);
        }

        report.finish();
        info!(
            "Migrations finished: {} applied, {} skipped, {} failed",
            report.applied().count(),
            report.skipped().count(),
            report.failed().count()
        );
        Ok(report)
    }

    /// Apply one step; only transient errors escape
    async fn apply(
        &self,
        step: &MigrationStep,
        dialect: &dyn Dialect,
        snapshot: &mut SchemaSnapshot,
        ledger: &mut HashSet<String>,
    ) -> Result<StepOutcome> {
        if let StepKind::AddColumn { table, column } = &step.kind {
            if !dialect.supports_add_column_if_not_exists() {
                let live = SchemaInspector::new(self.db).columns_of(table).await?;
                if live.iter().any(|c| c.name == column.name) {
                    debug!("  ✓ {}.{} appeared since snapshot", table, column.name);
                    return self.adopt(step, dialect, snapshot, ledger).await;
                }
            }
        }

        let mut statements = step.render(snapshot, dialect);
        if statements.is_empty() {
            warn!("  ⚠ {} has nothing to execute on {}", step.id, dialect.kind());
            return Ok(StepOutcome::Skipped(SkipReason::UnsupportedByDialect));
        }
        if step.destructive {
            warn!("  ⚠ Applying destructive step {} ({})", step.id, step.target());
        }
        statements.push(Ledger::record_statement(step.id));

        match self.db.execute_statements(&statements).await {
            Ok(()) => {
                step.record_effect(snapshot, dialect);
                ledger.insert(step.id.to_string());
                info!("  ✓ {} ({})", step.id, step.target());
                Ok(StepOutcome::Applied)
            }
            Err(e) if e.is_transient() => {
                error!("  ✗ {} aborted the run: {}", step.id, e);
                Err(e)
            }
            Err(Error::Database(sqlx::Error::Database(db_err)))
                if db_err.message().contains("duplicate column") =>
            {
                debug!("  ✓ {} raced with another writer: {}", step.id, db_err.message());
                self.adopt(step, dialect, snapshot, ledger).await
            }
            Err(e) => {
                error!("  ✗ {} ({}) failed: {}", step.id, step.target(), e);
                debug!(
                    "Failed statements:\n{}",
                    statements.iter().map(Statement::to_string).collect::<Vec<_>>().join("\n")
                );
                Ok(StepOutcome::Failed(e.to_string()))
            }
        }
    }

    async fn adopt(
        &self,
        step: &MigrationStep,
        dialect: &dyn Dialect,
        snapshot: &mut SchemaSnapshot,
        ledger: &mut HashSet<String>,
    ) -> Result<StepOutcome> {
        step.record_effect(snapshot, dialect);
        Ledger::record(self.db, step.id).await?;
        ledger.insert(step.id.to_string());
        Ok(StepOutcome::Skipped(SkipReason::AlreadySatisfied))
    }

    /// Evaluate `steps` without executing anything
    ///
    /// Effects of steps that would run are folded into a private snapshot so
    /// dependent steps plan correctly. Takes no lock and creates no tables.
    pub async fn plan(&self, steps: &[MigrationStep]) -> Result<Vec<PlannedStep>> {
        let snapshot = SchemaInspector::new(self.db).snapshot().await?;
        self.plan_against(steps, &snapshot).await
    }

    /// [`plan`](Self::plan) over a snapshot the caller already holds
    pub async fn plan_against(&self, steps: &[MigrationStep], current: &SchemaSnapshot) -> Result<Vec<PlannedStep>> {
        let dialect = self.db.adapter();
        let ledger = Ledger::load_if_exists(self.db).await?;
        let mut snapshot = current.clone();

        let mut planned = Vec::new();
        for step in steps.iter().filter(|s| s.superseded_by.is_none()) {
            let skip = match step.evaluate(&snapshot, dialect, ledger.contains(step.id)) {
                Precondition::Satisfied => Some(SkipReason::AlreadySatisfied),
                Precondition::Skip(reason) => Some(reason),
                Precondition::Needed if step.destructive && !self.options.allow_destructive => {
                    Some(SkipReason::RequiresOptIn)
                }
                Precondition::Needed => None,
            };

            let statements = match skip {
                // Destructive steps still show what they would do
                None | Some(SkipReason::RequiresOptIn) => step
                    .render(&snapshot, dialect)
                    .iter()
                    .map(Statement::to_string)
                    .collect(),
                Some(_) => Vec::new(),
            };
            if skip.is_none() {
                step.record_effect(&mut snapshot, dialect);
            }

            planned.push(PlannedStep {
                id: step.id.to_string(),
                destructive: step.destructive,
                skip,
                statements,
            });
        }
        Ok(planned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_destructive_needs_both_switches() {
        let mut config = MigrationsConfig::default();
        assert!(!RunOptions::from_config(&config, true).allow_destructive);

        config.allow_destructive = true;
        assert!(!RunOptions::from_config(&config, false).allow_destructive);
        assert!(RunOptions::from_config(&config, true).allow_destructive);
        assert_eq!(RunOptions::from_config(&config, true).lock_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_planned_step_pending() {
        let step = PlannedStep {
            id: "add_nit_column".into(),
            destructive: false,
            skip: None,
            statements: vec![],
        };
        assert!(step.is_pending());
        let skipped = PlannedStep {
            skip: Some(SkipReason::RequiresOptIn),
            ..step
        };
        assert!(!skipped.is_pending());
    }
}
