//! Migration run report
//!
//! Created per run, never persisted. The HTTP surface flattens it into
//! `{status, migrations, errors}` via [`MigrationReport::to_response`].

use crate::db::dialect::DialectKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a step did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SkipReason {
    AlreadySatisfied,
    TargetMissing,
    UnsupportedByDialect,
    RequiresOptIn,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::AlreadySatisfied => "already-satisfied",
            SkipReason::TargetMissing => "target-missing",
            SkipReason::UnsupportedByDialect => "unsupported-by-dialect",
            SkipReason::RequiresOptIn => "requires-opt-in",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", content = "reason", rename_all = "lowercase")]
pub enum StepOutcome {
    Applied,
    Skipped(SkipReason),
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepReport {
    pub id: String,
    #[serde(flatten)]
    pub outcome: StepOutcome,
    pub destructive: bool,
}

impl fmt::Display for StepReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.outcome {
            StepOutcome::Applied => write!(f, "{}: applied", self.id),
            StepOutcome::Skipped(reason) => write!(f, "{}: skipped ({})", self.id, reason),
            StepOutcome::Failed(reason) => write!(f, "{}: failed ({})", self.id, reason),
        }
    }
}

/// Overall result of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// No step failed
    Success,
    /// Some steps failed, others applied or were skipped
    Partial,
    /// Every step failed, or the run could not start
    Error,
}

/// Ordered outcome of every declared step
#[derive(Debug, Clone, Serialize)]
pub struct MigrationReport {
    pub dialect: DialectKind,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub steps: Vec<StepReport>,
}

/// Wire shape of `POST /api/migrations/run`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationRunResponse {
    pub status: RunStatus,
    pub migrations: Vec<String>,
    pub errors: Vec<String>,
}

impl MigrationRunResponse {
    /// Response for a run that never reached the first step
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            migrations: Vec::new(),
            errors: vec![message.into()],
        }
    }
}

impl MigrationReport {
    pub fn new(dialect: DialectKind) -> Self {
        Self {
            dialect,
            started_at: Utc::now(),
            finished_at: None,
            steps: Vec::new(),
        }
    }

    pub fn push(&mut self, id: impl Into<String>, outcome: StepOutcome, destructive: bool) {
        self.steps.push(StepReport {
            id: id.into(),
            outcome,
            destructive,
        });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn outcome_of(&self, id: &str) -> Option<&StepOutcome> {
        self.steps.iter().find(|s| s.id == id).map(|s| &s.outcome)
    }

    pub fn applied(&self) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(|s| s.outcome == StepOutcome::Applied)
    }

    pub fn skipped(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Skipped(_)))
    }

    pub fn failed(&self) -> impl Iterator<Item = &StepReport> {
        self.steps
            .iter()
            .filter(|s| matches!(s.outcome, StepOutcome::Failed(_)))
    }

    pub fn status(&self) -> RunStatus {
        let failed = self.failed().count();
        if failed == 0 {
            RunStatus::Success
        } else if failed < self.steps.len() {
            RunStatus::Partial
        } else {
            RunStatus::Error
        }
    }

    pub fn to_response(&self) -> MigrationRunResponse {
        MigrationRunResponse {
            status: self.status(),
            migrations: self
                .steps
                .iter()
                .filter(|s| !matches!(s.outcome, StepOutcome::Failed(_)))
                .map(|s| s.to_string())
                .collect(),
            errors: self.failed().map(|s| s.to_string()).collect(),
        }
    }
}
