//! Schema reconciliation engine
//!
//! - [`canonical`]: the schema the application expects, as static descriptors
//! - [`inspector`]: what the live database actually has
//! - [`dialect`]: SQL rendering per engine
//! - [`catalog`]: ordered migration steps
//! - [`runner`]: applies steps under the migration lock
//! - [`reset`]: drop, rebuild and reseed

pub mod canonical;
pub mod catalog;
pub mod descriptor;
pub mod dialect;
pub mod inspector;
pub mod ledger;
pub mod lock;
pub mod pool;
pub mod report;
pub mod reset;
pub mod runner;
pub mod step;

pub use dialect::{Dialect, DialectKind, Statement};
pub use inspector::{SchemaInspector, SchemaSnapshot};
pub use pool::DbPool;
pub use report::{MigrationReport, MigrationRunResponse, RunStatus, SkipReason, StepOutcome};
pub use reset::{ResetController, ResetRefusal, ResetState};
pub use runner::{MigrationRunner, PlannedStep, RunOptions};
pub use step::MigrationStep;
