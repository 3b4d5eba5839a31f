//! Migration steps
//!
//! A step is one idempotent schema or data correction. Its precondition is a
//! pure function of the schema snapshot (and, for data steps, of whether the
//! ledger already records it); rendering is a pure function of the snapshot
//! and the dialect. Execution belongs to the runner.

use crate::db::descriptor::{
    ColumnDescriptor, ColumnType, DefaultValue, EnumDescriptor, ForeignKeyConstraint, IndexDescriptor,
    TableDescriptor,
};
use crate::db::dialect::{Dialect, Statement};
use crate::db::inspector::SchemaSnapshot;
use crate::db::report::SkipReason;

/// What a step changes
#[derive(Debug, Clone, PartialEq)]
pub enum StepKind {
    CreateTable(&'static TableDescriptor),
    /// Column must be nullable or carry a default
    AddColumn {
        table: &'static str,
        column: ColumnDescriptor,
    },
    CreateIndex {
        table: &'static str,
        index: IndexDescriptor,
    },
    /// Create the enum type, or add whichever labels it lacks
    CreateOrExtendEnum(&'static EnumDescriptor),
    /// Drop the dependent column, drop and recreate the type with the
    /// canonical labels, recreate the column `NOT NULL DEFAULT <first label>`.
    /// Destroys the column's data.
    RepairEnumCasing {
        descriptor: &'static EnumDescriptor,
        table: &'static str,
        column: &'static str,
    },
    AddForeignKey {
        table: &'static str,
        fk: ForeignKeyConstraint,
    },
    /// `UPDATE table SET column = value WHERE column IS NULL`
    Backfill {
        table: &'static str,
        column: &'static str,
        value: DefaultValue,
    },
    SetNullable {
        table: &'static str,
        column: &'static str,
        nullable: bool,
    },
    /// Lower-case legacy upper-case labels stored in `column`
    NormalizeLabels {
        table: &'static str,
        column: &'static str,
        descriptor: &'static EnumDescriptor,
    },
    /// Insert `row` into an empty `table` while any `(table, column)` in
    /// `orphans` still holds NULL, so a following backfill has a target
    SeedParentRow {
        table: &'static str,
        row: &'static [(&'static str, DefaultValue)],
        orphans: &'static [(&'static str, &'static str)],
    },
}

/// Result of evaluating a step against a snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Precondition {
    Needed,
    Satisfied,
    Skip(SkipReason),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MigrationStep {
    pub id: &'static str,
    pub kind: StepKind,
    pub destructive: bool,
    /// Id of the step that replaces this historical variant; superseded
    /// steps are kept for the record and never executed
    pub superseded_by: Option<&'static str>,
}

impl MigrationStep {
    pub const fn new(id: &'static str, kind: StepKind) -> Self {
        Self {
            id,
            kind,
            destructive: false,
            superseded_by: None,
        }
    }

    pub const fn create_table(id: &'static str, table: &'static TableDescriptor) -> Self {
        Self::new(id, StepKind::CreateTable(table))
    }

    pub const fn add_column(id: &'static str, table: &'static str, column: ColumnDescriptor) -> Self {
        Self::new(id, StepKind::AddColumn { table, column })
    }

    pub const fn create_index(id: &'static str, table: &'static str, index: IndexDescriptor) -> Self {
        Self::new(id, StepKind::CreateIndex { table, index })
    }

    pub const fn create_or_extend_enum(id: &'static str, descriptor: &'static EnumDescriptor) -> Self {
        Self::new(id, StepKind::CreateOrExtendEnum(descriptor))
    }

    /// Always destructive
    pub const fn repair_enum_casing(
        id: &'static str,
        descriptor: &'static EnumDescriptor,
        table: &'static str,
        column: &'static str,
    ) -> Self {
        Self::new(id, StepKind::RepairEnumCasing { descriptor, table, column }).destructive()
    }

    pub const fn add_foreign_key(id: &'static str, table: &'static str, fk: ForeignKeyConstraint) -> Self {
        Self::new(id, StepKind::AddForeignKey { table, fk })
    }

    pub const fn backfill(id: &'static str, table: &'static str, column: &'static str, value: DefaultValue) -> Self {
        Self::new(id, StepKind::Backfill { table, column, value })
    }

    pub const fn set_nullable(id: &'static str, table: &'static str, column: &'static str, nullable: bool) -> Self {
        Self::new(id, StepKind::SetNullable { table, column, nullable })
    }

    pub const fn normalize_labels(
        id: &'static str,
        table: &'static str,
        column: &'static str,
        descriptor: &'static EnumDescriptor,
    ) -> Self {
        Self::new(id, StepKind::NormalizeLabels { table, column, descriptor })
    }

    pub const fn seed_parent_row(
        id: &'static str,
        table: &'static str,
        row: &'static [(&'static str, DefaultValue)],
        orphans: &'static [(&'static str, &'static str)],
    ) -> Self {
        Self::new(id, StepKind::SeedParentRow { table, row, orphans })
    }

    pub const fn destructive(self) -> Self {
        Self {
            destructive: true,
            ..self
        }
    }

    pub const fn superseded_by(self, id: &'static str) -> Self {
        Self {
            superseded_by: Some(id),
            ..self
        }
    }

    /// Data steps cannot be decided from schema shape; the ledger decides
    pub fn is_data_step(&self) -> bool {
        matches!(
            self.kind,
            StepKind::Backfill { .. } | StepKind::NormalizeLabels { .. } | StepKind::SeedParentRow { .. }
        )
    }

    /// `table` or `table.column` this step acts on, for logs
    pub fn target(&self) -> String {
        match &self.kind {
            StepKind::CreateTable(table) => table.name.to_string(),
            StepKind::AddColumn { table, column } => format!("{}.{}", table, column.name),
            StepKind::CreateIndex { table, index } => format!("{}({})", table, index.name),
            StepKind::CreateOrExtendEnum(descriptor) => descriptor.name.to_string(),
            StepKind::RepairEnumCasing { descriptor, table, column } => {
                format!("{} on {}.{}", descriptor.name, table, column)
            }
            StepKind::AddForeignKey { table, fk } => format!("{}.{}", table, fk.column),
            StepKind::Backfill { table, column, .. }
            | StepKind::SetNullable { table, column, .. }
            | StepKind::NormalizeLabels { table, column, .. } => format!("{}.{}", table, column),
            StepKind::SeedParentRow { table, .. } => table.to_string(),
        }
    }

    /// Decide whether this step still has work to do
    ///
    /// `in_ledger` is only consulted for data steps.
    pub fn evaluate(&self, snapshot: &SchemaSnapshot, dialect: &dyn Dialect, in_ledger: bool) -> Precondition {
        match &self.kind {
            StepKind::CreateTable(table) => {
                if snapshot.table_exists(table.name) {
                    return Precondition::Satisfied;
                }
                if dialect.supports_enum_types()
                    && table.enum_types().any(|e| !snapshot.enum_exists(e.name))
                {
                    return Precondition::Skip(SkipReason::TargetMissing);
                }
                Precondition::Needed
            }
            StepKind::AddColumn { table, column } => {
                if !snapshot.table_exists(table) {
                    return Precondition::Skip(SkipReason::TargetMissing);
                }
                if snapshot.has_column(table, column.name) {
                    return Precondition::Satisfied;
                }
                if let Some(descriptor) = column.ty.enum_descriptor() {
                    if dialect.supports_enum_types() && !snapshot.enum_exists(descriptor.name) {
                        return Precondition::Skip(SkipReason::TargetMissing);
                    }
                }
                Precondition::Needed
            }
            StepKind::CreateIndex { table, index } => {
                if !snapshot.table_exists(table) {
                    return Precondition::Skip(SkipReason::TargetMissing);
                }
                if snapshot.has_index(table, index.name) {
                    return Precondition::Satisfied;
                }
                Precondition::Needed
            }
            StepKind::CreateOrExtendEnum(descriptor) => {
                if !dialect.supports_enum_types() {
                    // Stored as TEXT; nothing to create
                    return Precondition::Satisfied;
                }
                if !snapshot.enum_exists(descriptor.name) {
                    return Precondition::Needed;
                }
                if descriptor.missing_labels(snapshot.enum_labels(descriptor.name)).is_empty() {
                    Precondition::Satisfied
                } else {
                    Precondition::Needed
                }
            }
            StepKind::RepairEnumCasing { descriptor, table, column } => {
                if !dialect.supports_enum_types() {
                    return Precondition::Satisfied;
                }
                if !snapshot.enum_exists(descriptor.name) || !snapshot.table_exists(table) {
                    return Precondition::Skip(SkipReason::TargetMissing);
                }
                let labels = snapshot.enum_labels(descriptor.name);
                let column_ok = snapshot
                    .column(table, column)
                    .map(|c| c.enum_type.as_deref() == Some(descriptor.name))
                    .unwrap_or(false);
                if descriptor.is_miscased(labels) || !column_ok {
                    Precondition::Needed
                } else {
                    Precondition::Satisfied
                }
            }
            StepKind::AddForeignKey { table, fk } => {
                if !snapshot.has_column(table, fk.column) || !snapshot.table_exists(fk.ref_table) {
                    return Precondition::Skip(SkipReason::TargetMissing);
                }
                if snapshot.has_foreign_key(table, fk.column, fk.ref_table) {
                    return Precondition::Satisfied;
                }
                if dialect.render_add_foreign_key(table, fk).is_none() {
                    return Precondition::Skip(SkipReason::UnsupportedByDialect);
                }
                Precondition::Needed
            }
            StepKind::SetNullable { table, column, nullable } => {
                let Some(info) = snapshot.column(table, column) else {
                    return Precondition::Skip(SkipReason::TargetMissing);
                };
                if info.nullable == *nullable {
                    return Precondition::Satisfied;
                }
                if dialect.render_set_nullable(table, column, *nullable).is_none() {
                    return Precondition::Skip(SkipReason::UnsupportedByDialect);
                }
                Precondition::Needed
            }
            StepKind::Backfill { table, column, .. } | StepKind::NormalizeLabels { table, column, .. } => {
                if !snapshot.has_column(table, column) {
                    return Precondition::Skip(SkipReason::TargetMissing);
                }
                if in_ledger {
                    Precondition::Satisfied
                } else {
                    Precondition::Needed
                }
            }
            StepKind::SeedParentRow { table, row, orphans } => {
                if !snapshot.table_exists(table) || row.iter().any(|(column, _)| !snapshot.has_column(table, column)) {
                    return Precondition::Skip(SkipReason::TargetMissing);
                }
                if !orphans.iter().any(|(child, column)| snapshot.has_column(child, column)) {
                    return Precondition::Skip(SkipReason::TargetMissing);
                }
                if in_ledger {
                    Precondition::Satisfied
                } else {
                    Precondition::Needed
                }
            }
        }
    }

    /// Statements that bring the database from `snapshot` to this step's
    /// target, in execution order. Empty when the dialect cannot express the
    /// change; `evaluate` reports that case before rendering.
    pub fn render(&self, snapshot: &SchemaSnapshot, dialect: &dyn Dialect) -> Vec<Statement> {
        match &self.kind {
            StepKind::CreateTable(table) => dialect.render_create_table(table),
            StepKind::AddColumn { table, column } => vec![dialect.render_add_column(table, column)],
            StepKind::CreateIndex { table, index } => vec![dialect.render_create_index(table, index)],
            StepKind::CreateOrExtendEnum(descriptor) => {
                if !snapshot.enum_exists(descriptor.name) {
                    return dialect.render_create_enum(descriptor).into_iter().collect();
                }
                descriptor
                    .missing_labels(snapshot.enum_labels(descriptor.name))
                    .into_iter()
                    .filter_map(|label| dialect.render_add_enum_value(descriptor.name, label))
                    .collect()
            }
            StepKind::RepairEnumCasing { descriptor, table, column } => {
                let (Some(create), Some(drop)) = (
                    dialect.render_create_enum(descriptor),
                    dialect.render_drop_enum(descriptor.name),
                ) else {
                    return Vec::new();
                };
                vec![
                    dialect.render_drop_column(table, column),
                    drop,
                    create,
                    dialect.render_add_column(table, &repaired_column(descriptor, column)),
                ]
            }
            StepKind::AddForeignKey { table, fk } => dialect.render_add_foreign_key(table, fk).into_iter().collect(),
            StepKind::Backfill { table, column, value } => vec![dialect.render_backfill(table, column, value)],
            StepKind::SetNullable { table, column, nullable } => {
                dialect.render_set_nullable(table, column, *nullable).into_iter().collect()
            }
            StepKind::NormalizeLabels { table, column, descriptor } => {
                let native = snapshot.column(table, column).and_then(|c| c.enum_type.as_deref());
                vec![dialect.render_normalize_labels(table, column, descriptor, native)]
            }
            StepKind::SeedParentRow { table, row, orphans } => {
                let present: Vec<(&str, &str)> = orphans
                    .iter()
                    .copied()
                    .filter(|(child, column)| snapshot.has_column(child, column))
                    .collect();
                if present.is_empty() {
                    return Vec::new();
                }
                vec![dialect.render_seed_parent_row(table, row, &present)]
            }
        }
    }

    /// Fold this step's effect into the snapshot after a successful apply
    pub fn record_effect(&self, snapshot: &mut SchemaSnapshot, dialect: &dyn Dialect) {
        match &self.kind {
            StepKind::CreateTable(table) => snapshot.record_table(table, dialect),
            StepKind::AddColumn { table, column } => snapshot.record_column(table, column, dialect),
            StepKind::CreateIndex { table, index } => snapshot.record_index(table, index),
            StepKind::CreateOrExtendEnum(descriptor) => {
                if dialect.supports_enum_types() {
                    let mut labels = snapshot.enum_labels(descriptor.name).to_vec();
                    labels.extend(
                        descriptor
                            .missing_labels(&labels)
                            .into_iter()
                            .map(str::to_string),
                    );
                    snapshot.record_enum(descriptor.name, labels);
                }
            }
            StepKind::RepairEnumCasing { descriptor, table, column } => {
                snapshot.record_enum(
                    descriptor.name,
                    descriptor.labels.iter().map(|l| l.to_string()).collect(),
                );
                snapshot.record_dropped_column(table, column);
                snapshot.record_column(table, &repaired_column(descriptor, column), dialect);
            }
            StepKind::AddForeignKey { table, fk } => snapshot.record_foreign_key(table, fk),
            StepKind::SetNullable { table, column, nullable } => snapshot.record_nullable(table, column, *nullable),
            StepKind::Backfill { .. } | StepKind::NormalizeLabels { .. } | StepKind::SeedParentRow { .. } => {}
        }
    }
}

fn repaired_column(descriptor: &'static EnumDescriptor, column: &'static str) -> ColumnDescriptor {
    let recreated = ColumnDescriptor::new(column, ColumnType::Enum(descriptor));
    match descriptor.first_label() {
        Some(label) => recreated.not_null().default(DefaultValue::Text(label)),
        None => recreated,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::canonical;
    use crate::db::dialect::{DialectKind, ExecMode, PostgresDialect, SqliteDialect};
    use crate::db::inspector::ColumnInfo;

    fn pg_snapshot_with_legacy_tipo() -> SchemaSnapshot {
        let mut snapshot = SchemaSnapshot::empty(DialectKind::Postgres);
        for descriptor in canonical::ENUMS {
            snapshot.record_enum(descriptor.name, descriptor.labels.iter().map(|l| l.to_string()).collect());
        }
        snapshot.record_table(&canonical::ENTITIES, &PostgresDialect);
        snapshot.record_table(&canonical::USERS, &PostgresDialect);
        snapshot.record_table(&canonical::PQRS, &PostgresDialect);
        snapshot.record_enum(
            "tiposolicitud",
            vec!["PETICION".into(), "QUEJA".into(), "RECLAMO".into(), "SUGERENCIA".into()],
        );
        snapshot
    }

    #[test]
    fn test_add_column_preconditions() {
        let step = MigrationStep::add_column(
            "add_entities_nit",
            "entities",
            ColumnDescriptor::new("nit", ColumnType::Varchar(50)),
        );

        let empty = SchemaSnapshot::empty(DialectKind::Sqlite);
        assert_eq!(
            step.evaluate(&empty, &SqliteDialect, false),
            Precondition::Skip(SkipReason::TargetMissing)
        );

        let mut snapshot = SchemaSnapshot::empty(DialectKind::Sqlite);
        snapshot.tables.insert("entities".into(), Default::default());
        assert_eq!(step.evaluate(&snapshot, &SqliteDialect, false), Precondition::Needed);

        step.record_effect(&mut snapshot, &SqliteDialect);
        assert_eq!(step.evaluate(&snapshot, &SqliteDialect, false), Precondition::Satisfied);
    }

    #[test]
    fn test_enum_extension_renders_autocommit_values() {
        let mut snapshot = SchemaSnapshot::empty(DialectKind::Postgres);
        snapshot.record_enum("userrole", vec!["ADMIN".into(), "SECRETARIO".into(), "CIUDADANO".into()]);

        let step = MigrationStep::create_or_extend_enum("extend_userrole", &canonical::USER_ROLE);
        assert_eq!(step.evaluate(&snapshot, &PostgresDialect, false), Precondition::Needed);

        let statements = step.render(&snapshot, &PostgresDialect);
        assert_eq!(statements.len(), 4);
        assert!(statements.iter().all(|s| s.mode == ExecMode::Autocommit));
        assert_eq!(statements[0].sql, "ALTER TYPE userrole ADD VALUE IF NOT EXISTS 'superadmin'");

        step.record_effect(&mut snapshot, &PostgresDialect);
        assert_eq!(step.evaluate(&snapshot, &PostgresDialect, false), Precondition::Satisfied);
    }

    #[test]
    fn test_enum_steps_are_satisfied_on_sqlite() {
        let snapshot = SchemaSnapshot::empty(DialectKind::Sqlite);
        let create = MigrationStep::create_or_extend_enum("create_tiposolicitud", &canonical::TIPO_SOLICITUD);
        let repair = MigrationStep::repair_enum_casing(
            "repair_tiposolicitud",
            &canonical::TIPO_SOLICITUD,
            "pqrs",
            "tipo_solicitud",
        );
        assert_eq!(create.evaluate(&snapshot, &SqliteDialect, false), Precondition::Satisfied);
        assert_eq!(repair.evaluate(&snapshot, &SqliteDialect, false), Precondition::Satisfied);
    }

    #[test]
    fn test_repair_detects_and_renders_casing_fix() {
        let mut snapshot = pg_snapshot_with_legacy_tipo();
        let step = MigrationStep::repair_enum_casing(
            "repair_tiposolicitud",
            &canonical::TIPO_SOLICITUD,
            "pqrs",
            "tipo_solicitud",
        );
        assert!(step.destructive);
        assert_eq!(step.evaluate(&snapshot, &PostgresDialect, false), Precondition::Needed);

        let sql: Vec<String> = step.render(&snapshot, &PostgresDialect).into_iter().map(|s| s.sql).collect();
        assert_eq!(
            sql,
            vec![
                "ALTER TABLE pqrs DROP COLUMN IF EXISTS tipo_solicitud CASCADE".to_string(),
                "DROP TYPE IF EXISTS tiposolicitud".to_string(),
                "CREATE TYPE tiposolicitud AS ENUM ('peticion', 'queja', 'reclamo', 'sugerencia')".to_string(),
                "ALTER TABLE pqrs ADD COLUMN IF NOT EXISTS tipo_solicitud tiposolicitud NOT NULL DEFAULT 'peticion'"
                    .to_string(),
            ]
        );

        step.record_effect(&mut snapshot, &PostgresDialect);
        assert_eq!(step.evaluate(&snapshot, &PostgresDialect, false), Precondition::Satisfied);
    }

    #[test]
    fn test_constraint_steps_unsupported_on_sqlite() {
        let mut snapshot = SchemaSnapshot::empty(DialectKind::Sqlite);
        snapshot.tables.insert("entities".into(), Default::default());
        snapshot.tables.insert(
            "pqrs".into(),
            crate::db::inspector::TableInfo {
                columns: vec![
                    ColumnInfo {
                        name: "entity_id".into(),
                        data_type: "INTEGER".into(),
                        nullable: true,
                        default: None,
                        enum_type: None,
                    },
                    ColumnInfo {
                        name: "asunto".into(),
                        data_type: "VARCHAR(300)".into(),
                        nullable: false,
                        default: None,
                        enum_type: None,
                    },
                ],
                ..Default::default()
            },
        );

        let fk = MigrationStep::add_foreign_key("fk_pqrs_entity", "pqrs", canonical::PQRS.foreign_keys[0]);
        let relax = MigrationStep::set_nullable("relax_asunto", "pqrs", "asunto", true);
        assert_eq!(
            fk.evaluate(&snapshot, &SqliteDialect, false),
            Precondition::Skip(SkipReason::UnsupportedByDialect)
        );
        assert_eq!(
            relax.evaluate(&snapshot, &SqliteDialect, false),
            Precondition::Skip(SkipReason::UnsupportedByDialect)
        );

        let mut pg = snapshot.clone();
        pg.dialect = DialectKind::Postgres;
        assert_eq!(fk.evaluate(&pg, &PostgresDialect, false), Precondition::Needed);
        assert_eq!(relax.evaluate(&pg, &PostgresDialect, false), Precondition::Needed);
    }

    #[test]
    fn test_data_steps_follow_ledger() {
        let mut snapshot = SchemaSnapshot::empty(DialectKind::Sqlite);
        snapshot.record_table(&canonical::ENTITIES, &SqliteDialect);
        let step = MigrationStep::backfill("backfill_pdm", "entities", "enable_pdm", DefaultValue::Bool(true));

        assert!(step.is_data_step());
        assert_eq!(step.evaluate(&snapshot, &SqliteDialect, false), Precondition::Needed);
        assert_eq!(step.evaluate(&snapshot, &SqliteDialect, true), Precondition::Satisfied);

        let missing = MigrationStep::backfill("backfill_x", "entities", "nope", DefaultValue::Int(0));
        assert_eq!(
            missing.evaluate(&snapshot, &SqliteDialect, false),
            Precondition::Skip(SkipReason::TargetMissing)
        );
    }

    #[test]
    fn test_seed_parent_row_needs_an_orphan_column() {
        let step = MigrationStep::seed_parent_row(
            "seed_default",
            "entities",
            &[("name", DefaultValue::Text("Entidad Principal")), ("code", DefaultValue::Text("DEFAULT"))],
            &[("pqrs", "entity_id"), ("planes_institucionales", "entity_id")],
        );
        assert!(step.is_data_step());

        let mut snapshot = SchemaSnapshot::empty(DialectKind::Sqlite);
        snapshot.record_table(&canonical::ENTITIES, &SqliteDialect);
        assert_eq!(
            step.evaluate(&snapshot, &SqliteDialect, false),
            Precondition::Skip(SkipReason::TargetMissing)
        );

        snapshot.record_table(&canonical::PQRS, &SqliteDialect);
        assert_eq!(step.evaluate(&snapshot, &SqliteDialect, false), Precondition::Needed);
        assert_eq!(step.evaluate(&snapshot, &SqliteDialect, true), Precondition::Satisfied);

        let sql = &step.render(&snapshot, &SqliteDialect)[0].sql;
        assert!(sql.contains("EXISTS (SELECT 1 FROM pqrs WHERE entity_id IS NULL)"));
        assert!(!sql.contains("planes_institucionales"));
    }

    #[test]
    fn test_create_table_waits_for_enum_types() {
        let snapshot = SchemaSnapshot::empty(DialectKind::Postgres);
        let step = MigrationStep::create_table("create_users", &canonical::USERS);
        assert_eq!(
            step.evaluate(&snapshot, &PostgresDialect, false),
            Precondition::Skip(SkipReason::TargetMissing)
        );
        assert_eq!(step.evaluate(&SchemaSnapshot::empty(DialectKind::Sqlite), &SqliteDialect, false), Precondition::Needed);
    }
}
