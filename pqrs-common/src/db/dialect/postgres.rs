//! PostgreSQL adapter

use super::{column_clause, create_table_statements, quote_literal, Dialect, DialectKind, Statement};
use crate::db::descriptor::{
    ColumnDescriptor, ColumnType, DefaultValue, EnumDescriptor, ForeignKeyConstraint, TableDescriptor,
};

/// PostgreSQL: native enums, `IF NOT EXISTS` on column DDL, transactional DDL
/// except `ALTER TYPE ... ADD VALUE`
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Postgres
    }

    fn supports_enum_types(&self) -> bool {
        true
    }

    fn supports_add_column_if_not_exists(&self) -> bool {
        true
    }

    fn render_type(&self, column: &ColumnDescriptor) -> String {
        if column.primary_key && column.ty == ColumnType::Integer {
            return "SERIAL PRIMARY KEY".to_string();
        }
        let ty = match column.ty {
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Text => "TEXT".to_string(),
            ColumnType::Varchar(n) => format!("VARCHAR({})", n),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Float => "DOUBLE PRECISION".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Binary => "BYTEA".to_string(),
            ColumnType::Json => "JSON".to_string(),
            ColumnType::Enum(descriptor) => descriptor.name.to_string(),
        };
        if column.primary_key {
            format!("{} PRIMARY KEY", ty)
        } else {
            ty
        }
    }

    fn render_default(&self, value: &DefaultValue) -> String {
        match value {
            DefaultValue::Bool(true) => "TRUE".to_string(),
            DefaultValue::Bool(false) => "FALSE".to_string(),
            DefaultValue::Int(n) => n.to_string(),
            DefaultValue::Float(f) => format!("{:?}", f),
            DefaultValue::Text(s) => quote_literal(s),
            DefaultValue::CurrentTimestamp => "CURRENT_TIMESTAMP".to_string(),
            DefaultValue::Expr(expr) => expr.to_string(),
        }
    }

    fn render_create_table(&self, table: &TableDescriptor) -> Vec<Statement> {
        create_table_statements(self, table)
    }

    fn render_add_column(&self, table: &str, column: &ColumnDescriptor) -> Statement {
        Statement::transactional(format!(
            "ALTER TABLE {} ADD COLUMN IF NOT EXISTS {}",
            table,
            column_clause(self, column, true)
        ))
    }

    fn render_drop_column(&self, table: &str, column: &str) -> Statement {
        Statement::transactional(format!(
            "ALTER TABLE {} DROP COLUMN IF EXISTS {} CASCADE",
            table, column
        ))
    }

    fn render_create_enum(&self, descriptor: &EnumDescriptor) -> Option<Statement> {
        let labels: Vec<String> = descriptor.labels.iter().map(|l| quote_literal(l)).collect();
        Some(Statement::transactional(format!(
            "CREATE TYPE {} AS ENUM ({})",
            descriptor.name,
            labels.join(", ")
        )))
    }

    fn render_add_enum_value(&self, enum_name: &str, label: &str) -> Option<Statement> {
        Some(Statement::autocommit(format!(
            "ALTER TYPE {} ADD VALUE IF NOT EXISTS {}",
            enum_name,
            quote_literal(label)
        )))
    }

    fn render_drop_enum(&self, enum_name: &str) -> Option<Statement> {
        Some(Statement::transactional(format!("DROP TYPE IF EXISTS {}", enum_name)))
    }

    fn render_add_foreign_key(&self, table: &str, fk: &ForeignKeyConstraint) -> Option<Statement> {
        Some(Statement::transactional(format!(
            "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE {}",
            table,
            fk.name,
            fk.column,
            fk.ref_table,
            fk.ref_column,
            fk.on_delete.as_sql()
        )))
    }

    fn render_set_nullable(&self, table: &str, column: &str, nullable: bool) -> Option<Statement> {
        Some(Statement::transactional(format!(
            "ALTER TABLE {} ALTER COLUMN {} {} NOT NULL",
            table,
            column,
            if nullable { "DROP" } else { "SET" }
        )))
    }
}
