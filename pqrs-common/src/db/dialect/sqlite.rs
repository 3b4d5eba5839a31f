//! SQLite adapter

use super::{column_clause, create_table_statements, quote_literal, Dialect, DialectKind, Statement};
use crate::db::descriptor::{
    ColumnDescriptor, ColumnType, DefaultValue, EnumDescriptor, ForeignKeyConstraint, TableDescriptor,
};

/// SQLite: no enum types, no constraint changes after creation, no
/// `ADD COLUMN IF NOT EXISTS`
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn kind(&self) -> DialectKind {
        DialectKind::Sqlite
    }

    fn supports_enum_types(&self) -> bool {
        false
    }

    fn supports_add_column_if_not_exists(&self) -> bool {
        false
    }

    fn render_type(&self, column: &ColumnDescriptor) -> String {
        if column.primary_key && column.ty == ColumnType::Integer {
            return "INTEGER PRIMARY KEY AUTOINCREMENT".to_string();
        }
        let ty = match column.ty {
            ColumnType::Integer => "INTEGER".to_string(),
            ColumnType::Text | ColumnType::Json | ColumnType::Enum(_) => "TEXT".to_string(),
            ColumnType::Varchar(n) => format!("VARCHAR({})", n),
            ColumnType::Boolean => "BOOLEAN".to_string(),
            ColumnType::Float => "FLOAT".to_string(),
            ColumnType::Timestamp => "TIMESTAMP".to_string(),
            ColumnType::Binary => "BLOB".to_string(),
        };
        if column.primary_key {
            format!("{} PRIMARY KEY", ty)
        } else {
            ty
        }
    }

    fn render_default(&self, value: &DefaultValue) -> String {
        match value {
            DefaultValue::Bool(true) => "1".to_string(),
            DefaultValue::Bool(false) => "0".to_string(),
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

    /// UNIQUE is dropped: SQLite cannot add a UNIQUE column to an existing
    /// table. Declare a unique index instead.
    fn render_add_column(&self, table: &str, column: &ColumnDescriptor) -> Statement {
        Statement::transactional(format!(
            "ALTER TABLE {} ADD COLUMN {}",
            table,
            column_clause(self, column, false)
        ))
    }

    fn render_drop_column(&self, table: &str, column: &str) -> Statement {
        Statement::transactional(format!("ALTER TABLE {} DROP COLUMN {}", table, column))
    }

    fn render_create_enum(&self, _descriptor: &EnumDescriptor) -> Option<Statement> {
        None
    }

    fn render_add_enum_value(&self, _enum_name: &str, _label: &str) -> Option<Statement> {
        None
    }

    fn render_drop_enum(&self, _enum_name: &str) -> Option<Statement> {
        None
    }

    fn render_add_foreign_key(&self, _table: &str, _fk: &ForeignKeyConstraint) -> Option<Statement> {
        None
    }

    fn render_set_nullable(&self, _table: &str, _column: &str, _nullable: bool) -> Option<Statement> {
        None
    }
}
