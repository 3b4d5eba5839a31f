//! Dialect adapters
//!
//! Pure SQL rendering for each supported database engine. Nothing in here
//! touches a connection: adapters turn descriptors into [`Statement`]s and
//! the pool executes them. Operations a dialect cannot express return `None`
//! so callers can report them as unsupported instead of failing.

use crate::db::descriptor::{
    ColumnDescriptor, DefaultValue, EnumDescriptor, ForeignKeyConstraint, IndexDescriptor,
    TableDescriptor,
};
use crate::{Error, Result};
use serde::Serialize;
use std::fmt;

pub mod postgres;
pub mod sqlite;

pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

static POSTGRES: PostgresDialect = PostgresDialect;
static SQLITE: SqliteDialect = SqliteDialect;

/// How a statement must be executed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    /// Inside the step's transaction
    Transactional,
    /// On a dedicated connection outside any transaction
    /// (PostgreSQL `ALTER TYPE ... ADD VALUE`)
    Autocommit,
}

/// Rendered SQL statement plus its execution mode
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    pub sql: String,
    pub mode: ExecMode,
}

impl Statement {
    pub fn transactional(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            mode: ExecMode::Transactional,
        }
    }

    pub fn autocommit(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            mode: ExecMode::Autocommit,
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.mode {
            ExecMode::Transactional => write!(f, "{};", self.sql),
            ExecMode::Autocommit => write!(f, "{}; -- autocommit", self.sql),
        }
    }
}

/// Database engine selected from the connection string scheme
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DialectKind {
    Postgres,
    Sqlite,
}

impl DialectKind {
    /// Pick the dialect for a connection string
    ///
    /// `postgres://` and `postgresql://` select PostgreSQL, `sqlite:` selects
    /// SQLite. Anything else is [`Error::UnsupportedDialect`].
    pub fn from_url(url: &str) -> Result<Self> {
        let scheme = url.split(':').next().unwrap_or_default().to_ascii_lowercase();
        match scheme.as_str() {
            "postgres" | "postgresql" => Ok(DialectKind::Postgres),
            "sqlite" => Ok(DialectKind::Sqlite),
            _ => Err(Error::UnsupportedDialect(if scheme.is_empty() {
                url.to_string()
            } else {
                scheme
            })),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DialectKind::Postgres => "postgresql",
            DialectKind::Sqlite => "sqlite",
        }
    }

    /// Stateless adapter for this dialect
    pub fn adapter(&self) -> &'static dyn Dialect {
        match self {
            DialectKind::Postgres => &POSTGRES,
            DialectKind::Sqlite => &SQLITE,
        }
    }
}

impl fmt::Display for DialectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// SQL rendering contract implemented once per engine
pub trait Dialect: Send + Sync {
    fn kind(&self) -> DialectKind;

    /// Native `CREATE TYPE ... AS ENUM` support
    fn supports_enum_types(&self) -> bool;

    /// `ALTER TABLE ... ADD COLUMN IF NOT EXISTS` support. Without it the
    /// caller must re-check the column right before adding it.
    fn supports_add_column_if_not_exists(&self) -> bool;

    /// Column type as written in DDL
    fn render_type(&self, column: &ColumnDescriptor) -> String;

    /// Literal or expression for a default / backfill value
    fn render_default(&self, value: &DefaultValue) -> String;

    fn render_create_table(&self, table: &TableDescriptor) -> Vec<Statement>;

    fn render_add_column(&self, table: &str, column: &ColumnDescriptor) -> Statement;

    fn render_drop_column(&self, table: &str, column: &str) -> Statement;

    fn render_create_enum(&self, descriptor: &EnumDescriptor) -> Option<Statement>;

    fn render_add_enum_value(&self, enum_name: &str, label: &str) -> Option<Statement>;

    fn render_drop_enum(&self, enum_name: &str) -> Option<Statement>;

    fn render_add_foreign_key(&self, table: &str, fk: &ForeignKeyConstraint) -> Option<Statement>;

    fn render_set_nullable(&self, table: &str, column: &str, nullable: bool) -> Option<Statement>;

    /// Index creation is identical on both engines
    fn render_create_index(&self, table: &str, index: &IndexDescriptor) -> Statement {
        format_create_index(table, index)
    }

    /// Fill `column` where it is NULL
    fn render_backfill(&self, table: &str, column: &str, value: &DefaultValue) -> Statement {
        Statement::transactional(format!(
            "UPDATE {} SET {} = {} WHERE {} IS NULL",
            table,
            column,
            self.render_default(value),
            column
        ))
    }

    /// Insert `row` into `table` only while the table is empty and some
    /// `(table, column)` in `orphans` still holds a NULL reference
    fn render_seed_parent_row(
        &self,
        table: &str,
        row: &[(&str, DefaultValue)],
        orphans: &[(&str, &str)],
    ) -> Statement {
        let columns: Vec<&str> = row.iter().map(|(name, _)| *name).collect();
        let values: Vec<String> = row.iter().map(|(_, value)| self.render_default(value)).collect();
        let orphaned: Vec<String> = orphans
            .iter()
            .map(|(child, column)| format!("EXISTS (SELECT 1 FROM {} WHERE {} IS NULL)", child, column))
            .collect();
        Statement::transactional(format!(
            "INSERT INTO {} ({}) SELECT {} WHERE NOT EXISTS (SELECT 1 FROM {}) AND ({})",
            table,
            columns.join(", "),
            values.join(", "),
            table,
            orphaned.join(" OR ")
        ))
    }

    /// Lower-case legacy upper-case labels
    ///
    /// `native_enum` names the column's enum type when it is a native enum;
    /// the value then round-trips through text.
    fn render_normalize_labels(
        &self,
        table: &str,
        column: &str,
        descriptor: &EnumDescriptor,
        native_enum: Option<&str>,
    ) -> Statement {
        let legacy: Vec<String> = descriptor
            .legacy_labels()
            .iter()
            .map(|l| quote_literal(l))
            .collect();
        let sql = match native_enum {
            Some(type_name) => format!(
                "UPDATE {table} SET {column} = LOWER({column}::text)::{type_name} WHERE {column}::text IN ({})",
                legacy.join(", ")
            ),
            None => format!(
                "UPDATE {table} SET {column} = LOWER({column}) WHERE {column} IN ({})",
                legacy.join(", ")
            ),
        };
        Statement::transactional(sql)
    }
}

/// Single-quoted SQL string literal
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Column clause shared by CREATE TABLE and ADD COLUMN
pub(crate) fn column_clause(dialect: &dyn Dialect, column: &ColumnDescriptor, allow_unique: bool) -> String {
    let mut clause = format!("{} {}", column.name, dialect.render_type(column));
    if column.primary_key {
        return clause;
    }
    if !column.nullable {
        clause.push_str(" NOT NULL");
    }
    if let Some(default) = &column.default {
        match default {
            DefaultValue::Expr(expr) => clause.push_str(&format!(" DEFAULT ({})", expr)),
            other => clause.push_str(&format!(" DEFAULT {}", dialect.render_default(other))),
        }
    }
    if column.unique && allow_unique {
        clause.push_str(" UNIQUE");
    }
    clause
}

/// Full CREATE TABLE statement plus its indexes; constraints are inline
pub(crate) fn create_table_statements(dialect: &dyn Dialect, table: &TableDescriptor) -> Vec<Statement> {
    let mut parts: Vec<String> = table
        .columns
        .iter()
        .map(|c| column_clause(dialect, c, true))
        .collect();

    for unique in table.uniques {
        parts.push(format!(
            "CONSTRAINT {} UNIQUE ({})",
            unique.name,
            unique.columns.join(", ")
        ));
    }
    for fk in table.foreign_keys {
        parts.push(format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE {}",
            fk.name,
            fk.column,
            fk.ref_table,
            fk.ref_column,
            fk.on_delete.as_sql()
        ));
    }

    let mut statements = vec![Statement::transactional(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        table.name,
        parts.join(",\n    ")
    ))];
    statements.extend(table.indexes.iter().map(|i| format_create_index(table.name, i)));
    statements
}

fn format_create_index(table: &str, index: &IndexDescriptor) -> Statement {
    Statement::transactional(format!(
        "CREATE {}INDEX IF NOT EXISTS {} ON {} ({})",
        if index.unique { "UNIQUE " } else { "" },
        index.name,
        table,
        index.columns.join(", ")
    ))
}
