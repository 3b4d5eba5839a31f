//! Schema Inspector
//!
//! Read-only introspection of the live database. Absent objects come back as
//! `false` or empty collections; only connection-class failures are errors.
//!
//! - PostgreSQL: `information_schema` plus `pg_catalog`
//! - SQLite: `sqlite_master` plus `PRAGMA table_info / index_list /
//!   foreign_key_list`

use crate::db::descriptor::{ColumnDescriptor, ForeignKeyConstraint, IndexDescriptor, TableDescriptor};
use crate::db::dialect::{Dialect, DialectKind};
use crate::db::pool::DbPool;
use crate::Result;
use serde::Serialize;
use sqlx::Row;
use std::collections::BTreeMap;

/// Column as reported by the database
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Engine type name (`integer`, `USER-DEFINED`, `VARCHAR(50)`...)
    pub data_type: String,
    pub nullable: bool,
    pub default: Option<String>,
    /// Enum type name for native enum columns (PostgreSQL only)
    pub enum_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ForeignKeyInfo {
    /// SQLite does not report constraint names
    pub name: Option<String>,
    pub column: String,
    pub ref_table: String,
    pub ref_column: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TableInfo {
    pub columns: Vec<ColumnInfo>,
    pub indexes: Vec<IndexInfo>,
    pub foreign_keys: Vec<ForeignKeyInfo>,
}

impl TableInfo {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }
}

/// Point-in-time view of the schema, taken once per run
///
/// The runner folds the effect of every applied step back into the snapshot
/// so later steps see it without re-inspecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SchemaSnapshot {
    pub dialect: DialectKind,
    pub tables: BTreeMap<String, TableInfo>,
    /// Enum type name to labels in sort order (always empty on SQLite)
    pub enums: BTreeMap<String, Vec<String>>,
}

impl SchemaSnapshot {
    pub fn empty(dialect: DialectKind) -> Self {
        Self {
            dialect,
            tables: BTreeMap::new(),
            enums: BTreeMap::new(),
        }
    }

    pub fn table(&self, name: &str) -> Option<&TableInfo> {
        self.tables.get(name)
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.tables.contains_key(name)
    }

    pub fn column(&self, table: &str, column: &str) -> Option<&ColumnInfo> {
        self.table(table).and_then(|t| t.column(column))
    }

    pub fn has_column(&self, table: &str, column: &str) -> bool {
        self.column(table, column).is_some()
    }

    pub fn enum_exists(&self, name: &str) -> bool {
        self.enums.contains_key(name)
    }

    /// Labels of an enum type; empty when the type does not exist
    pub fn enum_labels(&self, name: &str) -> &[String] {
        self.enums.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn has_index(&self, table: &str, index: &str) -> bool {
        self.table(table)
            .map(|t| t.indexes.iter().any(|i| i.name == index))
            .unwrap_or(false)
    }

    /// Any foreign key on `table.column` pointing at `ref_table`
    pub fn has_foreign_key(&self, table: &str, column: &str, ref_table: &str) -> bool {
        self.table(table)
            .map(|t| {
                t.foreign_keys
                    .iter()
                    .any(|fk| fk.column == column && fk.ref_table == ref_table)
            })
            .unwrap_or(false)
    }

    // ------------------------------------------------------------------------
    // Effects of applied steps
    // ------------------------------------------------------------------------

    pub fn record_table(&mut self, table: &TableDescriptor, dialect: &dyn Dialect) {
        let info = TableInfo {
            columns: table.columns.iter().map(|c| column_info(c, dialect)).collect(),
            indexes: table
                .indexes
                .iter()
                .map(|i| IndexInfo {
                    name: i.name.to_string(),
                    unique: i.unique,
                })
                .collect(),
            foreign_keys: table.foreign_keys.iter().map(foreign_key_info).collect(),
        };
        self.tables.entry(table.name.to_string()).or_insert(info);
    }

    pub fn record_column(&mut self, table: &str, column: &ColumnDescriptor, dialect: &dyn Dialect) {
        if let Some(info) = self.tables.get_mut(table) {
            if info.column(column.name).is_none() {
                info.columns.push(column_info(column, dialect));
            }
        }
    }

    pub fn record_dropped_column(&mut self, table: &str, column: &str) {
        if let Some(info) = self.tables.get_mut(table) {
            info.columns.retain(|c| c.name != column);
        }
    }

    pub fn record_index(&mut self, table: &str, index: &IndexDescriptor) {
        if let Some(info) = self.tables.get_mut(table) {
            if !info.indexes.iter().any(|i| i.name == index.name) {
                info.indexes.push(IndexInfo {
                    name: index.name.to_string(),
                    unique: index.unique,
                });
            }
        }
    }

    pub fn record_foreign_key(&mut self, table: &str, fk: &ForeignKeyConstraint) {
        if let Some(info) = self.tables.get_mut(table) {
            info.foreign_keys.push(foreign_key_info(fk));
        }
    }

    pub fn record_nullable(&mut self, table: &str, column: &str, nullable: bool) {
        if let Some(col) = self
            .tables
            .get_mut(table)
            .and_then(|t| t.columns.iter_mut().find(|c| c.name == column))
        {
            col.nullable = nullable;
        }
    }

    pub fn record_enum(&mut self, name: &str, labels: Vec<String>) {
        self.enums.insert(name.to_string(), labels);
    }
}

fn column_info(column: &ColumnDescriptor, dialect: &dyn Dialect) -> ColumnInfo {
    let enum_type = if dialect.supports_enum_types() {
        column.ty.enum_descriptor().map(|e| e.name.to_string())
    } else {
        None
    };
    ColumnInfo {
        name: column.name.to_string(),
        data_type: dialect.render_type(column),
        nullable: column.nullable,
        default: column.default.as_ref().map(|d| dialect.render_default(d)),
        enum_type,
    }
}

fn foreign_key_info(fk: &ForeignKeyConstraint) -> ForeignKeyInfo {
    ForeignKeyInfo {
        name: Some(fk.name.to_string()),
        column: fk.column.to_string(),
        ref_table: fk.ref_table.to_string(),
        ref_column: Some(fk.ref_column.to_string()),
    }
}

/// Live schema reader bound to one database handle
pub struct SchemaInspector<'a> {
    db: &'a DbPool,
}

impl<'a> SchemaInspector<'a> {
    pub fn new(db: &'a DbPool) -> Self {
        Self { db }
    }

    pub async fn table_exists(&self, table: &str) -> Result<bool> {
        let exists = match self.db {
            DbPool::Postgres(pool) => {
                sqlx::query_scalar::<_, bool>(
                    r#"
                    SELECT EXISTS(
                        SELECT 1 FROM information_schema.tables
                        WHERE table_schema = current_schema() AND table_name = $1
                    )
                    "#,
                )
                .bind(table)
                .fetch_one(pool)
                .await?
            }
            DbPool::Sqlite(handle) => {
                sqlx::query_scalar::<_, bool>(
                    r#"
                    SELECT EXISTS(
                        SELECT 1 FROM sqlite_master
                        WHERE type = 'table' AND name = ?
                    )
                    "#,
                )
                .bind(table)
                .fetch_one(&handle.pool)
                .await?
            }
        };
        Ok(exists)
    }

    /// User tables, sorted by name
    pub async fn list_tables(&self) -> Result<Vec<String>> {
        let tables = match self.db {
            DbPool::Postgres(pool) => {
                sqlx::query_scalar::<_, String>(
                    r#"
                    SELECT table_name::text FROM information_schema.tables
                    WHERE table_schema = current_schema() AND table_type = 'BASE TABLE'
                    ORDER BY table_name
                    "#,
                )
                .fetch_all(pool)
                .await?
            }
            DbPool::Sqlite(handle) => {
                sqlx::query_scalar::<_, String>(
                    r#"
                    SELECT name FROM sqlite_master
                    WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
                    ORDER BY name
                    "#,
                )
                .fetch_all(&handle.pool)
                .await?
            }
        };
        Ok(tables)
    }

    /// Columns in declaration order; empty when the table does not exist
    pub async fn columns_of(&self, table: &str) -> Result<Vec<ColumnInfo>> {
        match self.db {
            DbPool::Postgres(pool) => {
                let rows = sqlx::query(
                    r#"
                    SELECT column_name::text AS name,
                           data_type::text AS data_type,
                           is_nullable::text AS is_nullable,
                           column_default::text AS column_default,
                           udt_name::text AS udt_name
                    FROM information_schema.columns
                    WHERE table_schema = current_schema() AND table_name = $1
                    ORDER BY ordinal_position
                    "#,
                )
                .bind(table)
                .fetch_all(pool)
                .await?;

                rows.iter()
                    .map(|row| {
                        let data_type: String = row.try_get("data_type")?;
                        let udt_name: String = row.try_get("udt_name")?;
                        let is_nullable: String = row.try_get("is_nullable")?;
                        Ok(ColumnInfo {
                            name: row.try_get("name")?,
                            enum_type: (data_type == "USER-DEFINED").then_some(udt_name),
                            data_type,
                            nullable: is_nullable == "YES",
                            default: row.try_get("column_default")?,
                        })
                    })
                    .collect()
            }
            DbPool::Sqlite(handle) => {
                let rows = sqlx::query(&format!("PRAGMA table_info({})", table))
                    .fetch_all(&handle.pool)
                    .await?;

                let mut columns = rows
                    .iter()
                    .map(|row| {
                        let not_null: i32 = row.try_get("notnull")?;
                        let pk: i32 = row.try_get("pk")?;
                        Ok((
                            row.try_get::<i32, _>("cid")?,
                            ColumnInfo {
                                name: row.try_get("name")?,
                                data_type: row.try_get("type")?,
                                nullable: not_null == 0 && pk == 0,
                                default: row.try_get("dflt_value")?,
                                enum_type: None,
                            },
                        ))
                    })
                    .collect::<Result<Vec<_>>>()?;
                columns.sort_by_key(|(cid, _)| *cid);
                Ok(columns.into_iter().map(|(_, c)| c).collect())
            }
        }
    }

    /// Labels of a native enum type in sort order; empty when absent and
    /// always empty on SQLite
    pub async fn enum_labels(&self, enum_name: &str) -> Result<Vec<String>> {
        match self.db {
            DbPool::Postgres(pool) => Ok(sqlx::query_scalar::<_, String>(
                r#"
                SELECT e.enumlabel::text
                FROM pg_type t
                JOIN pg_enum e ON e.enumtypid = t.oid
                JOIN pg_namespace n ON n.oid = t.typnamespace
                WHERE t.typname = $1 AND n.nspname = current_schema()
                ORDER BY e.enumsortorder
                "#,
            )
            .bind(enum_name)
            .fetch_all(pool)
            .await?),
            DbPool::Sqlite(_) => Ok(Vec::new()),
        }
    }

    /// Every native enum type with its labels
    pub async fn list_enums(&self) -> Result<BTreeMap<String, Vec<String>>> {
        let mut enums: BTreeMap<String, Vec<String>> = BTreeMap::new();
        if let DbPool::Postgres(pool) = self.db {
            let rows = sqlx::query(
                r#"
                SELECT t.typname::text AS type_name, e.enumlabel::text AS label
                FROM pg_type t
                JOIN pg_enum e ON e.enumtypid = t.oid
                JOIN pg_namespace n ON n.oid = t.typnamespace
                WHERE n.nspname = current_schema()
                ORDER BY t.typname, e.enumsortorder
                "#,
            )
            .fetch_all(pool)
            .await?;
            for row in rows {
                let type_name: String = row.try_get("type_name")?;
                let label: String = row.try_get("label")?;
                enums.entry(type_name).or_default().push(label);
            }
        }
        Ok(enums)
    }

    pub async fn indexes_of(&self, table: &str) -> Result<Vec<IndexInfo>> {
        match self.db {
            DbPool::Postgres(pool) => {
                let rows = sqlx::query(
                    r#"
                    SELECT indexname::text AS name, indexdef
                    FROM pg_indexes
                    WHERE schemaname = current_schema() AND tablename = $1
                    ORDER BY indexname
                    "#,
                )
                .bind(table)
                .fetch_all(pool)
                .await?;
                rows.iter()
                    .map(|row| {
                        let def: String = row.try_get("indexdef")?;
                        Ok(IndexInfo {
                            name: row.try_get("name")?,
                            unique: def.contains("UNIQUE INDEX"),
                        })
                    })
                    .collect()
            }
            DbPool::Sqlite(handle) => {
                let rows = sqlx::query(&format!("PRAGMA index_list({})", table))
                    .fetch_all(&handle.pool)
                    .await?;
                rows.iter()
                    .map(|row| {
                        let unique: i32 = row.try_get("unique")?;
                        Ok(IndexInfo {
                            name: row.try_get("name")?,
                            unique: unique != 0,
                        })
                    })
                    .collect()
            }
        }
    }

    pub async fn foreign_keys_of(&self, table: &str) -> Result<Vec<ForeignKeyInfo>> {
        match self.db {
            DbPool::Postgres(pool) => {
                let rows = sqlx::query(
                    r#"
                    SELECT con.conname::text AS name,
                           att.attname::text AS column_name,
                           ref.relname::text AS ref_table,
                           ratt.attname::text AS ref_column
                    FROM pg_constraint con
                    JOIN pg_class rel ON rel.oid = con.conrelid
                    JOIN pg_namespace n ON n.oid = rel.relnamespace
                    JOIN pg_class ref ON ref.oid = con.confrelid
                    JOIN pg_attribute att ON att.attrelid = con.conrelid AND att.attnum = con.conkey[1]
                    JOIN pg_attribute ratt ON ratt.attrelid = con.confrelid AND ratt.attnum = con.confkey[1]
                    WHERE con.contype = 'f' AND rel.relname = $1 AND n.nspname = current_schema()
                    ORDER BY con.conname
                    "#,
                )
                .bind(table)
                .fetch_all(pool)
                .await?;
                rows.iter()
                    .map(|row| {
                        Ok(ForeignKeyInfo {
                            name: row.try_get("name")?,
                            column: row.try_get("column_name")?,
                            ref_table: row.try_get("ref_table")?,
                            ref_column: row.try_get("ref_column")?,
                        })
                    })
                    .collect()
            }
            DbPool::Sqlite(handle) => {
                let rows = sqlx::query(&format!("PRAGMA foreign_key_list({})", table))
                    .fetch_all(&handle.pool)
                    .await?;
                rows.iter()
                    .map(|row| {
                        Ok(ForeignKeyInfo {
                            name: None,
                            column: row.try_get("from")?,
                            ref_table: row.try_get("table")?,
                            ref_column: row.try_get("to")?,
                        })
                    })
                    .collect()
            }
        }
    }

    /// Full snapshot: every table with columns, indexes and foreign keys,
    /// plus every enum type
    pub async fn snapshot(&self) -> Result<SchemaSnapshot> {
        let mut snapshot = SchemaSnapshot::empty(self.db.dialect());
        for table in self.list_tables().await? {
            let info = TableInfo {
                columns: self.columns_of(&table).await?,
                indexes: self.indexes_of(&table).await?,
                foreign_keys: self.foreign_keys_of(&table).await?,
            };
            snapshot.tables.insert(table, info);
        }
        snapshot.enums = self.list_enums().await?;
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::db::canonical;
    use crate::db::dialect::SqliteDialect;

    async fn memory_db() -> DbPool {
        DbPool::connect(&DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_missing_objects_are_empty() {
        let db = memory_db().await;
        let inspector = SchemaInspector::new(&db);

        assert!(!inspector.table_exists("users").await.unwrap());
        assert!(inspector.columns_of("users").await.unwrap().is_empty());
        assert!(inspector.indexes_of("users").await.unwrap().is_empty());
        assert!(inspector.foreign_keys_of("users").await.unwrap().is_empty());
        assert!(inspector.enum_labels("userrole").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_snapshot_of_created_table() {
        let db = memory_db().await;
        let dialect = db.adapter();
        let mut statements = Vec::new();
        for table in [&canonical::ENTITIES, &canonical::USERS] {
            statements.extend(dialect.render_create_table(table));
        }
        db.execute_statements(&statements).await.unwrap();

        let inspector = SchemaInspector::new(&db);
        assert!(inspector.table_exists("users").await.unwrap());

        let snapshot = inspector.snapshot().await.unwrap();
        assert_eq!(snapshot.dialect, DialectKind::Sqlite);
        assert!(snapshot.has_column("users", "allowed_modules"));
        assert!(snapshot.has_index("users", "idx_users_cedula"));
        assert!(snapshot.has_foreign_key("users", "entity_id", "entities"));

        let id = snapshot.column("users", "id").unwrap();
        assert!(!id.nullable);
        let secretaria = snapshot.column("users", "secretaria").unwrap();
        assert!(secretaria.nullable);
        let role = snapshot.column("users", "role").unwrap();
        assert!(!role.nullable);
        assert_eq!(role.default.as_deref(), Some("'secretario'"));
        assert!(snapshot.enums.is_empty());
    }

    #[test]
    fn test_fold_effects_into_snapshot() {
        let mut snapshot = SchemaSnapshot::empty(DialectKind::Sqlite);
        snapshot.record_table(&canonical::ENTITIES, &SqliteDialect);
        assert!(snapshot.has_column("entities", "nit"));
        assert!(snapshot.has_index("entities", "ix_entities_nit"));

        let extra = ColumnDescriptor::new("extra", crate::db::descriptor::ColumnType::Text);
        snapshot.record_column("entities", &extra, &SqliteDialect);
        assert!(snapshot.has_column("entities", "extra"));
        snapshot.record_dropped_column("entities", "extra");
        assert!(!snapshot.has_column("entities", "extra"));

        // Effects on missing tables are ignored
        snapshot.record_column("nope", &extra, &SqliteDialect);
        assert!(!snapshot.table_exists("nope"));

        snapshot.record_enum("userrole", vec!["admin".into()]);
        assert_eq!(snapshot.enum_labels("userrole"), ["admin".to_string()]);
        assert!(snapshot.enum_labels("missing").is_empty());
    }
}
