//! Schema descriptors
//!
//! Compile-time description of the target schema. Descriptors are declared as
//! `static` values (see [`crate::db::canonical`]) and never mutated; the live
//! shape of a database is only ever read through the inspector.

/// Logical column type, rendered per dialect
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ColumnType {
    Integer,
    Text,
    /// Bounded text; SQLite stores it as TEXT
    Varchar(u16),
    Boolean,
    Float,
    Timestamp,
    Binary,
    /// JSON document; SQLite stores it as TEXT
    Json,
    /// Native enum on PostgreSQL, unconstrained TEXT on SQLite
    Enum(&'static EnumDescriptor),
}

impl ColumnType {
    pub fn enum_descriptor(&self) -> Option<&'static EnumDescriptor> {
        match self {
            ColumnType::Enum(descriptor) => Some(descriptor),
            _ => None,
        }
    }
}

/// Dialect-neutral default / backfill value
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DefaultValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(&'static str),
    CurrentTimestamp,
    /// SQL expression valid on every supported dialect
    Expr(&'static str),
}

/// Named enum type with its ordered, lowercase labels
#[derive(Debug, PartialEq, Eq)]
pub struct EnumDescriptor {
    pub name: &'static str,
    pub labels: &'static [&'static str],
}

impl EnumDescriptor {
    pub const fn new(name: &'static str, labels: &'static [&'static str]) -> Self {
        Self { name, labels }
    }

    pub fn first_label(&self) -> Option<&'static str> {
        self.labels.first().copied()
    }

    /// Labels of this descriptor absent from `actual`, in declaration order
    pub fn missing_labels(&self, actual: &[String]) -> Vec<&'static str> {
        self.labels
            .iter()
            .copied()
            .filter(|label| !actual.iter().any(|a| a == label))
            .collect()
    }

    /// True when the live type carries labels this descriptor does not know,
    /// e.g. legacy upper-case `PETICION`. Adding values cannot fix that.
    pub fn is_miscased(&self, actual: &[String]) -> bool {
        actual
            .iter()
            .any(|a| !self.labels.iter().any(|label| label == a))
    }

    /// Upper-case spellings of the labels, as written by older releases
    pub fn legacy_labels(&self) -> Vec<String> {
        self.labels.iter().map(|l| l.to_uppercase()).collect()
    }
}

/// Column definition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColumnDescriptor {
    pub name: &'static str,
    pub ty: ColumnType,
    pub nullable: bool,
    pub default: Option<DefaultValue>,
    pub primary_key: bool,
    pub unique: bool,
}

impl ColumnDescriptor {
    /// Nullable column without default
    pub const fn new(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            nullable: true,
            default: None,
            primary_key: false,
            unique: false,
        }
    }

    /// Auto-incrementing integer primary key named `id`
    pub const fn id() -> Self {
        Self::new("id", ColumnType::Integer).primary_key()
    }

    pub const fn primary_key(self) -> Self {
        Self {
            primary_key: true,
            nullable: false,
            ..self
        }
    }

    pub const fn not_null(self) -> Self {
        Self {
            nullable: false,
            ..self
        }
    }

    pub const fn unique(self) -> Self {
        Self {
            unique: true,
            ..self
        }
    }

    pub const fn default(self, value: DefaultValue) -> Self {
        Self {
            default: Some(value),
            ..self
        }
    }

    /// Whether `ALTER TABLE ADD COLUMN` can produce this column on a table
    /// that already has rows
    pub fn addable_to_populated_table(&self) -> bool {
        !self.primary_key && (self.nullable || self.default.is_some())
    }
}

/// Referential action for a foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    NoAction,
    Cascade,
    SetNull,
    Restrict,
}

impl OnDelete {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::NoAction => "NO ACTION",
            OnDelete::Cascade => "CASCADE",
            OnDelete::SetNull => "SET NULL",
            OnDelete::Restrict => "RESTRICT",
        }
    }
}

/// Named UNIQUE constraint over one or more columns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniqueConstraint {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// Named single-column foreign key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ForeignKeyConstraint {
    pub name: &'static str,
    pub column: &'static str,
    pub ref_table: &'static str,
    pub ref_column: &'static str,
    pub on_delete: OnDelete,
}

/// Named secondary index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexDescriptor {
    pub name: &'static str,
    pub columns: &'static [&'static str],
    pub unique: bool,
}

/// Table definition
#[derive(Debug, PartialEq)]
pub struct TableDescriptor {
    pub name: &'static str,
    /// Creation order
    pub columns: &'static [ColumnDescriptor],
    pub uniques: &'static [UniqueConstraint],
    pub foreign_keys: &'static [ForeignKeyConstraint],
    pub indexes: &'static [IndexDescriptor],
}

impl TableDescriptor {
    pub fn column(&self, name: &str) -> Option<&'static ColumnDescriptor> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn foreign_key_for(&self, column: &str) -> Option<&'static ForeignKeyConstraint> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    /// Enum types used by this table's columns
    pub fn enum_types(&self) -> impl Iterator<Item = &'static EnumDescriptor> {
        self.columns.iter().filter_map(|c| c.ty.enum_descriptor())
    }
}
