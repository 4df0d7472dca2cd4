//! Additive schema changes and their MySQL rendering.

use std::fmt;

/// Quote a MySQL identifier with backticks.
pub fn quote_ident(name: &str) -> String {
    format!("`{}`", name.replace('`', "``"))
}

/// MySQL column types used by the reconciler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    /// VARCHAR(n)
    Varchar(u16),
    /// LONGTEXT
    LongText,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::Varchar(len) => write!(f, "VARCHAR({})", len),
            ColumnType::LongText => write!(f, "LONGTEXT"),
        }
    }
}

/// Referential action taken when the referenced row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    SetNull,
    Cascade,
    Restrict,
}

impl fmt::Display for OnDelete {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OnDelete::SetNull => write!(f, "SET NULL"),
            OnDelete::Cascade => write!(f, "CASCADE"),
            OnDelete::Restrict => write!(f, "RESTRICT"),
        }
    }
}

/// A column that must exist.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnSpec {
    pub table: String,
    pub name: String,
    pub column_type: ColumnType,
    /// Name of the column this one is placed after.
    pub after: String,
}

impl ColumnSpec {
    pub fn new(table: &str, name: &str, column_type: ColumnType, after: &str) -> Self {
        Self {
            table: table.to_string(),
            name: name.to_string(),
            column_type,
            after: after.to_string(),
        }
    }
}

/// Kind of constraint. Only foreign keys are ever added.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    ForeignKey,
}

/// A named constraint that must exist.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintSpec {
    pub table: String,
    pub name: String,
    pub kind: ConstraintKind,
    pub local_column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub on_delete: OnDelete,
}

impl ConstraintSpec {
    /// A single-column foreign key: `table.local_column -> referenced_table.referenced_column`.
    pub fn foreign_key(
        table: &str,
        name: &str,
        local_column: &str,
        referenced_table: &str,
        referenced_column: &str,
        on_delete: OnDelete,
    ) -> Self {
        Self {
            table: table.to_string(),
            name: name.to_string(),
            kind: ConstraintKind::ForeignKey,
            local_column: local_column.to_string(),
            referenced_table: referenced_table.to_string(),
            referenced_column: referenced_column.to_string(),
            on_delete,
        }
    }
}

/// A single schema-mutating statement.
#[derive(Debug, Clone, PartialEq)]
pub enum Ddl {
    AddColumn(ColumnSpec),
    AddForeignKey(ConstraintSpec),
}

impl Ddl {
    /// Table the statement alters.
    pub fn table(&self) -> &str {
        match self {
            Ddl::AddColumn(col) => &col.table,
            Ddl::AddForeignKey(fk) => &fk.table,
        }
    }

    /// Render the statement as MySQL.
    pub fn to_sql(&self) -> String {
        match self {
            Ddl::AddColumn(col) => format!(
                "ALTER TABLE {} ADD COLUMN {} {} AFTER {}",
                quote_ident(&col.table),
                quote_ident(&col.name),
                col.column_type,
                quote_ident(&col.after)
            ),
            Ddl::AddForeignKey(fk) => match fk.kind {
                ConstraintKind::ForeignKey => format!(
                    "ALTER TABLE {} ADD CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({}) ON DELETE {}",
                    quote_ident(&fk.table),
                    quote_ident(&fk.name),
                    quote_ident(&fk.local_column),
                    quote_ident(&fk.referenced_table),
                    quote_ident(&fk.referenced_column),
                    fk.on_delete
                ),
            },
        }
    }
}

impl fmt::Display for Ddl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Ddl::AddColumn(col) => write!(f, "add column {}.{}", col.table, col.name),
            Ddl::AddForeignKey(fk) => write!(
                f,
                "add foreign key {} ({}.{} -> {}.{})",
                fk.name, fk.table, fk.local_column, fk.referenced_table, fk.referenced_column
            ),
        }
    }
}
