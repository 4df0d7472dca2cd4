//! In-memory schema that answers checks and simulates DDL.
//!
//! A [`VirtualSchema`] is either captured from a live database (see
//! [`MySqlSession::capture`](crate::MySqlSession::capture)) or built by hand.
//! Statements are checked for missing tables and columns and for duplicate
//! column or constraint names. Column types and indexes are not captured, so
//! a foreign key MySQL would reject for mismatched types passes here.
//!
//! Every interaction is recorded in a journal, in order.

use indexmap::IndexMap;

use crate::check::PRIMARY_CONSTRAINT;
use crate::{Check, Ddl, Error, Result, SchemaSession};

/// One recorded interaction with a [`VirtualSchema`].
#[derive(Debug, Clone, PartialEq)]
pub enum JournalEntry {
    Lookup(Check),
    /// A statement that was accepted and applied.
    Applied(String),
    /// A statement that was rejected; the schema is unchanged.
    Rejected(String),
    Release,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct VirtualTable {
    /// Columns in ordinal order.
    columns: Vec<String>,
    /// Constraint names, including `PRIMARY`.
    constraints: Vec<String>,
}

/// Virtual schema state for simulating a reconciliation run.
#[derive(Debug, Clone)]
pub struct VirtualSchema {
    database: String,
    tables: IndexMap<String, VirtualTable>,
    journal: Vec<JournalEntry>,
    lookup_failure: Option<String>,
}

impl VirtualSchema {
    /// An empty schema for `database`.
    pub fn new(database: &str) -> Self {
        Self {
            database: database.to_string(),
            tables: IndexMap::new(),
            journal: Vec::new(),
            lookup_failure: None,
        }
    }

    /// Add a table with the given columns, in order.
    pub fn with_table(mut self, table: &str, columns: &[&str]) -> Self {
        self.insert_table(table);
        for column in columns {
            self.insert_column(table, column);
        }
        self
    }

    /// Add a named constraint to an existing (or new) table.
    pub fn with_constraint(mut self, table: &str, name: &str) -> Self {
        self.insert_table(table);
        if let Some(t) = self.tables.get_mut(table) {
            t.constraints.push(name.to_string());
        }
        self
    }

    /// Add the `PRIMARY` constraint to a table.
    pub fn with_primary_key(self, table: &str) -> Self {
        self.with_constraint(table, PRIMARY_CONSTRAINT)
    }

    /// Make every subsequent lookup fail with `message`.
    pub fn fail_lookups(mut self, message: &str) -> Self {
        self.lookup_failure = Some(message.to_string());
        self
    }

    pub(crate) fn insert_table(&mut self, table: &str) {
        self.tables.entry(table.to_string()).or_default();
    }

    pub(crate) fn insert_column(&mut self, table: &str, column: &str) {
        self.tables
            .entry(table.to_string())
            .or_default()
            .columns
            .push(column.to_string());
    }

    pub fn database(&self) -> &str {
        &self.database
    }

    pub fn has_table(&self, table: &str) -> bool {
        self.tables.contains_key(table)
    }

    /// Columns of `table` in ordinal order.
    pub fn columns(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).map(|t| t.columns.as_slice())
    }

    /// Constraint names on `table`, in creation order.
    pub fn constraints(&self, table: &str) -> Option<&[String]> {
        self.tables.get(table).map(|t| t.constraints.as_slice())
    }

    pub fn journal(&self) -> &[JournalEntry] {
        &self.journal
    }

    /// Statements that were applied, in order.
    pub fn executed(&self) -> Vec<&str> {
        self.journal
            .iter()
            .filter_map(|entry| match entry {
                JournalEntry::Applied(sql) => Some(sql.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn release_count(&self) -> usize {
        self.journal
            .iter()
            .filter(|entry| matches!(entry, JournalEntry::Release))
            .count()
    }

    /// True if both schemas have the same tables, columns and constraints.
    pub fn same_structure(&self, other: &VirtualSchema) -> bool {
        self.tables == other.tables
    }

    fn count(&self, check: &Check) -> usize {
        match check {
            Check::Table { table } => usize::from(self.has_table(table)),
            Check::Column { table, column } => self
                .tables
                .get(table)
                .map_or(0, |t| usize::from(t.columns.contains(column))),
            Check::NonPrimaryConstraint { table } => self.tables.get(table).map_or(0, |t| {
                t.constraints
                    .iter()
                    .filter(|name| name.as_str() != PRIMARY_CONSTRAINT)
                    .count()
            }),
        }
    }

    /// Validate and apply `ddl`, returning MySQL's message on rejection.
    fn simulate(&mut self, ddl: &Ddl) -> std::result::Result<(), String> {
        let missing_table = |table: &str| format!("Table '{}.{}' doesn't exist", self.database, table);

        match ddl {
            Ddl::AddColumn(col) => {
                let table = self
                    .tables
                    .get(&col.table)
                    .ok_or_else(|| missing_table(&col.table))?;
                if table.columns.contains(&col.name) {
                    return Err(format!("Duplicate column name '{}'", col.name));
                }
                let position = table
                    .columns
                    .iter()
                    .position(|c| *c == col.after)
                    .ok_or_else(|| format!("Unknown column '{}' in '{}'", col.after, col.table))?;

                if let Some(table) = self.tables.get_mut(&col.table) {
                    table.columns.insert(position + 1, col.name.clone());
                }
                Ok(())
            }
            Ddl::AddForeignKey(fk) => {
                let table = self
                    .tables
                    .get(&fk.table)
                    .ok_or_else(|| missing_table(&fk.table))?;
                if !table.columns.contains(&fk.local_column) {
                    return Err(format!(
                        "Key column '{}' doesn't exist in table",
                        fk.local_column
                    ));
                }
                let referenced = self.tables.get(&fk.referenced_table).ok_or_else(|| {
                    format!("Failed to open the referenced table '{}'", fk.referenced_table)
                })?;
                if !referenced.columns.contains(&fk.referenced_column) {
                    return Err(format!(
                        "Failed to add the foreign key constraint. Missing column '{}' for constraint '{}' in the referenced table '{}'",
                        fk.referenced_column, fk.name, fk.referenced_table
                    ));
                }
                let duplicate = self
                    .tables
                    .values()
                    .any(|t| t.constraints.contains(&fk.name));
                if duplicate {
                    return Err(format!(
                        "Duplicate foreign key constraint name '{}'",
                        fk.name
                    ));
                }

                if let Some(table) = self.tables.get_mut(&fk.table) {
                    table.constraints.push(fk.name.clone());
                }
                Ok(())
            }
        }
    }
}

impl SchemaSession for VirtualSchema {
    async fn lookup(&mut self, check: &Check) -> Result<usize> {
        self.journal.push(JournalEntry::Lookup(check.clone()));
        if let Some(message) = &self.lookup_failure {
            return Err(Error::Introspection {
                sql: check.sql().to_string(),
                message: message.clone(),
            });
        }
        Ok(self.count(check))
    }

    async fn apply(&mut self, ddl: &Ddl) -> Result<()> {
        let sql = ddl.to_sql();
        match self.simulate(ddl) {
            Ok(()) => {
                self.journal.push(JournalEntry::Applied(sql));
                Ok(())
            }
            Err(message) => {
                self.journal.push(JournalEntry::Rejected(sql.clone()));
                Err(Error::Mutation { sql, message })
            }
        }
    }

    async fn release(&mut self) -> Result<()> {
        self.journal.push(JournalEntry::Release);
        Ok(())
    }
}
