//! Introspection predicates over `information_schema`.
//!
//! Every check is scoped to one database (bound as the first parameter) and
//! is satisfied when its query returns at least one row.

use std::fmt;

/// Name MySQL gives every primary key constraint.
pub const PRIMARY_CONSTRAINT: &str = "PRIMARY";

/// A fact about the live schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Check {
    /// The table exists.
    Table { table: String },
    /// The column exists on the table.
    Column { table: String, column: String },
    /// The table carries at least one constraint other than its primary key.
    NonPrimaryConstraint { table: String },
}

impl Check {
    pub fn table(table: &str) -> Self {
        Check::Table {
            table: table.to_string(),
        }
    }

    pub fn column(table: &str, column: &str) -> Self {
        Check::Column {
            table: table.to_string(),
            column: column.to_string(),
        }
    }

    pub fn non_primary_constraint(table: &str) -> Self {
        Check::NonPrimaryConstraint {
            table: table.to_string(),
        }
    }

    /// The lookup query. The database name is always the first placeholder.
    pub fn sql(&self) -> &'static str {
        match self {
            Check::Table { .. } => {
                "SELECT TABLE_NAME FROM information_schema.TABLES \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ?"
            }
            Check::Column { .. } => {
                "SELECT COLUMN_NAME FROM information_schema.COLUMNS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND COLUMN_NAME = ?"
            }
            Check::NonPrimaryConstraint { .. } => {
                "SELECT CONSTRAINT_NAME FROM information_schema.TABLE_CONSTRAINTS \
                 WHERE TABLE_SCHEMA = ? AND TABLE_NAME = ? AND CONSTRAINT_NAME <> 'PRIMARY'"
            }
        }
    }

    /// Parameters following the database name, in placeholder order.
    pub fn params(&self) -> Vec<&str> {
        match self {
            Check::Table { table } | Check::NonPrimaryConstraint { table } => vec![table.as_str()],
            Check::Column { table, column } => vec![table.as_str(), column.as_str()],
        }
    }
}

impl fmt::Display for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Check::Table { table } => write!(f, "table {}", table),
            Check::Column { table, column } => write!(f, "column {}.{}", table, column),
            Check::NonPrimaryConstraint { table } => {
                write!(f, "non-primary constraint on {}", table)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholders_match_params() {
        let checks = [
            Check::table("files"),
            Check::column("content", "content_type"),
            Check::non_primary_constraint("content"),
        ];
        for check in &checks {
            let placeholders = check.sql().matches('?').count();
            // +1 for the database name
            assert_eq!(placeholders, check.params().len() + 1, "{check}");
        }
    }

    #[test]
    fn test_column_params_order() {
        let check = Check::column("content", "subcategory_id");
        assert_eq!(check.params(), vec!["content", "subcategory_id"]);
        assert_eq!(check.to_string(), "column content.subcategory_id");
    }

    #[test]
    fn test_constraint_check_excludes_primary() {
        let sql = Check::non_primary_constraint("content").sql();
        assert!(sql.contains(&format!("<> '{}'", PRIMARY_CONSTRAINT)));
    }
}
