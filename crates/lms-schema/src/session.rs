//! The seam between the step runner and a database.

use std::future::Future;

use crate::{Check, Ddl, Result};

/// A schema the reconciler can inspect and alter.
///
/// Implemented by [`MySqlSession`](crate::MySqlSession) for a live database
/// and by [`VirtualSchema`](crate::VirtualSchema) for an in-memory copy.
pub trait SchemaSession {
    /// Run an introspection check, returning the number of matching rows.
    ///
    /// Always observes the current state; implementations must not cache.
    fn lookup(&mut self, check: &Check) -> impl Future<Output = Result<usize>> + Send;

    /// Execute a single DDL statement.
    fn apply(&mut self, ddl: &Ddl) -> impl Future<Output = Result<()>> + Send;

    /// Release the underlying connection. Called exactly once per run.
    fn release(&mut self) -> impl Future<Output = Result<()>> + Send;
}
