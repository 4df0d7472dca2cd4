//! Schema reconciliation for the LMS MySQL database.
//!
//! This crate provides:
//! - A fixed, ordered list of additive schema corrections for the `content`
//!   and `files` tables, each gated by an existence check
//! - A generic step runner that works against any [`SchemaSession`]
//! - A live MySQL session and an in-memory [`VirtualSchema`] for previews
//!   and tests
//! - A connectivity probe
//!
//! Running the reconciler any number of times converges to the same schema:
//! a step whose check already holds issues no DDL.
//!
//! ```ignore
//! let config = lms_schema::Config::from_env()?;
//! let report = lms_schema::reconcile(config).await?;
//! assert!(report.is_success());
//! ```
//!
//! Concurrent runs against the same database are not coordinated; run the
//! reconciler once per deployment.

mod check;
pub mod config;
pub mod connectivity;
mod ddl;
mod error;
mod live;
pub mod reconcile;
mod session;
mod virtual_schema;

pub use check::{Check, PRIMARY_CONSTRAINT};
pub use config::{Config, ConfigError};
pub use connectivity::{ProbeReport, probe, troubleshooting_hints};
pub use ddl::{ColumnSpec, ColumnType, ConstraintKind, ConstraintSpec, Ddl, OnDelete, quote_ident};
pub use error::Error;
pub use live::MySqlSession;
pub use reconcile::{
    Outcome, Reconciler, Report, Step, StepFailure, StepOutcome, StepReport, reconcile_session,
};
pub use session::SchemaSession;
pub use virtual_schema::{JournalEntry, VirtualSchema};

/// Result type for lms-schema operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Connect with `config` and run the `content` repair.
///
/// Fails only if the connection cannot be opened; step failures are reported
/// in the returned [`Report`]. The connection is released before returning.
pub async fn reconcile(config: Config) -> Result<Report> {
    tracing::info!(target = %config.redacted_url(), "reconciling schema");
    let mut session = MySqlSession::connect(&config).await?;
    Ok(reconcile_session(&mut session, &Reconciler::content_repair()).await)
}

/// A dry run: what reconciliation would do, computed on a captured copy.
#[derive(Debug)]
pub struct Plan {
    pub report: Report,
    /// Statements a real run would issue, in order.
    pub statements: Vec<String>,
}

/// Capture the live schema, release the connection, and run the `content`
/// repair against the captured copy. The live database is not altered.
pub async fn plan(config: Config) -> Result<Plan> {
    tracing::info!(target = %config.redacted_url(), "planning schema reconciliation");
    let mut session = MySqlSession::connect(&config).await?;
    let captured = session.capture().await;
    let released = session.release().await;

    let mut schema = settle_capture(captured, released)?;
    let report = Reconciler::content_repair().run(&mut schema).await;
    let statements = schema.executed().into_iter().map(String::from).collect();
    Ok(Plan { report, statements })
}

/// A capture outlives a failed release: the error is logged, the copy kept.
fn settle_capture(
    captured: Result<VirtualSchema>,
    released: Result<()>,
) -> Result<VirtualSchema> {
    if let Err(err) = released {
        tracing::warn!(error = %err, "failed to release connection");
    }
    captured
}
