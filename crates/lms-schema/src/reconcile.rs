//! Check-then-correct step runner.
//!
//! A [`Reconciler`] is an ordered list of [`Step`]s. Each step observes the
//! schema through a fresh [`Check`] and only issues its DDL when the check
//! comes back empty, so running the same list again is a no-op.
//!
//! Steps run strictly in declaration order: later steps may depend on columns
//! added by earlier ones. The first error stops the run; whatever was applied
//! before it stays applied.

use std::fmt;

use tracing::{Instrument, error, info, info_span, warn};

use crate::{
    Check, ColumnSpec, ColumnType, ConstraintSpec, Ddl, Error, OnDelete, Result, SchemaSession,
};

/// One check-then-correct unit.
#[derive(Debug, Clone)]
pub struct Step {
    pub name: String,
    /// The step is skipped unless this holds.
    pub requires: Option<Check>,
    /// The step is already satisfied if this holds.
    pub check: Check,
    /// Statements issued, in order, when `check` does not hold.
    pub actions: Vec<Ddl>,
}

impl Step {
    /// Ensure a column exists.
    pub fn ensure_column(column: ColumnSpec) -> Self {
        Self {
            name: format!("ensure column {}.{}", column.table, column.name),
            requires: None,
            check: Check::column(&column.table, &column.name),
            actions: vec![Ddl::AddColumn(column)],
        }
    }

    /// Only run this step when `check` holds.
    pub fn requires(mut self, check: Check) -> Self {
        self.requires = Some(check);
        self
    }
}

/// How a step concluded.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    Applied,
    AlreadyPresent,
    Skipped(String),
}

impl fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepOutcome::Applied => write!(f, "applied"),
            StepOutcome::AlreadyPresent => write!(f, "already present"),
            StepOutcome::Skipped(reason) => write!(f, "skipped ({})", reason),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub name: String,
    pub outcome: StepOutcome,
}

/// The step that aborted a run.
#[derive(Debug)]
pub struct StepFailure {
    pub step: String,
    pub error: Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Success,
    Failure,
}

/// Result of a reconciliation run.
#[derive(Debug)]
pub struct Report {
    /// Steps that ran to completion, in order.
    pub steps: Vec<StepReport>,
    pub failure: Option<StepFailure>,
    /// Number of steps the reconciler declares.
    pub planned: usize,
}

impl Report {
    fn new(planned: usize) -> Self {
        Self {
            steps: Vec::new(),
            failure: None,
            planned,
        }
    }

    pub fn outcome(&self) -> Outcome {
        if self.failure.is_some() {
            Outcome::Failure
        } else {
            Outcome::Success
        }
    }

    pub fn is_success(&self) -> bool {
        self.outcome() == Outcome::Success
    }

    /// Outcomes in step order.
    pub fn outcomes(&self) -> Vec<&StepOutcome> {
        self.steps.iter().map(|s| &s.outcome).collect()
    }

    /// Steps that never started because an earlier step failed.
    pub fn not_run(&self) -> usize {
        let failed = usize::from(self.failure.is_some());
        self.planned.saturating_sub(self.steps.len() + failed)
    }
}

/// An ordered list of reconciliation steps.
#[derive(Debug, Clone)]
pub struct Reconciler {
    steps: Vec<Step>,
}

impl Reconciler {
    pub fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }

    /// The LMS `content` repair: three columns, the content foreign keys, and
    /// the `files.content_id` link.
    ///
    /// The foreign-key step is satisfied by *any* non-primary constraint on
    /// `content`. If one of the three keys is later dropped while another
    /// constraint remains, this step will not re-add it.
    pub fn content_repair() -> Self {
        let fk = |name: &str, column: &str, target: &str| {
            Ddl::AddForeignKey(ConstraintSpec::foreign_key(
                "content",
                name,
                column,
                target,
                "id",
                OnDelete::SetNull,
            ))
        };

        Self::new(vec![
            Step::ensure_column(ColumnSpec::new(
                "content",
                "subcategory_id",
                ColumnType::Varchar(36),
                "category_id",
            )),
            Step::ensure_column(ColumnSpec::new(
                "content",
                "content_type",
                ColumnType::Varchar(50),
                "subcategory_id",
            )),
            Step::ensure_column(ColumnSpec::new(
                "content",
                "content",
                ColumnType::LongText,
                "content_type",
            )),
            Step {
                name: "ensure content foreign keys".to_string(),
                requires: None,
                check: Check::non_primary_constraint("content"),
                actions: vec![
                    fk("fk_content_grade", "grade_id", "grades"),
                    fk("fk_content_category", "category_id", "categories"),
                    fk("fk_content_subcategory", "subcategory_id", "subcategories"),
                ],
            },
            Step::ensure_column(ColumnSpec::new(
                "files",
                "content_id",
                ColumnType::Varchar(36),
                "type",
            ))
            .requires(Check::table("files")),
        ])
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Run every step against `session`, stopping at the first error.
    ///
    /// Does not release the session; see [`reconcile_session`].
    pub async fn run<S: SchemaSession>(&self, session: &mut S) -> Report {
        let mut report = Report::new(self.steps.len());

        for (index, step) in self.steps.iter().enumerate() {
            let span = info_span!("step", n = index + 1, name = %step.name);
            match run_step(step, session).instrument(span).await {
                Ok(outcome) => {
                    info!(step = index + 1, %outcome, "{}", step.name);
                    report.steps.push(StepReport {
                        name: step.name.clone(),
                        outcome,
                    });
                }
                Err(err) => {
                    error!(step = index + 1, error = %err, "{} failed", step.name);
                    report.failure = Some(StepFailure {
                        step: step.name.clone(),
                        error: err,
                    });
                    break;
                }
            }
        }

        if report.not_run() > 0 {
            warn!(remaining = report.not_run(), "reconciliation aborted");
        }
        report
    }
}

async fn present<S: SchemaSession>(session: &mut S, check: &Check) -> Result<bool> {
    Ok(session.lookup(check).await? > 0)
}

async fn run_step<S: SchemaSession>(step: &Step, session: &mut S) -> Result<StepOutcome> {
    if let Some(required) = &step.requires {
        if !present(session, required).await? {
            return Ok(StepOutcome::Skipped(format!("{} does not exist", required)));
        }
    }

    if present(session, &step.check).await? {
        return Ok(StepOutcome::AlreadyPresent);
    }

    for ddl in &step.actions {
        info!(%ddl, "applying");
        session.apply(ddl).await?;
    }
    Ok(StepOutcome::Applied)
}

/// Run `reconciler` against `session`, then release the session.
///
/// The session is released exactly once, whether the run succeeded or
/// aborted part way. A failed release is logged; it does not change the
/// report.
pub async fn reconcile_session<S: SchemaSession>(session: &mut S, reconciler: &Reconciler) -> Report {
    let report = reconciler.run(session).await;
    if let Err(err) = session.release().await {
        warn!(error = %err, "failed to release connection");
    }
    report
}
