use std::process::ExitCode;

use clap::{Parser, Subcommand};
use lms_schema::{Config, Report, StepOutcome};
use owo_colors::OwoColorize;
use tracing_subscriber::EnvFilter;

/// Schema reconciliation for the LMS database.
///
/// Connection settings come from DB_HOST, DB_PORT, DB_USER, DB_PASSWORD and
/// DB_NAME (a .env file in the working directory is honored).
#[derive(Parser, Debug)]
#[command(name = "lms-schema", version)]
struct Cli {
    /// Log every statement sent to the database
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Bring the schema up to date
    Reconcile,
    /// Show what `reconcile` would do, without altering the database
    Plan,
    /// Check that the server is reachable and the database exists
    Probe,
}

fn init_tracing(verbose: bool) {
    let default = if verbose {
        "lms_schema=debug"
    } else {
        "lms_schema=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(filter)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    match cli.command {
        Commands::Reconcile => reconcile(config).await,
        Commands::Plan => plan(config).await,
        Commands::Probe => probe(config).await,
    }
}

async fn reconcile(config: Config) -> ExitCode {
    println!("Reconciling {}", config.redacted_url().bold());
    match lms_schema::reconcile(config).await {
        Ok(report) => print_report(&report),
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn plan(config: Config) -> ExitCode {
    println!("Planning against {}", config.redacted_url().bold());
    let plan = match lms_schema::plan(config).await {
        Ok(plan) => plan,
        Err(e) => {
            eprintln!("{} {}", "error:".red().bold(), e);
            return ExitCode::FAILURE;
        }
    };

    let status = print_report(&plan.report);
    println!();
    if plan.statements.is_empty() {
        println!("Nothing to do.");
    } else {
        println!("Statements ({}):", plan.statements.len());
        for sql in &plan.statements {
            println!("  {};", sql.cyan());
        }
    }
    status
}

async fn probe(config: Config) -> ExitCode {
    println!("Probing {}", config.redacted_url().bold());
    match lms_schema::probe(&config).await {
        Ok(report) => {
            println!("  {} server {}", "✓".green(), report.server_version);
            println!("  {} database '{}' is present", "✓".green(), report.database);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("  {} {}", "✗".red(), e);
            let hints = lms_schema::troubleshooting_hints(&e, &config);
            if !hints.is_empty() {
                eprintln!();
                for hint in hints {
                    eprintln!("  {} {}", "hint:".yellow(), hint);
                }
            }
            ExitCode::FAILURE
        }
    }
}

fn print_report(report: &Report) -> ExitCode {
    println!();
    for (i, step) in report.steps.iter().enumerate() {
        let n = format!("{}/{}", i + 1, report.planned);
        match &step.outcome {
            StepOutcome::Applied => {
                println!("  {} {} {}", "+".green(), n.dimmed(), step.name)
            }
            StepOutcome::AlreadyPresent => {
                println!(
                    "  {} {} {} {}",
                    "=".dimmed(),
                    n.dimmed(),
                    step.name,
                    "(already present)".dimmed()
                )
            }
            StepOutcome::Skipped(reason) => {
                println!(
                    "  {} {} {} {}",
                    "-".yellow(),
                    n.dimmed(),
                    step.name,
                    format!("(skipped: {reason})").yellow()
                )
            }
        }
    }

    match &report.failure {
        None => {
            println!();
            println!("{}", "All steps succeeded.".green());
            ExitCode::SUCCESS
        }
        Some(failure) => {
            let n = format!("{}/{}", report.steps.len() + 1, report.planned);
            println!("  {} {} {}", "✗".red(), n.dimmed(), failure.step);
            println!();
            eprintln!("{} {}", "error:".red().bold(), failure.error);
            if report.not_run() > 0 {
                eprintln!(
                    "{} step(s) not run; earlier steps remain applied.",
                    report.not_run()
                );
            }
            ExitCode::FAILURE
        }
    }
}
