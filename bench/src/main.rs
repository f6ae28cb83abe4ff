mod clean;
mod cli;
mod config;
mod harness;
mod outcome;
mod report;
mod results;
mod run;
mod suite;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::clean::CleanOptions;
use crate::report::{OutcomeArg, ReportFilter, ReportFormat};
use crate::run::RunOptions;

#[derive(Parser)]
#[command(name = "bench", version, about = "Batch runs and reports for the Mastermind benchmark")]
struct Cli {
    /// Log progress to stderr (RUST_LOG still wins).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List suites in `bench/suites/`.
    List,
    /// Run every model of a suite against one shared secret.
    Run {
        suite_id: String,
        #[arg(long, default_value = "outputs")]
        output_dir: PathBuf,
        /// Defaults to `<suite id>_<timestamp>`.
        #[arg(long)]
        batch_name: Option<String>,
        /// Use an existing `mastermind` binary instead of building one.
        #[arg(long)]
        binary: Option<PathBuf>,
    },
    /// Aggregate JSONL result logs per model.
    Report {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,
        /// Write the report here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Keep only games of this model label.
        #[arg(long)]
        filter_model: Option<String>,
        #[arg(long, value_enum)]
        filter_outcome: Option<OutcomeArg>,
    },
    /// Delete or archive result files.
    Clean {
        #[arg(long, default_value = "outputs")]
        dir: PathBuf,
        /// Only files at least this many days old.
        #[arg(long)]
        older_than: Option<u64>,
        /// File-name glob (e.g. `results_*.jsonl`) instead of all benchmark artifacts.
        #[arg(long)]
        pattern: Option<glob::Pattern>,
        /// Move into `<dir>/archive/` instead of deleting.
        #[arg(long)]
        archive: bool,
        #[arg(long)]
        dry_run: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    mastermind::logging::init(cli.verbose);
    let repo_root = std::env::current_dir()?;
    match cli.command {
        Command::List => cli::list_suites(&repo_root),
        Command::Run {
            suite_id,
            output_dir,
            batch_name,
            binary,
        } => cli::run_suite_by_id(
            &repo_root,
            &suite_id,
            &RunOptions {
                output_dir,
                batch_name,
                binary,
                verbose: cli.verbose,
            },
        ),
        Command::Report {
            files,
            format,
            output,
            filter_model,
            filter_outcome,
        } => cli::report_files(
            &files,
            format,
            &ReportFilter {
                model: filter_model,
                outcome: filter_outcome.map(Into::into),
            },
            output.as_deref(),
        ),
        Command::Clean {
            dir,
            older_than,
            pattern,
            archive,
            dry_run,
        } => cli::clean_outputs(&CleanOptions {
            dir,
            older_than_days: older_than,
            pattern,
            archive,
            dry_run,
        }),
    }
}
