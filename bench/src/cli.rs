//! CLI command implementations.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use anyhow::{Context, Result, bail};
use tracing::{debug, info};

use crate::clean::{CleanOptions, clean};
use crate::report::{ReportFilter, ReportFormat, aggregate, render, write_report};
use crate::run::{RunOptions, run_suite};
use crate::suite::{SuiteFile, discover_suites, suite_path};

fn suites_dir(repo_root: &Path) -> PathBuf {
    repo_root.join("bench").join("suites")
}

/// List all available suites.
pub fn list_suites(repo_root: &Path) -> Result<()> {
    let suites = discover_suites(&suites_dir(repo_root))?;
    for suite in suites {
        println!(
            "{} models={} runs={}",
            suite.suite.id,
            suite.suite.models.join(","),
            suite.suite.runs
        );
    }
    Ok(())
}

/// Run a suite by id and print one line per model.
pub fn run_suite_by_id(repo_root: &Path, suite_id: &str, options: &RunOptions) -> Result<()> {
    let path = suite_path(&suites_dir(repo_root), suite_id);
    if !path.exists() {
        bail!("suite {} not found at {}", suite_id, path.display());
    }
    let suite = SuiteFile::load(&path).context("load suite")?;
    debug!(suite_id, models = suite.suite.models.len(), "suite loaded");

    info!(suite_id, "starting batch");
    let batch = run_suite(repo_root, &path, &suite, options).context("run suite")?;
    let summary = &batch.summary;
    println!(
        "run: suite={} batch={} secret={:?} models={}",
        summary.suite_id,
        summary.batch_name,
        summary.secret,
        summary.models.len()
    );
    for model in &summary.models {
        match &model.stats {
            Some(stats) => println!(
                "run: model={} status={} wins={}/{} ({:.1}%) avg_turns_when_won={:.2} duration_secs={:.2}",
                model.model,
                model.status.as_str(),
                stats.wins,
                stats.runs,
                stats.win_rate * 100.0,
                stats.avg_turns_when_won,
                stats.total_duration
            ),
            None => println!(
                "run: model={} status={} attempts={} error={}",
                model.model,
                model.status.as_str(),
                model.attempts,
                last_line(model.error.as_deref().unwrap_or("unknown error"))
            ),
        }
    }
    println!("results: {}", batch.summary_path.display());
    Ok(())
}

/// Log tails end with the most telling line.
fn last_line(text: &str) -> &str {
    text.lines().last().unwrap_or(text)
}

/// Aggregate result logs and print them, or write them to `output`.
pub fn report_files(
    files: &[PathBuf],
    format: ReportFormat,
    filter: &ReportFilter,
    output: Option<&Path>,
) -> Result<()> {
    let (summaries, warnings) = aggregate(files, filter)?;
    let rendered = render(&summaries, format);
    match output {
        Some(path) => {
            write_report(path, &rendered)?;
            println!("report: wrote {} model(s) to {}", summaries.len(), path.display());
        }
        None => print!("{}", rendered),
    }
    for warning in warnings {
        eprintln!("warning: {}", warning);
    }
    Ok(())
}

/// Delete or archive result files.
pub fn clean_outputs(options: &CleanOptions) -> Result<()> {
    let report = clean(options, SystemTime::now())?;
    let (action, done) = if options.archive {
        ("archive", "archived")
    } else {
        ("delete", "deleted")
    };
    if report.candidates.is_empty() {
        println!("clean: nothing to {} in {}", action, options.dir.display());
        return Ok(());
    }
    for candidate in &report.candidates {
        println!(
            "clean: candidate {} bytes={} age_days={}",
            candidate.path.display(),
            candidate.size,
            candidate.age_days
        );
    }
    if options.dry_run {
        println!("clean: dry run, {} file(s) left in place", report.candidates.len());
        return Ok(());
    }
    for (from, to) in &report.processed {
        match to {
            Some(to) => println!("clean: archived {} -> {}", from.display(), to.display()),
            None => println!("clean: deleted {}", from.display()),
        }
    }
    for failure in &report.failures {
        eprintln!("warning: {}", failure);
    }
    println!(
        "clean: {}={} failed={}",
        done,
        report.processed.len(),
        report.failures.len()
    );
    Ok(())
}
