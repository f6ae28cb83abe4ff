//! Batch execution orchestration.
//!
//! Writes the batch config, drives one `mastermind play` process per model
//! against a shared secret, and records the batch summary.

use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use chrono::{Local, Utc};
use mastermind::io::config::{MastermindConfig, write_config};
use mastermind::io::results_log::read_results;
use mastermind::providers::cli::CliTool;
use tracing::{debug, info, instrument, warn};

use crate::config::apply_suite_config;
use crate::harness::{
    PlayInvocation, build_mastermind_binary, log_tail, play_command, remove_stale, run_logged,
};
use crate::outcome::{ModelStatus, classify_attempt};
use crate::results::{
    BatchSummary, ModelReport, ModelStats, file_sha256, round2, stats_from_results, write_summary,
};
use crate::suite::{SuiteFile, model_slug};

/// Characters of a failed process log kept in the summary.
const ERROR_TAIL_CHARS: usize = 500;

/// Knobs for `bench run` that are not part of the suite.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub output_dir: PathBuf,
    /// Defaults to `<suite id>_<local timestamp>`.
    pub batch_name: Option<String>,
    /// Use this `mastermind` binary instead of building one.
    pub binary: Option<PathBuf>,
    pub verbose: bool,
}

/// Result of running a suite.
#[derive(Debug)]
pub struct BatchOutcome {
    pub summary_path: PathBuf,
    pub summary: BatchSummary,
}

/// Everything one model process needs.
#[derive(Debug, Clone)]
pub struct ModelJob<'a> {
    pub binary: &'a Path,
    pub config_path: &'a Path,
    pub model: String,
    pub secret: &'a [u32],
    pub runs: u32,
    pub output: PathBuf,
    pub log: PathBuf,
    pub timeout: Duration,
    pub max_retries: u32,
    pub verbose: bool,
}

impl ModelJob<'_> {
    fn report(
        &self,
        status: ModelStatus,
        attempts: u32,
        error: Option<String>,
        stats: Option<ModelStats>,
    ) -> ModelReport {
        ModelReport {
            model: self.model.clone(),
            mode: mode_label(&self.model).to_string(),
            status,
            attempts,
            output_file: self.output.display().to_string(),
            log_file: self.log.display().to_string(),
            error,
            stats,
        }
    }
}

/// Run every model of a suite and write `<batch>_summary.json`.
#[instrument(skip_all, fields(suite_id = %suite.suite.id))]
pub fn run_suite(
    repo_root: &Path,
    suite_path: &Path,
    suite: &SuiteFile,
    options: &RunOptions,
) -> Result<BatchOutcome> {
    info!("batch started");

    let binary = match &options.binary {
        Some(binary) => binary.clone(),
        None => {
            debug!("building mastermind binary");
            build_mastermind_binary(repo_root)?
        }
    };
    if !binary.exists() {
        bail!("mastermind binary not found at {}", binary.display());
    }

    let started_at = Utc::now();
    let batch_name = options.batch_name.clone().unwrap_or_else(|| {
        format!("{}_{}", suite.suite.id, Local::now().format("%Y%m%d_%H%M%S"))
    });
    let output_dir = &options.output_dir;
    fs::create_dir_all(output_dir)
        .with_context(|| format!("create output dir {}", output_dir.display()))?;

    let suite_hash = file_sha256(suite_path).context("hash suite")?;
    let secret = suite.resolve_secret(&mut rand::thread_rng());
    let config_path = output_dir.join(format!("{batch_name}_mastermind.toml"));
    let cfg = apply_suite_config(MastermindConfig::default(), suite)?;
    write_config(&config_path, &cfg).context("write batch config")?;
    info!(%batch_name, ?secret, models = suite.suite.models.len(), "batch configured");

    let jobs: Vec<ModelJob<'_>> = suite
        .suite
        .models
        .iter()
        .map(|model| {
            let slug = model_slug(model);
            ModelJob {
                binary: &binary,
                config_path: &config_path,
                model: model.trim().to_string(),
                secret: &secret,
                runs: suite.suite.runs,
                output: output_dir.join(format!("{batch_name}_{slug}.jsonl")),
                log: output_dir.join(format!("{batch_name}_{slug}_play.log")),
                timeout: Duration::from_secs(suite.execution.timeout_secs),
                max_retries: suite.execution.max_retries,
                verbose: options.verbose,
            }
        })
        .collect();
    let models = run_jobs(&jobs, suite.execution.parallel);
    let finished_at = Utc::now();

    let duration = finished_at - started_at;
    let summary = BatchSummary {
        batch_name: batch_name.clone(),
        suite_id: suite.suite.id.clone(),
        suite_hash,
        secret,
        config: suite.game_config(),
        runs_per_model: suite.suite.runs,
        parallel: suite.execution.parallel,
        start_time: started_at.to_rfc3339(),
        end_time: finished_at.to_rfc3339(),
        duration_secs: round2(duration.num_milliseconds() as f64 / 1000.0),
        models,
    };
    let summary_path = output_dir.join(format!("{batch_name}_summary.json"));
    write_summary(&summary_path, &summary)?;

    info!(summary = %summary_path.display(), "batch complete");
    Ok(BatchOutcome {
        summary_path,
        summary,
    })
}

/// Run jobs in suite order, or one thread per job. Reports keep suite order either way.
pub fn run_jobs(jobs: &[ModelJob<'_>], parallel: bool) -> Vec<ModelReport> {
    if !parallel {
        return jobs.iter().map(run_model).collect();
    }
    thread::scope(|scope| {
        let handles: Vec<_> = jobs
            .iter()
            .map(|job| (job, scope.spawn(move || run_model(job))))
            .collect();
        handles
            .into_iter()
            .map(|(job, handle)| {
                handle.join().unwrap_or_else(|_| {
                    job.report(
                        ModelStatus::Error,
                        0,
                        Some("worker thread panicked".to_string()),
                        None,
                    )
                })
            })
            .collect()
    })
}

/// Drive one model's `mastermind play` process, retrying failed attempts.
#[instrument(skip_all, fields(model = %job.model))]
pub fn run_model(job: &ModelJob<'_>) -> ModelReport {
    let max_attempts = job.max_retries + 1;
    let mut status = ModelStatus::Error;
    let mut error = None;
    for attempt in 1..=max_attempts {
        if attempt > 1 {
            warn!(attempt, max_attempts, status = status.as_str(), "retrying model");
        }
        if let Err(err) = remove_stale(&job.output) {
            status = ModelStatus::Error;
            error = Some(format!("{err:#}"));
            continue;
        }
        let command = play_command(&PlayInvocation {
            binary: job.binary,
            config_path: job.config_path,
            model: &job.model,
            secret: job.secret,
            runs: job.runs,
            output: &job.output,
            verbose: job.verbose,
        });
        let header = format!("attempt {attempt}/{max_attempts}");
        let end = match run_logged(command, &job.log, job.timeout, &header) {
            Ok(end) => end,
            Err(err) => {
                status = ModelStatus::Error;
                error = Some(format!("{err:#}"));
                continue;
            }
        };
        debug!(attempt, exit_code = ?end.exit_code, timed_out = end.timed_out, "attempt finished");

        status = classify_attempt(end.exit_code, end.timed_out);
        match status {
            ModelStatus::Success => match read_stats(&job.output, job.runs) {
                Ok(stats) => {
                    info!(attempt, wins = stats.wins, runs = stats.runs, "model finished");
                    return job.report(ModelStatus::Success, attempt, None, Some(stats));
                }
                Err(err) => {
                    status = ModelStatus::Error;
                    error = Some(format!("{err:#}"));
                }
            },
            ModelStatus::Timeout => {
                error = Some(format!(
                    "Execution timeout ({} seconds)",
                    job.timeout.as_secs_f64()
                ));
            }
            ModelStatus::Failed | ModelStatus::Error => {
                let tail = log_tail(&job.log, ERROR_TAIL_CHARS);
                error = Some(if tail.is_empty() {
                    "Unknown error".to_string()
                } else {
                    tail
                });
            }
        }
    }
    warn!(status = status.as_str(), "model gave up");
    job.report(status, max_attempts, error, None)
}

fn read_stats(output: &Path, runs: u32) -> Result<ModelStats> {
    if !output.exists() {
        bail!("Output file empty or missing: {}", output.display());
    }
    let file = read_results(output)?;
    for warning in &file.warnings {
        warn!(%warning, "result log");
    }
    if file.results.is_empty() {
        bail!("Output file empty or missing: {}", output.display());
    }
    Ok(stats_from_results(&file.results, runs))
}

/// `cli` for the agent tools `mastermind play` drives as subprocesses, `api` otherwise.
pub fn mode_label(model: &str) -> &'static str {
    if CliTool::from_model(model).is_some() {
        "cli"
    } else {
        "api"
    }
}
