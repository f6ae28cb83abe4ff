//! Purging of old result files.
//!
//! Only files directly inside the output directory are touched: benchmark
//! artifacts by default, or names matching `--pattern`. Subdirectories
//! (including `archive/`) are left alone.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use glob::Pattern;
use tracing::{debug, warn};

/// File name endings written by `mastermind play` and `bench run`.
pub const ARTIFACT_SUFFIXES: [&str; 4] = [".jsonl", "_summary.json", "_play.log", "_mastermind.toml"];

const SECS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(Debug, Clone)]
pub struct CleanOptions {
    pub dir: PathBuf,
    /// Only files at least this many whole days old.
    pub older_than_days: Option<u64>,
    /// File-name glob replacing the artifact suffix filter.
    pub pattern: Option<Pattern>,
    /// Move into `<dir>/archive/` instead of deleting.
    pub archive: bool,
    pub dry_run: bool,
}

/// A file selected for purging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub path: PathBuf,
    pub age_days: u64,
    pub size: u64,
}

#[derive(Debug, Default)]
pub struct CleanReport {
    pub candidates: Vec<Candidate>,
    /// `(from, to)` for archived files; `to` is `None` when deleted.
    pub processed: Vec<(PathBuf, Option<PathBuf>)>,
    pub failures: Vec<String>,
}

pub fn is_artifact(name: &str) -> bool {
    ARTIFACT_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
}

/// Selected files in `dir` old enough to purge, sorted by path.
pub fn find_candidates(
    dir: &Path,
    pattern: Option<&Pattern>,
    older_than_days: Option<u64>,
    now: SystemTime,
) -> Result<Vec<Candidate>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut candidates = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read {}", dir.display()))? {
        let entry = entry.context("read entry")?;
        let path = entry.path();
        let name = entry.file_name();
        let name = name.to_string_lossy();
        let selected = match pattern {
            Some(pattern) => pattern.matches(&name),
            None => is_artifact(&name),
        };
        if !selected {
            continue;
        }
        let metadata = entry
            .metadata()
            .with_context(|| format!("stat {}", path.display()))?;
        if !metadata.is_file() {
            continue;
        }
        let modified = metadata
            .modified()
            .with_context(|| format!("mtime {}", path.display()))?;
        let age = now.duration_since(modified).unwrap_or(Duration::ZERO);
        let age_days = age.as_secs() / SECS_PER_DAY;
        if older_than_days.is_some_and(|min| age_days < min) {
            continue;
        }
        candidates.push(Candidate {
            path,
            age_days,
            size: metadata.len(),
        });
    }
    candidates.sort_by(|left, right| left.path.cmp(&right.path));
    Ok(candidates)
}

/// Delete or archive the selected artifacts. Per-file failures are collected, not fatal.
pub fn clean(options: &CleanOptions, now: SystemTime) -> Result<CleanReport> {
    let candidates = find_candidates(
        &options.dir,
        options.pattern.as_ref(),
        options.older_than_days,
        now,
    )?;
    let mut report = CleanReport {
        candidates,
        ..CleanReport::default()
    };
    if options.dry_run || report.candidates.is_empty() {
        return Ok(report);
    }

    let archive_dir = options.dir.join("archive");
    if options.archive {
        fs::create_dir_all(&archive_dir)
            .with_context(|| format!("create {}", archive_dir.display()))?;
    }

    for candidate in &report.candidates {
        let result = if options.archive {
            archive_file(&candidate.path, &archive_dir).map(Some)
        } else {
            fs::remove_file(&candidate.path)
                .with_context(|| format!("delete {}", candidate.path.display()))
                .map(|()| None)
        };
        match result {
            Ok(dest) => {
                debug!(path = %candidate.path.display(), archived = dest.is_some(), "purged");
                report.processed.push((candidate.path.clone(), dest));
            }
            Err(err) => {
                warn!(path = %candidate.path.display(), "purge failed: {err:#}");
                report.failures.push(format!("{err:#}"));
            }
        }
    }
    Ok(report)
}

fn archive_file(path: &Path, archive_dir: &Path) -> Result<PathBuf> {
    let dest = free_destination(path, archive_dir);
    fs::rename(path, &dest)
        .with_context(|| format!("move {} to {}", path.display(), dest.display()))?;
    Ok(dest)
}

/// `<archive>/<name>`, or `<stem>_<n><ext>` when that name is taken.
fn free_destination(path: &Path, archive_dir: &Path) -> PathBuf {
    let file_name = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let dest = archive_dir.join(&file_name);
    if !dest.exists() {
        return dest;
    }
    let (stem, ext) = match file_name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
        None => (file_name.clone(), String::new()),
    };
    (1..)
        .map(|n| archive_dir.join(format!("{stem}_{n}{ext}")))
        .find(|candidate| !candidate.exists())
        .unwrap_or(dest)
}
