//! JSONL result log: one [`GameResult`] per line.
//!
//! Lines are appended and flushed as each game finishes, so a crash or an
//! interrupted batch keeps every completed game.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone};
use tracing::{debug, warn};

use crate::core::types::GameResult;

/// `<dir>/results_%Y%m%d_%H%M%S.jsonl` for the given instant.
pub fn default_output_path<Tz: TimeZone>(dir: &Path, now: &DateTime<Tz>) -> PathBuf
where
    Tz::Offset: std::fmt::Display,
{
    dir.join(format!("results_{}.jsonl", now.format("%Y%m%d_%H%M%S")))
}

/// Append one result as a single JSON line, creating the file and its directory if needed.
pub fn append_result(path: &Path, result: &GameResult) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create results dir {}", parent.display()))?;
    }
    let mut line = serde_json::to_string(result).context("serialize game result")?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .with_context(|| format!("append {}", path.display()))?;
    file.flush()
        .with_context(|| format!("flush {}", path.display()))?;
    debug!(path = %path.display(), outcome = result.outcome.as_str(), "result appended");
    Ok(())
}

/// Results read back from a log, with one warning per skipped line.
#[derive(Debug, Default)]
pub struct ResultsFile {
    pub results: Vec<GameResult>,
    pub warnings: Vec<String>,
}

/// Read every well-formed line of a result log. Blank lines are ignored,
/// malformed ones are skipped with a warning.
pub fn read_results(path: &Path) -> Result<ResultsFile> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let mut file = ResultsFile::default();
    for (idx, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<GameResult>(line) {
            Ok(result) => file.results.push(result),
            Err(err) => {
                let warning = format!("{}:{}: skipped malformed line: {err}", path.display(), idx + 1);
                warn!("{warning}");
                file.warnings.push(warning);
            }
        }
    }
    Ok(file)
}
