//! Batch summary persistence.
//!
//! One `<batch>_summary.json` per `bench run`, next to the per-model JSONL
//! logs it summarizes.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use mastermind::core::types::{GameConfig, GameResult, Outcome};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::outcome::ModelStatus;

/// Everything recorded about one batch, persisted as `<batch>_summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchSummary {
    pub batch_name: String,
    pub suite_id: String,
    /// SHA-256 of the suite file for reproducibility tracking.
    pub suite_hash: String,
    pub secret: Vec<u32>,
    pub config: GameConfig,
    pub runs_per_model: u32,
    pub parallel: bool,
    pub start_time: String,
    pub end_time: String,
    pub duration_secs: f64,
    pub models: Vec<ModelReport>,
}

/// How one model fared in the batch.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelReport {
    pub model: String,
    /// `cli` or `api`, as `mastermind play --mode auto` resolves it.
    pub mode: String,
    pub status: ModelStatus,
    /// Process attempts spent, retries included.
    pub attempts: u32,
    pub output_file: String,
    pub log_file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ModelStats>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelStats {
    pub runs: u32,
    pub wins: u32,
    pub losses: u32,
    pub errors: u32,
    /// Wins over requested runs.
    pub win_rate: f64,
    /// Mean `total_turns` over won games, `0` without wins.
    pub avg_turns_when_won: f64,
    pub total_duration: f64,
}

/// Tally a model's result log against the number of games it was asked to play.
pub fn stats_from_results(results: &[GameResult], runs: u32) -> ModelStats {
    let mut wins = 0u32;
    let mut losses = 0u32;
    let mut errors = 0u32;
    let mut won_turns = 0u64;
    let mut total_duration = 0.0;
    for result in results {
        match result.outcome {
            Outcome::Win => {
                wins += 1;
                won_turns += u64::from(result.total_turns);
            }
            Outcome::Loss => losses += 1,
            Outcome::Error => errors += 1,
        }
        total_duration += result.duration_seconds;
    }
    let avg_turns_when_won = if wins > 0 {
        round2(won_turns as f64 / f64::from(wins))
    } else {
        0.0
    };
    let win_rate = if runs > 0 {
        f64::from(wins) / f64::from(runs)
    } else {
        0.0
    };
    ModelStats {
        runs,
        wins,
        losses,
        errors,
        win_rate,
        avg_turns_when_won,
        total_duration: round2(total_duration),
    }
}

pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn write_summary(path: &Path, summary: &BatchSummary) -> Result<()> {
    let contents = serde_json::to_string_pretty(summary).context("serialize summary")?;
    fs::write(path, format!("{contents}\n"))
        .with_context(|| format!("write summary {}", path.display()))?;
    Ok(())
}

pub fn file_sha256(path: &Path) -> Result<String> {
    let contents = fs::read(path).with_context(|| format!("read {}", path.display()))?;
    let mut hasher = Sha256::new();
    hasher.update(contents);
    let digest = hasher.finalize();
    Ok(hex::encode(digest))
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use mastermind::core::types::{ProviderDescriptor, ProviderMode, TokenUsage};

    /// A finished game with just the fields the aggregations read.
    pub(crate) fn game(model: &str, outcome: Outcome, turns: u32, duration: f64, tokens: u64) -> GameResult {
        GameResult {
            config: GameConfig::default(),
            llm_config: ProviderDescriptor {
                mode: ProviderMode::Api,
                model: model.to_string(),
                temperature: Some(0.7),
                max_tokens: Some(500),
                parser_model: None,
            },
            secret: vec![0, 1, 2, 3],
            turns: Vec::new(),
            outcome,
            total_turns: turns,
            timestamp: "2026-01-01T00:00:00.000000Z".to_string(),
            duration_seconds: duration,
            total_tokens: TokenUsage {
                input: tokens,
                output: tokens / 2,
            },
        }
    }

    #[test]
    fn stats_average_turns_only_over_wins() {
        let results = vec![
            game("m", Outcome::Win, 4, 1.5, 0),
            game("m", Outcome::Win, 7, 2.25, 0),
            game("m", Outcome::Loss, 12, 3.0, 0),
            game("m", Outcome::Error, 2, 0.5, 0),
        ];
        let stats = stats_from_results(&results, 4);
        assert_eq!((stats.wins, stats.losses, stats.errors), (2, 1, 1));
        assert_eq!(stats.win_rate, 0.5);
        assert_eq!(stats.avg_turns_when_won, 5.5);
        assert_eq!(stats.total_duration, 7.25);
    }

    #[test]
    fn stats_without_games_are_zero() {
        let stats = stats_from_results(&[], 3);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.avg_turns_when_won, 0.0);
        assert_eq!(stats.runs, 3);
    }

    #[test]
    fn win_rate_uses_requested_runs() {
        // A process that crashed after one game still counts its missing games.
        let stats = stats_from_results(&[game("m", Outcome::Win, 3, 1.0, 0)], 4);
        assert_eq!(stats.win_rate, 0.25);
    }

    #[test]
    fn sha256_is_hex_of_contents() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("suite.toml");
        fs::write(&path, "abc").expect("write");
        assert_eq!(
            file_sha256(&path).expect("hash"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn model_report_omits_absent_fields() {
        let report = ModelReport {
            model: "claude".to_string(),
            mode: "cli".to_string(),
            status: ModelStatus::Timeout,
            attempts: 2,
            output_file: "out.jsonl".to_string(),
            log_file: "out.log".to_string(),
            error: None,
            stats: None,
        };
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["status"], "timeout");
        assert!(json.get("error").is_none());
        assert!(json.get("stats").is_none());
    }
}
