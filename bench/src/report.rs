use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::ValueEnum;
use mastermind::core::types::{GameResult, Outcome};
use mastermind::io::results_log::read_results;

use crate::results::round2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Markdown,
    Csv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutcomeArg {
    Win,
    Loss,
    Error,
}

impl From<OutcomeArg> for Outcome {
    fn from(arg: OutcomeArg) -> Self {
        match arg {
            OutcomeArg::Win => Outcome::Win,
            OutcomeArg::Loss => Outcome::Loss,
            OutcomeArg::Error => Outcome::Error,
        }
    }
}

/// Records kept by [`aggregate`]; `None` keeps everything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    /// Exact `llm_config.model` label.
    pub model: Option<String>,
    pub outcome: Option<Outcome>,
}

impl ReportFilter {
    fn keeps(&self, result: &GameResult) -> bool {
        self.model
            .as_ref()
            .is_none_or(|model| &result.llm_config.model == model)
            && self.outcome.is_none_or(|outcome| result.outcome == outcome)
    }
}

/// Aggregate statistics for one model label.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelSummary {
    pub model: String,
    pub mode: String,
    pub games: usize,
    pub wins: usize,
    pub losses: usize,
    pub errors: usize,
    pub win_rate: f64,
    pub avg_turns_when_won: f64,
    pub min_turns_won: Option<u32>,
    pub max_turns_won: Option<u32>,
    pub avg_duration_secs: f64,
    pub total_tokens: u64,
    pub avg_tokens_per_game: f64,
}

/// Read every file and summarize per model, best win rate first.
///
/// Unreadable files and malformed lines become warnings. Fails only when no
/// result survives reading and filtering.
pub fn aggregate(
    files: &[PathBuf],
    filter: &ReportFilter,
) -> Result<(Vec<ModelSummary>, Vec<String>)> {
    let mut warnings = Vec::new();
    let mut by_model: BTreeMap<String, Vec<GameResult>> = BTreeMap::new();

    for path in files {
        let file = match read_results(path) {
            Ok(file) => file,
            Err(err) => {
                warnings.push(format!("skip {}: {err:#}", path.display()));
                continue;
            }
        };
        warnings.extend(file.warnings);
        for result in file.results.into_iter().filter(|r| filter.keeps(r)) {
            by_model
                .entry(result.llm_config.model.clone())
                .or_default()
                .push(result);
        }
    }

    if by_model.is_empty() {
        bail!("no valid result records found");
    }

    let mut summaries: Vec<ModelSummary> = by_model
        .into_iter()
        .map(|(model, results)| summarize(model, &results))
        .collect();
    summaries.sort_by(|left, right| {
        right
            .win_rate
            .total_cmp(&left.win_rate)
            .then_with(|| left.model.cmp(&right.model))
    });
    Ok((summaries, warnings))
}

fn summarize(model: String, results: &[GameResult]) -> ModelSummary {
    let games = results.len();
    let count = |outcome: Outcome| results.iter().filter(|r| r.outcome == outcome).count();
    let wins = count(Outcome::Win);
    let won_turns: Vec<u32> = results
        .iter()
        .filter(|r| r.outcome == Outcome::Win)
        .map(|r| r.total_turns)
        .collect();
    let total_tokens: u64 = results
        .iter()
        .map(|r| r.total_tokens.input + r.total_tokens.output)
        .sum();
    let total_duration: f64 = results.iter().map(|r| r.duration_seconds).sum();
    let mode = results
        .first()
        .map(|r| r.llm_config.mode.as_str())
        .unwrap_or("api")
        .to_string();

    ModelSummary {
        model,
        mode,
        games,
        wins,
        losses: count(Outcome::Loss),
        errors: count(Outcome::Error),
        win_rate: ratio(wins as f64, games),
        avg_turns_when_won: round2(ratio(
            won_turns.iter().map(|&t| f64::from(t)).sum(),
            won_turns.len(),
        )),
        min_turns_won: won_turns.iter().copied().min(),
        max_turns_won: won_turns.iter().copied().max(),
        avg_duration_secs: round2(ratio(total_duration, games)),
        total_tokens,
        avg_tokens_per_game: (ratio(total_tokens as f64, games) * 10.0).round() / 10.0,
    }
}

fn ratio(total: f64, count: usize) -> f64 {
    if count == 0 {
        0.0
    } else {
        total / count as f64
    }
}

fn turn_range(summary: &ModelSummary) -> String {
    match (summary.min_turns_won, summary.max_turns_won) {
        (Some(min), Some(max)) => format!("{min}-{max}"),
        _ => "-".to_string(),
    }
}

pub fn render(summaries: &[ModelSummary], format: ReportFormat) -> String {
    match format {
        ReportFormat::Text => render_text(summaries),
        ReportFormat::Markdown => render_markdown(summaries),
        ReportFormat::Csv => render_csv(summaries),
    }
}

fn render_text(summaries: &[ModelSummary]) -> String {
    let mut out = String::new();
    for s in summaries {
        let _ = writeln!(
            out,
            "report: model={} mode={} games={} wins={} losses={} errors={} win_rate={:.1}%",
            s.model,
            s.mode,
            s.games,
            s.wins,
            s.losses,
            s.errors,
            s.win_rate * 100.0
        );
        let _ = writeln!(
            out,
            "report: model={} avg_turns_when_won={:.2} turns_won={} avg_duration_secs={:.2} total_tokens={} avg_tokens_per_game={:.1}",
            s.model,
            s.avg_turns_when_won,
            turn_range(s),
            s.avg_duration_secs,
            s.total_tokens,
            s.avg_tokens_per_game
        );
    }
    out
}

fn render_markdown(summaries: &[ModelSummary]) -> String {
    let mut out = String::from(
        "| Model | Mode | Games | Wins | Losses | Errors | Win rate | Avg turns (won) | Turns (won) | Avg duration (s) | Total tokens |\n\
         |---|---|---:|---:|---:|---:|---:|---:|---|---:|---:|\n",
    );
    for s in summaries {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {} | {} | {:.1}% | {:.2} | {} | {:.2} | {} |",
            s.model.replace('|', "\\|"),
            s.mode,
            s.games,
            s.wins,
            s.losses,
            s.errors,
            s.win_rate * 100.0,
            s.avg_turns_when_won,
            turn_range(s),
            s.avg_duration_secs,
            s.total_tokens
        );
    }
    out
}

fn render_csv(summaries: &[ModelSummary]) -> String {
    let mut out = String::from(
        "model,mode,games,wins,losses,errors,win_rate,avg_turns_when_won,min_turns_won,max_turns_won,avg_duration_secs,total_tokens,avg_tokens_per_game\n",
    );
    for s in summaries {
        let optional = |v: Option<u32>| v.map(|t| t.to_string()).unwrap_or_default();
        let _ = writeln!(
            out,
            "{},{},{},{},{},{},{:.4},{:.2},{},{},{:.2},{},{:.1}",
            csv_field(&s.model),
            s.mode,
            s.games,
            s.wins,
            s.losses,
            s.errors,
            s.win_rate,
            s.avg_turns_when_won,
            optional(s.min_turns_won),
            optional(s.max_turns_won),
            s.avg_duration_secs,
            s.total_tokens,
            s.avg_tokens_per_game
        );
    }
    out
}

/// Write a rendered report, creating parent directories.
pub fn write_report(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).with_context(|| format!("create {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::results::tests::game;
    use tempfile::tempdir;

    fn write_log(path: &Path, results: &[GameResult], extra: &str) {
        let mut contents = String::new();
        for result in results {
            contents.push_str(&serde_json::to_string(result).expect("json"));
            contents.push('\n');
        }
        contents.push_str(extra);
        fs::write(path, contents).expect("write log");
    }

    #[test]
    fn aggregates_across_files_by_model() {
        let dir = tempdir().expect("tempdir");
        let a = dir.path().join("a.jsonl");
        let b = dir.path().join("b.jsonl");
        write_log(
            &a,
            &[
                game("gpt", Outcome::Win, 4, 2.0, 100),
                game("claude-cli", Outcome::Loss, 12, 6.0, 0),
            ],
            "",
        );
        write_log(
            &b,
            &[
                game("gpt", Outcome::Win, 6, 4.0, 200),
                game("gpt", Outcome::Error, 1, 0.0, 0),
                game("claude-cli", Outcome::Win, 8, 3.0, 0),
            ],
            "not json\n",
        );

        let (summaries, warnings) =
            aggregate(&[a, b.clone()], &ReportFilter::default()).expect("aggregate");
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("b.jsonl:4"));

        assert_eq!(summaries[0].model, "gpt");
        let gpt = &summaries[0];
        assert_eq!((gpt.games, gpt.wins, gpt.losses, gpt.errors), (3, 2, 0, 1));
        assert_eq!(gpt.avg_turns_when_won, 5.0);
        assert_eq!((gpt.min_turns_won, gpt.max_turns_won), (Some(4), Some(6)));
        assert_eq!(gpt.avg_duration_secs, 2.0);
        assert_eq!(gpt.total_tokens, 450);
        assert_eq!(gpt.avg_tokens_per_game, 150.0);

        let claude = &summaries[1];
        assert_eq!(claude.win_rate, 0.5);
        assert_eq!(claude.total_tokens, 0);
    }

    #[test]
    fn missing_files_warn_but_empty_input_fails() {
        let dir = tempdir().expect("tempdir");
        let good = dir.path().join("good.jsonl");
        write_log(&good, &[game("m", Outcome::Loss, 12, 1.0, 0)], "");
        let (summaries, warnings) = aggregate(
            &[dir.path().join("missing.jsonl"), good],
            &ReportFilter::default(),
        )
        .expect("aggregate");
        assert_eq!(summaries.len(), 1);
        assert!(warnings[0].starts_with("skip "));

        let err = aggregate(&[dir.path().join("missing.jsonl")], &ReportFilter::default())
            .expect_err("no records");
        assert!(err.to_string().contains("no valid result records"));
    }

    #[test]
    fn filters_select_model_and_outcome() {
        let dir = tempdir().expect("tempdir");
        let log = dir.path().join("a.jsonl");
        write_log(
            &log,
            &[
                game("gpt", Outcome::Win, 4, 2.0, 100),
                game("gpt", Outcome::Loss, 12, 5.0, 300),
                game("claude-cli", Outcome::Win, 6, 3.0, 0),
            ],
            "",
        );
        let files = [log];

        let only_gpt = ReportFilter {
            model: Some("gpt".to_string()),
            outcome: None,
        };
        let (summaries, _) = aggregate(&files, &only_gpt).expect("aggregate");
        assert_eq!(summaries.len(), 1);
        assert_eq!((summaries[0].games, summaries[0].wins), (2, 1));

        let wins = ReportFilter {
            model: None,
            outcome: Some(OutcomeArg::Win.into()),
        };
        let (summaries, _) = aggregate(&files, &wins).expect("aggregate");
        assert_eq!(summaries.len(), 2);
        assert!(summaries.iter().all(|s| s.games == 1 && s.wins == 1));

        let nothing = ReportFilter {
            model: Some("gemini-cli".to_string()),
            outcome: None,
        };
        assert!(aggregate(&files, &nothing).is_err());
    }

    #[test]
    fn renders_every_format() {
        let summary = summarize(
            "a,b".to_string(),
            &[game("a,b", Outcome::Win, 3, 1.0, 10), game("a,b", Outcome::Loss, 12, 2.0, 0)],
        );
        let summaries = vec![summary];

        let text = render(&summaries, ReportFormat::Text);
        assert!(text.contains("report: model=a,b mode=api games=2 wins=1 losses=1 errors=0 win_rate=50.0%"));
        assert!(text.contains("turns_won=3-3"));

        let markdown = render(&summaries, ReportFormat::Markdown);
        assert!(markdown.starts_with("| Model |"));
        assert!(markdown.contains("| a,b | api | 2 | 1 | 1 | 0 | 50.0% | 3.00 | 3-3 | 1.50 | 15 |"));

        let csv = render(&summaries, ReportFormat::Csv);
        let row = csv.lines().nth(1).expect("row");
        assert!(row.starts_with("\"a,b\",api,2,1,1,0,0.5000,3.00,3,3,1.50,15,7.5"));

        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("reports").join("latest.csv");
        write_report(&path, &csv).expect("write report");
        assert_eq!(fs::read_to_string(&path).expect("read"), csv);
    }
}
