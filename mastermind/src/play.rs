//! `mastermind play`: resolve settings, run N games, append results.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Args, ValueEnum};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, instrument, warn};

use crate::core::game::Game;
use crate::core::types::Outcome;
use crate::io::config::{DEFAULT_CONFIG_PATH, MastermindConfig, load_config};
use crate::io::results_log::{append_result, default_output_path};
use crate::providers::cli::CliTool;
use crate::providers::{GuessProvider, ProviderChoice, build_provider};
use crate::session::GameSession;

/// Backend selection on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// `claude`, `codex` or `gemini` run as CLI tools, any other model goes to the API.
    Auto,
    Api,
    Cli,
    Manual,
}

#[derive(Debug, Clone, Args)]
pub struct PlayArgs {
    /// Configuration file; a missing file means built-in defaults.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,
    #[arg(long, value_enum, default_value_t = ModeArg::Auto)]
    pub mode: ModeArg,
    /// Model name (API), tool name (CLI) or label (manual).
    #[arg(long)]
    pub model: Option<String>,
    #[arg(long)]
    pub colors: Option<u32>,
    #[arg(long)]
    pub pegs: Option<u32>,
    #[arg(long)]
    pub no_duplicates: bool,
    #[arg(long, conflicts_with = "unlimited_turns")]
    pub max_turns: Option<u32>,
    #[arg(long)]
    pub unlimited_turns: bool,
    /// Fixed secret, e.g. `1,2,3,4`.
    #[arg(long)]
    pub secret: Option<String>,
    #[arg(long, default_value_t = 1)]
    pub runs: u32,
    /// Seed for secret generation.
    #[arg(long)]
    pub seed: Option<u64>,
    /// JSONL file to append to. Defaults to a timestamped file in `session.output_dir`.
    #[arg(long)]
    pub output: Option<PathBuf>,
    #[arg(long)]
    pub max_retries: Option<u32>,
    #[arg(long)]
    pub max_api_calls: Option<u32>,
    /// Per-game timeout in seconds.
    #[arg(long)]
    pub timeout: Option<u64>,
    #[arg(long)]
    pub temperature: Option<f64>,
    #[arg(long)]
    pub max_tokens: Option<u32>,
    #[arg(long)]
    pub parser_fallback: bool,
    #[arg(long)]
    pub parser_model: Option<String>,
    #[arg(short, long)]
    pub verbose: bool,
}

/// Outcome counts across the games of one invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PlaySummary {
    pub output: PathBuf,
    pub wins: u32,
    pub losses: u32,
    pub errors: u32,
}

impl PlaySummary {
    pub fn games(&self) -> u32 {
        self.wins + self.losses + self.errors
    }

    fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Win => self.wins += 1,
            Outcome::Loss => self.losses += 1,
            Outcome::Error => self.errors += 1,
        }
    }

    fn percent(&self, count: u32) -> f64 {
        match self.games() {
            0 => 0.0,
            games => f64::from(count) * 100.0 / f64::from(games),
        }
    }
}

/// Fold command-line overrides into the file configuration.
pub fn apply_overrides(cfg: &mut MastermindConfig, args: &PlayArgs) {
    if let Some(colors) = args.colors {
        cfg.game.colors = colors;
    }
    if let Some(pegs) = args.pegs {
        cfg.game.pegs = pegs;
    }
    if args.no_duplicates {
        cfg.game.allow_duplicates = false;
    }
    if let Some(max_turns) = args.max_turns {
        cfg.game.max_turns = max_turns;
    }
    if args.unlimited_turns {
        cfg.game.max_turns = 0;
    }
    if let Some(max_retries) = args.max_retries {
        cfg.session.max_retries = max_retries;
    }
    if let Some(max_api_calls) = args.max_api_calls {
        cfg.session.max_api_calls = max_api_calls;
    }
    if let Some(timeout) = args.timeout {
        cfg.session.timeout_secs = timeout;
    }
    if let Some(temperature) = args.temperature {
        cfg.api.temperature = temperature;
    }
    if let Some(max_tokens) = args.max_tokens {
        cfg.api.max_tokens = max_tokens;
    }
    if args.parser_fallback {
        cfg.api.parser_fallback = true;
    }
    if let Some(parser_model) = &args.parser_model {
        cfg.api.parser_model = parser_model.clone();
    }
}

/// Pick the backend from `--mode` and `--model`.
pub fn resolve_mode(mode: ModeArg, model: Option<&str>, manual_label: &str) -> Result<ProviderChoice> {
    let model = model.map(str::trim).filter(|m| !m.is_empty());
    match (mode, model) {
        (ModeArg::Manual, label) => Ok(ProviderChoice::Manual {
            label: label.unwrap_or(manual_label).to_string(),
        }),
        (_, None) => bail!("--model is required unless --mode manual"),
        (ModeArg::Auto, Some(model)) => Ok(match CliTool::from_model(model) {
            Some(tool) => ProviderChoice::Cli(tool),
            None => ProviderChoice::Api {
                model: model.to_string(),
            },
        }),
        (ModeArg::Api, Some(model)) => Ok(ProviderChoice::Api {
            model: model.to_string(),
        }),
        (ModeArg::Cli, Some(model)) => CliTool::from_model(model)
            .map(ProviderChoice::Cli)
            .with_context(|| {
                format!("unknown CLI tool '{model}' (expected claude, codex or gemini)")
            }),
    }
}

/// Parse `1,2,3,4` into colors. Range and arity are checked against the game later.
pub fn parse_secret(raw: &str) -> Result<Vec<u32>> {
    raw.split(',')
        .map(|part| {
            let part = part.trim();
            part.parse::<u32>()
                .with_context(|| format!("invalid secret color '{part}'"))
        })
        .collect()
}

/// Run `mastermind play` with progress lines written to `out`.
///
/// Raising `interrupt` ends the current game as an error at its next turn
/// boundary; that result is still appended and no further games start.
#[instrument(skip_all, fields(runs = args.runs))]
pub fn run_play<W: Write>(
    args: &PlayArgs,
    out: &mut W,
    interrupt: &Arc<AtomicBool>,
) -> Result<PlaySummary> {
    let mut cfg = load_config(&args.config)?;
    apply_overrides(&mut cfg, args);
    cfg.validate().context("invalid settings")?;
    let game_config = cfg.game_config();

    let choice = resolve_mode(args.mode, args.model.as_deref(), &cfg.manual.label)?;
    let secret = args.secret.as_deref().map(parse_secret).transpose()?;
    if let Some(secret) = &secret {
        Game::with_secret(game_config, secret.clone()).context("--secret")?;
    }
    if args.runs == 0 {
        bail!("--runs must be > 0");
    }

    let output = args.output.clone().unwrap_or_else(|| {
        default_output_path(Path::new(&cfg.session.output_dir), &Local::now())
    });
    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let mut provider = build_provider(&choice, &cfg)?;
    let model = provider.descriptor().model;
    info!(%model, output = %output.display(), "starting games");
    writeln!(
        out,
        "play: model={model} games={} output={}",
        args.runs,
        output.display()
    )?;

    let mut summary = PlaySummary {
        output: output.clone(),
        ..PlaySummary::default()
    };
    for game in 1..=args.runs {
        let mut options = cfg.session_options();
        options.secret = secret.clone();
        let session = GameSession::new(game_config, provider.as_mut(), options, &mut rng)?
            .with_interrupt(Arc::clone(interrupt));
        let result = session.run();
        append_result(&output, &result)?;
        summary.record(result.outcome);
        writeln!(
            out,
            "play: game={game}/{} outcome={} turns={}",
            args.runs,
            result.outcome.as_str(),
            result.total_turns
        )?;
        if interrupt.load(Ordering::SeqCst) && game < args.runs {
            warn!(played = game, requested = args.runs, "interrupted, skipping remaining games");
            writeln!(out, "play: interrupted, skipped {} game(s)", args.runs - game)?;
            break;
        }
    }

    writeln!(
        out,
        "summary: games={} wins={} ({:.1}%) losses={} ({:.1}%) errors={} ({:.1}%)",
        summary.games(),
        summary.wins,
        summary.percent(summary.wins),
        summary.losses,
        summary.percent(summary.losses),
        summary.errors,
        summary.percent(summary.errors)
    )?;
    writeln!(out, "results: {}", output.display())?;
    Ok(summary)
}
