//! Suite file parsing and validation.
//!
//! A suite names the models to compare and the game they all play against
//! one shared secret. See `bench/suites/` for examples.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use mastermind::core::types::GameConfig;
use rand::Rng;
use serde::Deserialize;

/// A parsed suite file.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SuiteFile {
    pub suite: SuiteMeta,
    #[serde(default)]
    pub game: SuiteGame,
    #[serde(default)]
    pub execution: Execution,
    /// Per-game session overrides written into the batch `mastermind.toml`.
    #[serde(default)]
    pub session: SessionOverrides,
}

/// Suite metadata: identifier, contenders and games per contender.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SuiteMeta {
    /// Unique identifier (slug format: `[a-z0-9_-]+`).
    pub id: String,
    /// API model strings or CLI tool names (`claude`, `codex`, `gemini`).
    pub models: Vec<String>,
    #[serde(default = "default_runs")]
    pub runs: u32,
}

fn default_runs() -> u32 {
    1
}

/// Game rules shared by every model in the suite.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SuiteGame {
    pub colors: u32,
    pub pegs: u32,
    pub allow_duplicates: bool,
    /// `0` means unlimited turns.
    pub max_turns: u32,
    /// Drawn once per batch when omitted.
    pub secret: Option<Vec<u32>>,
}

impl Default for SuiteGame {
    fn default() -> Self {
        Self {
            colors: 6,
            pegs: 4,
            allow_duplicates: true,
            max_turns: 12,
            secret: None,
        }
    }
}

/// How the model processes are driven.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Execution {
    /// Run every model on its own thread.
    pub parallel: bool,
    /// Extra attempts for a model process that fails or times out.
    pub max_retries: u32,
    /// Wall-clock limit per model process.
    pub timeout_secs: u64,
}

impl Default for Execution {
    fn default() -> Self {
        Self {
            parallel: false,
            max_retries: 0,
            timeout_secs: 600,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
pub struct SessionOverrides {
    pub max_retries: Option<u32>,
    pub max_api_calls: Option<u32>,
    pub timeout_secs: Option<u64>,
}

impl SuiteFile {
    /// Load and validate a suite file from the given path.
    pub fn load(path: &Path) -> Result<Self> {
        let contents =
            fs::read_to_string(path).with_context(|| format!("read suite {}", path.display()))?;
        let suite: SuiteFile =
            toml::from_str(&contents).with_context(|| format!("parse suite {}", path.display()))?;
        suite
            .validate()
            .with_context(|| format!("validate suite {}", path.display()))?;
        Ok(suite)
    }

    #[cfg(test)]
    pub fn parse_str(contents: &str) -> Result<Self> {
        let suite: SuiteFile = toml::from_str(contents).context("parse suite")?;
        suite.validate()?;
        Ok(suite)
    }

    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            num_colors: self.game.colors,
            num_pegs: self.game.pegs,
            allow_duplicates: self.game.allow_duplicates,
            max_turns: (self.game.max_turns > 0).then_some(self.game.max_turns),
        }
    }

    /// The suite's fixed secret, or a fresh one drawn for this batch.
    pub fn resolve_secret<R: Rng>(&self, rng: &mut R) -> Vec<u32> {
        match &self.game.secret {
            Some(secret) => secret.clone(),
            None => mastermind::core::game::generate_secret(&self.game_config(), rng),
        }
    }

    fn validate(&self) -> Result<()> {
        validate_suite_id(&self.suite.id)?;
        if self.suite.models.is_empty() {
            bail!("suite.models must be a non-empty array");
        }
        for model in &self.suite.models {
            if model.trim().is_empty() {
                bail!("suite.models entries must be non-empty");
            }
        }
        let mut labels: Vec<String> = self.suite.models.iter().map(|m| model_slug(m)).collect();
        labels.sort();
        for pair in labels.windows(2) {
            if pair[0] == pair[1] {
                bail!("suite.models lists {} twice", pair[0]);
            }
        }
        if self.suite.runs == 0 {
            bail!("suite.runs must be > 0");
        }
        if self.execution.timeout_secs == 0 {
            bail!("execution.timeout_secs must be > 0");
        }
        if self.session.max_api_calls == Some(0) {
            bail!("session.max_api_calls must be > 0");
        }
        let config = self.game_config();
        config.validate().map_err(|err| anyhow!("game: {err}"))?;
        if let Some(secret) = &self.game.secret {
            mastermind::core::game::Game::with_secret(config, secret.clone())
                .context("game.secret")?;
        }
        Ok(())
    }
}

/// File-name-safe form of a model string (`deepseek/deepseek-chat` → `deepseek_deepseek-chat`).
pub fn model_slug(model: &str) -> String {
    model
        .trim()
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}

/// Path of the suite file `<dir>/<id>.toml`.
pub fn suite_path(dir: &Path, suite_id: &str) -> PathBuf {
    dir.join(format!("{suite_id}.toml"))
}

/// Discover and load all suite files from a directory.
///
/// Returns suites sorted by id. Errors if duplicate ids are found.
pub fn discover_suites(dir: &Path) -> Result<Vec<SuiteFile>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut suites = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("read suites dir {}", dir.display()))? {
        let entry = entry.context("read suite entry")?;
        let path = entry.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some("toml") {
            continue;
        }
        suites.push(SuiteFile::load(&path)?);
    }
    suites.sort_by(|left, right| left.suite.id.cmp(&right.suite.id));
    for pair in suites.windows(2) {
        if pair[0].suite.id == pair[1].suite.id {
            return Err(anyhow!("duplicate suite.id {}", pair[0].suite.id));
        }
    }
    Ok(suites)
}

fn validate_suite_id(id: &str) -> Result<()> {
    if id.trim().is_empty() {
        bail!("suite.id must be non-empty");
    }
    if !id
        .chars()
        .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit() || ch == '-' || ch == '_')
    {
        bail!("suite.id must use [a-z0-9_-] only");
    }
    Ok(())
}
