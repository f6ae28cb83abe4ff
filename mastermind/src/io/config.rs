//! Benchmark configuration stored in `mastermind.toml`.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::types::GameConfig;
use crate::session::SessionOptions;

/// Default config file name, resolved against the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "mastermind.toml";

/// Benchmark configuration (TOML).
///
/// Edited by humans and generated by `bench`. Missing fields fall back to the
/// classic 6-color, 4-peg game with conservative safety limits.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MastermindConfig {
    pub game: GameSection,
    pub session: SessionSection,
    pub api: ApiSection,
    pub cli: CliSection,
    pub manual: ManualSection,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GameSection {
    pub colors: u32,
    pub pegs: u32,
    pub allow_duplicates: bool,
    /// `0` means unlimited turns.
    pub max_turns: u32,
}

impl Default for GameSection {
    fn default() -> Self {
        Self {
            colors: 6,
            pegs: 4,
            allow_duplicates: true,
            max_turns: 12,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SessionSection {
    /// Retries per turn after an unparseable or invalid guess.
    pub max_retries: u32,
    /// Turns a session may start before it is stopped.
    pub max_api_calls: u32,
    /// Wall-clock budget per game, checked between turns.
    pub timeout_secs: u64,
    /// Directory for timestamped result files when `--output` is not given.
    pub output_dir: String,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            max_retries: 1,
            max_api_calls: 100,
            timeout_secs: 300,
            output_dir: "outputs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ApiSection {
    /// OpenAI-compatible endpoint root for unprefixed and `openai/` models;
    /// `/chat/completions` is appended.
    pub base_url: String,
    /// Environment variable holding the bearer token for `base_url`.
    pub api_key_env: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub request_timeout_secs: u64,
    /// HTTP attempts per call, including the first.
    pub max_attempts: u32,
    pub retry_initial_delay_ms: u64,
    /// Ask `parser_model` to extract the guess when local parsing fails.
    pub parser_fallback: bool,
    pub parser_model: String,
    /// `anthropic/*` and bare `claude-*` models.
    pub anthropic: VendorEndpoint,
    /// `gemini/*` models.
    pub gemini: VendorEndpoint,
    /// `deepseek/*` models (OpenAI-compatible).
    pub deepseek: VendorEndpoint,
}

/// Endpoint root and key variable of one model vendor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VendorEndpoint {
    pub base_url: String,
    pub api_key_env: String,
}

impl VendorEndpoint {
    fn new(base_url: &str, api_key_env: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            api_key_env: api_key_env.to_string(),
        }
    }
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.7,
            max_tokens: 500,
            request_timeout_secs: 120,
            max_attempts: 3,
            retry_initial_delay_ms: 1000,
            parser_fallback: false,
            parser_model: "gpt-3.5-turbo".to_string(),
            anthropic: VendorEndpoint::new("https://api.anthropic.com/v1", "ANTHROPIC_API_KEY"),
            gemini: VendorEndpoint::new(
                "https://generativelanguage.googleapis.com/v1beta",
                "GEMINI_API_KEY",
            ),
            deepseek: VendorEndpoint::new("https://api.deepseek.com/v1", "DEEPSEEK_API_KEY"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CliSection {
    pub timeout_secs: u64,
    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,
    /// Executable overrides; empty means the tool name resolved on `PATH`.
    pub claude_program: String,
    pub codex_program: String,
    pub gemini_program: String,
}

impl Default for CliSection {
    fn default() -> Self {
        Self {
            timeout_secs: 120,
            output_limit_bytes: 100_000,
            claude_program: String::new(),
            codex_program: String::new(),
            gemini_program: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ManualSection {
    /// Recorded as the model name of manual games.
    pub label: String,
}

impl Default for ManualSection {
    fn default() -> Self {
        Self {
            label: "web-ui".to_string(),
        }
    }
}

impl MastermindConfig {
    pub fn validate(&self) -> Result<()> {
        self.game_config()
            .validate()
            .map_err(|err| anyhow!("game: {err}"))?;
        if self.session.max_api_calls == 0 {
            return Err(anyhow!("session.max_api_calls must be > 0"));
        }
        if self.session.output_dir.trim().is_empty() {
            return Err(anyhow!("session.output_dir must not be empty"));
        }
        if !(0.0..=2.0).contains(&self.api.temperature) {
            return Err(anyhow!("api.temperature must be between 0 and 2"));
        }
        if self.api.max_tokens == 0 {
            return Err(anyhow!("api.max_tokens must be > 0"));
        }
        if self.api.max_attempts == 0 {
            return Err(anyhow!("api.max_attempts must be > 0"));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(anyhow!("api.request_timeout_secs must be > 0"));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(anyhow!("api.base_url must not be empty"));
        }
        for (name, endpoint) in [
            ("anthropic", &self.api.anthropic),
            ("gemini", &self.api.gemini),
            ("deepseek", &self.api.deepseek),
        ] {
            if endpoint.base_url.trim().is_empty() {
                return Err(anyhow!("api.{name}.base_url must not be empty"));
            }
        }
        if self.cli.timeout_secs == 0 {
            return Err(anyhow!("cli.timeout_secs must be > 0"));
        }
        if self.cli.output_limit_bytes == 0 {
            return Err(anyhow!("cli.output_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn game_config(&self) -> GameConfig {
        GameConfig {
            num_colors: self.game.colors,
            num_pegs: self.game.pegs,
            allow_duplicates: self.game.allow_duplicates,
            max_turns: (self.game.max_turns > 0).then_some(self.game.max_turns),
        }
    }

    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            max_retries: self.session.max_retries,
            max_api_calls: self.session.max_api_calls,
            timeout: Duration::from_secs(self.session.timeout_secs),
            secret: None,
        }
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `MastermindConfig::default()`.
pub fn load_config(path: &Path) -> Result<MastermindConfig> {
    if !path.exists() {
        let cfg = MastermindConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: MastermindConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("validate {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &MastermindConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
