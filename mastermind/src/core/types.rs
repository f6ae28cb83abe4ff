//! Shared data types for games, turns and results.
//!
//! Everything here is serialized verbatim into the JSONL result log, so field
//! names are part of the on-disk format consumed by `bench report`.

use std::fmt;
use std::ops::AddAssign;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Rules for a single game. Immutable once a session starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameConfig {
    pub num_colors: u32,
    pub num_pegs: u32,
    pub allow_duplicates: bool,
    /// `None` means the game only ends on a win (or a safety limit).
    pub max_turns: Option<u32>,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            num_colors: 6,
            num_pegs: 4,
            allow_duplicates: true,
            max_turns: Some(12),
        }
    }
}

/// A game configuration that can never produce a playable secret.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("num_colors must be at least 2 (got {0})")]
    TooFewColors(u32),
    #[error("num_pegs must be at least 1")]
    NoPegs,
    #[error("need at least {num_pegs} colors when duplicates are not allowed (got {num_colors})")]
    NotEnoughColors { num_colors: u32, num_pegs: u32 },
    #[error("max_turns must be > 0 when set")]
    ZeroTurns,
}

impl GameConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.num_colors < 2 {
            return Err(ConfigError::TooFewColors(self.num_colors));
        }
        if self.num_pegs < 1 {
            return Err(ConfigError::NoPegs);
        }
        if !self.allow_duplicates && self.num_colors < self.num_pegs {
            return Err(ConfigError::NotEnoughColors {
                num_colors: self.num_colors,
                num_pegs: self.num_pegs,
            });
        }
        if self.max_turns == Some(0) {
            return Err(ConfigError::ZeroTurns);
        }
        Ok(())
    }
}

/// Peg feedback for one scored guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Feedback {
    /// Right color, right position.
    pub black: u32,
    /// Right color, wrong position.
    pub white: u32,
}

impl Feedback {
    /// Feedback recorded for a turn whose guess was never accepted.
    pub const ZERO: Feedback = Feedback { black: 0, white: 0 };
}

impl fmt::Display for Feedback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} black, {} white", self.black, self.white)
    }
}

/// Terminal classification of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Win,
    Loss,
    /// The harness aborted the run (safety limit or provider failure).
    Error,
}

impl Outcome {
    pub fn as_str(self) -> &'static str {
        match self {
            Outcome::Win => "win",
            Outcome::Loss => "loss",
            Outcome::Error => "error",
        }
    }
}

/// Token counters reported by a backend. Zero when the backend cannot report usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input: u64,
    pub output: u64,
}

impl AddAssign for TokenUsage {
    fn add_assign(&mut self, rhs: Self) {
        self.input += rhs.input;
        self.output += rhs.output;
    }
}

/// Which kind of backend produced the guesses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderMode {
    Api,
    Cli,
    Manual,
}

impl ProviderMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderMode::Api => "api",
            ProviderMode::Cli => "cli",
            ProviderMode::Manual => "manual",
        }
    }
}

/// Backend metadata stored as `llm_config` in each result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDescriptor {
    pub mode: ProviderMode,
    /// Model string (API), `{tool}-cli` (CLI) or a free-form label (manual).
    pub model: String,
    pub temperature: Option<f64>,
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parser_model: Option<String>,
}

/// One attempted turn. Appended once and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnRecord {
    pub turn_number: u32,
    pub raw_response: String,
    pub parsed: bool,
    /// The extracted guess exactly as the agent stated it.
    pub guess: Option<Vec<Value>>,
    pub feedback: Option<Feedback>,
    pub error: Option<String>,
    pub tokens: Option<TokenUsage>,
    /// Provider calls spent on this turn, retries included.
    #[serde(default)]
    pub attempts: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_shown: Option<String>,
}

impl TurnRecord {
    /// Synthetic record appended when the controller stops a session early.
    pub fn aborted(turn_number: u32, message: impl Into<String>) -> Self {
        Self {
            turn_number,
            raw_response: String::new(),
            parsed: false,
            guess: None,
            feedback: None,
            error: Some(message.into()),
            tokens: None,
            attempts: 0,
            prompt_shown: None,
        }
    }
}

/// Terminal summary of one session; one JSONL line in the result log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameResult {
    pub config: GameConfig,
    pub llm_config: ProviderDescriptor,
    pub secret: Vec<u32>,
    pub turns: Vec<TurnRecord>,
    pub outcome: Outcome,
    pub total_turns: u32,
    /// ISO-8601 UTC with a `Z` suffix.
    pub timestamp: String,
    pub duration_seconds: f64,
    pub total_tokens: TokenUsage,
}
