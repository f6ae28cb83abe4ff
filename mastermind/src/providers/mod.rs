//! Guess provider abstraction.
//!
//! The [`GuessProvider`] trait decouples the session controller from the
//! backend producing guesses (hosted API, local CLI tool, manual paste).
//! Tests use scripted providers that return predetermined replies without
//! network or process access.

pub mod api;
pub mod cli;
pub mod manual;
pub mod route;

use anyhow::Result;
use serde_json::Value;
use thiserror::Error;

use crate::core::parser::extract_guess;
use crate::core::types::{ProviderDescriptor, TokenUsage, TurnRecord};
use crate::io::config::MastermindConfig;
use crate::providers::api::ApiProvider;
use crate::providers::cli::{CliProvider, CliTool};
use crate::providers::manual::ManualProvider;

/// Message recorded on a reply whose text held no recognizable guess.
pub const PARSE_FAILURE: &str = "Failed to parse response";

/// What a backend produced for one call.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProviderReply {
    pub guess: Option<Vec<Value>>,
    pub raw_response: String,
    pub parsed: bool,
    pub error: Option<String>,
    pub tokens: Option<TokenUsage>,
    pub prompt_shown: Option<String>,
}

impl ProviderReply {
    /// Run the response parser over `raw` and wrap the outcome.
    pub fn from_response(raw: impl Into<String>, tokens: Option<TokenUsage>) -> Self {
        let raw_response = raw.into();
        let guess = extract_guess(&raw_response);
        Self::with_guess(raw_response, guess, tokens)
    }

    /// Wrap an already extracted guess (or the lack of one).
    pub fn with_guess(
        raw_response: String,
        guess: Option<Vec<Value>>,
        tokens: Option<TokenUsage>,
    ) -> Self {
        let parsed = guess.is_some();
        Self {
            guess,
            raw_response,
            parsed,
            error: (!parsed).then(|| PARSE_FAILURE.to_string()),
            tokens,
            prompt_shown: None,
        }
    }

    pub fn with_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.prompt_shown = Some(prompt.into());
        self
    }
}

/// Failures that end a session. Parse failures are not errors: they come back
/// as a reply with `parsed == false`.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{0}")]
    Request(String),
    #[error("{tool} CLI timed out after {secs} seconds")]
    Timeout { tool: String, secs: u64 },
    #[error("{tool} CLI not found. Please ensure '{tool}' is installed and in PATH")]
    NotFound { tool: String },
    #[error("{tool} CLI error: {stderr}")]
    Command { tool: String, stderr: String },
    #[error("User quit")]
    Interrupted,
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("render prompt: {0}")]
    Prompt(#[from] minijinja::Error),
}

/// A backend that turns game history into the next guess.
pub trait GuessProvider {
    /// Produce a guess given the turns recorded so far.
    ///
    /// `retry_count` is zero on the first attempt of a turn and increments on
    /// every retry of the same turn.
    fn next_guess(
        &mut self,
        history: &[TurnRecord],
        retry_count: u32,
    ) -> Result<ProviderReply, ProviderError>;

    /// Metadata written as `llm_config` in the game result.
    fn descriptor(&self) -> ProviderDescriptor;
}

impl<P: GuessProvider + ?Sized> GuessProvider for Box<P> {
    fn next_guess(
        &mut self,
        history: &[TurnRecord],
        retry_count: u32,
    ) -> Result<ProviderReply, ProviderError> {
        (**self).next_guess(history, retry_count)
    }

    fn descriptor(&self) -> ProviderDescriptor {
        (**self).descriptor()
    }
}

/// Which backend a game is played with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderChoice {
    Api { model: String },
    Cli(CliTool),
    Manual { label: String },
}

/// Construct the backend for `choice` from the loaded configuration.
///
/// The manual backend is wired to the process's stdin and stdout.
pub fn build_provider(
    choice: &ProviderChoice,
    config: &MastermindConfig,
) -> Result<Box<dyn GuessProvider>> {
    let game = config.game_config();
    let provider: Box<dyn GuessProvider> = match choice {
        ProviderChoice::Api { model } => {
            Box::new(ApiProvider::new(model.clone(), game, config.api.clone())?)
        }
        ProviderChoice::Cli(tool) => Box::new(CliProvider::new(*tool, game, &config.cli)),
        ProviderChoice::Manual { label } => Box::new(ManualProvider::new(
            std::io::stdin().lock(),
            std::io::stdout(),
            label.clone(),
            game,
        )),
    };
    Ok(provider)
}
