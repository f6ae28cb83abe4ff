//! Test-only helpers: a scripted guess provider and config builders.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use crate::core::types::{GameConfig, ProviderDescriptor, ProviderMode, TokenUsage, TurnRecord};
use crate::providers::{GuessProvider, ProviderError, ProviderReply};
use crate::session::SessionOptions;

/// One scripted provider call.
#[derive(Debug)]
pub enum Step {
    /// Reply with this raw text, parsed like any backend reply.
    Reply(String),
    /// Reply with text and token usage.
    Metered(String, TokenUsage),
    /// Sleep, then reply with the text.
    Stall(Duration, String),
    /// Raise the flag, as a Ctrl-C would, then reply with the text.
    Interrupt(Arc<AtomicBool>, String),
    Fail(ProviderError),
}

/// Provider that plays back a fixed list of steps and records how it was called.
#[derive(Debug)]
pub struct ScriptedProvider {
    steps: VecDeque<Step>,
    /// `(history length, retry_count)` for every call, in order.
    pub calls: Vec<(usize, u32)>,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: steps.into(),
            calls: Vec::new(),
        }
    }

    /// Every call answers with the same guess.
    pub fn repeating(guess: &[u32], times: usize) -> Self {
        Self::new((0..times).map(|_| Step::Reply(guess_json(guess))).collect())
    }
}

impl GuessProvider for ScriptedProvider {
    fn next_guess(
        &mut self,
        history: &[TurnRecord],
        retry_count: u32,
    ) -> Result<ProviderReply, ProviderError> {
        self.calls.push((history.len(), retry_count));
        match self.steps.pop_front() {
            Some(Step::Reply(raw)) => Ok(ProviderReply::from_response(raw, None)),
            Some(Step::Metered(raw, tokens)) => Ok(ProviderReply::from_response(raw, Some(tokens))),
            Some(Step::Stall(delay, raw)) => {
                thread::sleep(delay);
                Ok(ProviderReply::from_response(raw, None))
            }
            Some(Step::Interrupt(flag, raw)) => {
                flag.store(true, Ordering::SeqCst);
                Ok(ProviderReply::from_response(raw, None))
            }
            Some(Step::Fail(err)) => Err(err),
            None => Err(ProviderError::Request("script exhausted".to_string())),
        }
    }

    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            mode: ProviderMode::Manual,
            model: "scripted".to_string(),
            temperature: None,
            max_tokens: None,
            parser_model: None,
        }
    }
}

/// `{"guess": [..]}` for the given colors.
pub fn guess_json(colors: &[u32]) -> String {
    serde_json::json!({ "guess": colors }).to_string()
}

pub fn game_config(num_colors: u32, num_pegs: u32, allow_duplicates: bool, max_turns: Option<u32>) -> GameConfig {
    GameConfig {
        num_colors,
        num_pegs,
        allow_duplicates,
        max_turns,
    }
}

/// Default session options playing against a fixed secret.
pub fn options_with_secret(secret: &[u32]) -> SessionOptions {
    SessionOptions {
        secret: Some(secret.to_vec()),
        ..SessionOptions::default()
    }
}
