//! Prompt rendering for guess providers.
//!
//! Templates live in `prompts/` and are compiled into the binary. The system
//! prompt states the rules and the response format; the turn prompt replays
//! the recorded history and asks for the next guess.

use minijinja::{Environment, context};
use serde::Serialize;
use serde_json::Value;

use crate::core::types::{GameConfig, TurnRecord};

const SYSTEM_TEMPLATE: &str = include_str!("prompts/system.md");
const TURN_TEMPLATE: &str = include_str!("prompts/turn.md");
const RESCUE_TEMPLATE: &str = include_str!("prompts/rescue.md");

/// How strictly the response format is worded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    /// Bare JSON object only (API and manual backends).
    Strict,
    /// Reasoning allowed, JSON object at the end (CLI agents).
    Explained,
}

/// History entry as the turn template sees it.
#[derive(Debug, Clone, Serialize)]
struct HistoryLine {
    number: u32,
    guess: String,
    /// `Feedback: ...`, `Error: ...` or empty.
    outcome: String,
}

impl HistoryLine {
    fn from_record(record: &TurnRecord) -> Self {
        let outcome = match (&record.feedback, &record.error) {
            (Some(feedback), _) => format!("Feedback: {feedback}"),
            (None, Some(error)) => format!("Error: {error}"),
            (None, None) => String::new(),
        };
        Self {
            number: record.turn_number,
            guess: record
                .guess
                .as_deref()
                .map_or_else(|| "none".to_string(), format_list),
            outcome,
        }
    }
}

/// Renders prompts for one game configuration.
pub struct PromptBuilder {
    env: Environment<'static>,
    config: GameConfig,
    style: PromptStyle,
}

impl PromptBuilder {
    pub fn new(config: GameConfig, style: PromptStyle) -> Self {
        let mut env = Environment::new();
        env.add_template("system", SYSTEM_TEMPLATE)
            .expect("system template should be valid");
        env.add_template("turn", TURN_TEMPLATE)
            .expect("turn template should be valid");
        env.add_template("rescue", RESCUE_TEMPLATE)
            .expect("rescue template should be valid");
        Self { env, config, style }
    }

    pub fn style(&self) -> PromptStyle {
        self.style
    }

    pub fn system(&self) -> Result<String, minijinja::Error> {
        self.env.get_template("system")?.render(context! {
            num_pegs => self.config.num_pegs,
            max_color => self.config.num_colors.saturating_sub(1),
            allow_duplicates => self.config.allow_duplicates,
            max_turns => self.config.max_turns,
            explained => self.style == PromptStyle::Explained,
            example => self.example(),
        })
    }

    /// The per-turn user message. `retry_count > 0` asks for a corrected guess.
    pub fn turn(&self, history: &[TurnRecord], retry_count: u32) -> Result<String, minijinja::Error> {
        let lines: Vec<HistoryLine> = history.iter().map(HistoryLine::from_record).collect();
        self.env.get_template("turn")?.render(context! {
            history => lines,
            retry => retry_count > 0,
        })
    }

    /// System and turn prompt joined, for backends that take a single text.
    pub fn full(&self, history: &[TurnRecord], retry_count: u32) -> Result<String, minijinja::Error> {
        Ok(format!("{}\n\n{}", self.system()?, self.turn(history, retry_count)?))
    }

    /// Request asking a helper model to pull the guess out of `response`.
    pub fn rescue(&self, response: &str) -> Result<String, minijinja::Error> {
        self.env.get_template("rescue")?.render(context! {
            num_pegs => self.config.num_pegs,
            max_color => self.config.num_colors.saturating_sub(1),
            response => response,
            example => self.example(),
        })
    }

    fn example(&self) -> String {
        let colors = self.config.num_colors.max(1);
        let sample: Vec<Value> = (0..self.config.num_pegs)
            .map(|i| Value::from(i % colors))
            .collect();
        format_list(&sample)
    }
}

fn format_list(values: &[Value]) -> String {
    let items: Vec<String> = values.iter().map(Value::to_string).collect();
    format!("[{}]", items.join(", "))
}
