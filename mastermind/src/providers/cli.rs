//! Local agent CLIs (`claude`, `codex`, `gemini`) as guess providers.
//!
//! Each guess spawns the tool once with the full prompt. These tools do not
//! report token usage, so replies carry zero counts.

use std::io;
use std::process::Command;
use std::time::Duration;

use clap::ValueEnum;
use serde_json::json;
use tracing::{debug, instrument, warn};

use crate::core::types::{GameConfig, ProviderDescriptor, ProviderMode, TokenUsage, TurnRecord};
use crate::io::config::CliSection;
use crate::io::process::run_command_with_timeout;
use crate::io::prompt::{PromptBuilder, PromptStyle};
use crate::providers::{GuessProvider, ProviderError, ProviderReply};

/// Supported agent command-line tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CliTool {
    Claude,
    Codex,
    Gemini,
}

impl CliTool {
    pub fn name(self) -> &'static str {
        match self {
            CliTool::Claude => "claude",
            CliTool::Codex => "codex",
            CliTool::Gemini => "gemini",
        }
    }

    /// Map a model name such as `claude` to its tool.
    pub fn from_model(model: &str) -> Option<Self> {
        match model.trim().to_ascii_lowercase().as_str() {
            "claude" => Some(CliTool::Claude),
            "codex" => Some(CliTool::Codex),
            "gemini" => Some(CliTool::Gemini),
            _ => None,
        }
    }
}

pub struct CliProvider {
    tool: CliTool,
    program: String,
    timeout: Duration,
    output_limit_bytes: usize,
    game: GameConfig,
    prompts: PromptBuilder,
}

impl CliProvider {
    pub fn new(tool: CliTool, game: GameConfig, settings: &CliSection) -> Self {
        let configured = match tool {
            CliTool::Claude => &settings.claude_program,
            CliTool::Codex => &settings.codex_program,
            CliTool::Gemini => &settings.gemini_program,
        };
        let program = if configured.trim().is_empty() {
            tool.name().to_string()
        } else {
            configured.clone()
        };
        Self {
            tool,
            program,
            timeout: Duration::from_secs(settings.timeout_secs),
            output_limit_bytes: settings.output_limit_bytes,
            game,
            prompts: PromptBuilder::new(game, PromptStyle::Explained),
        }
    }

    fn prompt(&self, history: &[TurnRecord], retry_count: u32) -> Result<String, ProviderError> {
        Ok(format!(
            "System: {}\n\nHuman: {}\n\nAssistant:",
            self.prompts.system()?,
            self.prompts.turn(history, retry_count)?
        ))
    }

    /// Structured-output schema handed to `claude`.
    fn guess_schema(&self) -> String {
        json!({
            "type": "object",
            "properties": {
                "guess": {
                    "type": "array",
                    "items": {"type": "integer"},
                    "minItems": self.game.num_pegs,
                    "maxItems": self.game.num_pegs,
                }
            },
            "required": ["guess"],
        })
        .to_string()
    }

    /// Command line for one call, plus stdin when the tool reads the prompt from it.
    fn command(&self, prompt: String) -> (Command, Option<String>) {
        let mut cmd = Command::new(&self.program);
        match self.tool {
            CliTool::Claude => {
                cmd.args(["--print", "--output-format", "json", "--json-schema"])
                    .arg(self.guess_schema());
                (cmd, Some(prompt))
            }
            CliTool::Codex => {
                cmd.arg("exec").arg(prompt);
                (cmd, None)
            }
            CliTool::Gemini => {
                cmd.args(["--output-format", "json"]).arg(prompt);
                (cmd, None)
            }
        }
    }

    fn tool_name(&self) -> String {
        self.tool.name().to_string()
    }
}

impl GuessProvider for CliProvider {
    #[instrument(skip_all, fields(tool = self.tool.name(), retry_count = retry_count))]
    fn next_guess(
        &mut self,
        history: &[TurnRecord],
        retry_count: u32,
    ) -> Result<ProviderReply, ProviderError> {
        let prompt = self.prompt(history, retry_count)?;
        let (cmd, stdin) = self.command(prompt);
        let output = run_command_with_timeout(
            cmd,
            stdin.as_deref().map(str::as_bytes),
            self.timeout,
            self.output_limit_bytes,
        )
        .map_err(|err| {
            let missing = err
                .chain()
                .filter_map(|cause| cause.downcast_ref::<io::Error>())
                .any(|io_err| io_err.kind() == io::ErrorKind::NotFound);
            if missing {
                ProviderError::NotFound {
                    tool: self.tool_name(),
                }
            } else {
                ProviderError::Command {
                    tool: self.tool_name(),
                    stderr: format!("{err:#}"),
                }
            }
        })?;

        if output.timed_out {
            return Err(ProviderError::Timeout {
                tool: self.tool_name(),
                secs: self.timeout.as_secs(),
            });
        }
        if !output.status.success() {
            let stderr = output.stderr_text();
            warn!(exit_code = ?output.status.code(), "cli tool failed");
            return Err(ProviderError::Command {
                tool: self.tool_name(),
                stderr: if stderr.is_empty() {
                    "Unknown error".to_string()
                } else {
                    stderr
                },
            });
        }

        let raw = output.stdout_text();
        debug!(bytes = raw.len(), "cli tool replied");
        Ok(ProviderReply::from_response(raw, Some(TokenUsage::default())))
    }

    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            mode: ProviderMode::Cli,
            model: format!("{}-cli", self.tool.name()),
            temperature: None,
            max_tokens: None,
            parser_model: None,
        }
    }
}
