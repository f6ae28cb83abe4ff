//! Human-in-the-loop backend: show the prompt, read back the pasted reply.
//!
//! The operator copies the prompt into any chat interface and pastes the
//! model's answer back. Replies span paragraphs, so one ends only at a line
//! holding [`END_MARKER`] or at end of input.

use std::io::{BufRead, Write};

use tracing::{debug, instrument};

use crate::core::types::{GameConfig, ProviderDescriptor, ProviderMode, TokenUsage, TurnRecord};
use crate::io::prompt::{PromptBuilder, PromptStyle};
use crate::providers::{GuessProvider, ProviderError, ProviderReply};

const RULE_WIDTH: usize = 70;

/// Line that terminates a pasted reply (case-insensitive).
pub const END_MARKER: &str = "END";

pub struct ManualProvider<R, W> {
    reader: R,
    writer: W,
    label: String,
    prompts: PromptBuilder,
}

impl<R: BufRead, W: Write> ManualProvider<R, W> {
    pub fn new(reader: R, writer: W, label: impl Into<String>, game: GameConfig) -> Self {
        Self {
            reader,
            writer,
            label: label.into(),
            prompts: PromptBuilder::new(game, PromptStyle::Strict),
        }
    }

    fn show(&mut self, prompt: &str) -> std::io::Result<()> {
        let rule = "=".repeat(RULE_WIDTH);
        writeln!(self.writer, "\n{rule}\nPROMPT\n{rule}\n{prompt}\n{rule}")?;
        writeln!(
            self.writer,
            "\nPaste this into your model's chat and paste its reply below."
        )?;
        writeln!(
            self.writer,
            "Finish with a line containing only {END_MARKER} (or Ctrl-D). Type 'quit' to stop.\n"
        )?;
        write!(self.writer, "Enter response: ")?;
        self.writer.flush()
    }

    /// Lines up to the end marker, blank lines included. `None` when the
    /// operator quits or nothing was pasted before the marker or end of input.
    fn read_reply(&mut self) -> std::io::Result<Option<String>> {
        let mut lines: Vec<String> = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            if self.reader.read_line(&mut line)? == 0 {
                break;
            }
            let text = line.trim_end_matches(['\r', '\n']);
            if text.trim().eq_ignore_ascii_case(END_MARKER) {
                break;
            }
            if lines.is_empty() {
                if text.trim().eq_ignore_ascii_case("quit") {
                    return Ok(None);
                }
                if text.trim().is_empty() {
                    continue;
                }
            }
            lines.push(text.to_string());
        }
        while lines.last().is_some_and(|last| last.trim().is_empty()) {
            lines.pop();
        }
        Ok((!lines.is_empty()).then(|| lines.join("\n")))
    }
}

impl<R: BufRead, W: Write> GuessProvider for ManualProvider<R, W> {
    #[instrument(skip_all, fields(label = %self.label, retry_count = retry_count))]
    fn next_guess(
        &mut self,
        history: &[TurnRecord],
        retry_count: u32,
    ) -> Result<ProviderReply, ProviderError> {
        let prompt = self.prompts.full(history, retry_count)?;
        self.show(&prompt)?;
        let Some(raw) = self.read_reply()? else {
            debug!("operator stopped the game");
            return Err(ProviderError::Interrupted);
        };
        Ok(ProviderReply::from_response(raw, Some(TokenUsage::default())).with_prompt(prompt))
    }

    fn descriptor(&self) -> ProviderDescriptor {
        ProviderDescriptor {
            mode: ProviderMode::Manual,
            model: self.label.clone(),
            temperature: None,
            max_tokens: None,
            parser_model: None,
        }
    }
}
