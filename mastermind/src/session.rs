//! Session controller: drives one game against a guess provider.
//!
//! Each turn asks the provider for a guess, retries on parse failures and
//! invalid guesses, then scores and records the turn. Safety limits are checked
//! before every turn. Exactly one [`GameResult`] comes out of every session.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::{SecondsFormat, Utc};
use rand::Rng;
use tracing::{debug, info, instrument, warn};

use crate::core::game::Game;
use crate::core::limits::{LimitTripped, SafetyLimits};
use crate::core::types::{Feedback, GameConfig, GameResult, Outcome, TokenUsage, TurnRecord};
use crate::providers::{GuessProvider, ProviderError};

/// Error recorded on a turn whose attempts all failed to parse.
pub const RETRIES_EXHAUSTED: &str = "Failed to get valid guess after retries";

/// Per-session knobs besides the game rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    /// Extra attempts allowed per turn after the first one.
    pub max_retries: u32,
    /// Turns that may be started before the session is stopped.
    pub max_api_calls: u32,
    pub timeout: Duration,
    /// Play against this code instead of drawing one.
    pub secret: Option<Vec<u32>>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            max_retries: 1,
            max_api_calls: 100,
            timeout: Duration::from_secs(300),
            secret: None,
        }
    }
}

impl SessionOptions {
    fn limits(&self) -> SafetyLimits {
        SafetyLimits {
            timeout: self.timeout,
            max_calls: self.max_api_calls,
        }
    }
}

/// Why a session stopped before the game ended.
#[derive(Debug)]
pub enum SessionAbort {
    Limit(LimitTripped),
    Provider(ProviderError),
    /// The operator asked the process to stop.
    Interrupted,
}

impl fmt::Display for SessionAbort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionAbort::Limit(tripped) => write!(f, "{tripped}"),
            SessionAbort::Provider(err) => write!(f, "Fatal error: {err}"),
            SessionAbort::Interrupted => f.write_str("Interrupted by user"),
        }
    }
}

/// One game between a provider and a freshly built [`Game`].
pub struct GameSession<'a, P: GuessProvider + ?Sized> {
    game: Game,
    provider: &'a mut P,
    max_retries: u32,
    limits: SafetyLimits,
    interrupt: Option<Arc<AtomicBool>>,
    turns: Vec<TurnRecord>,
}

impl<'a, P: GuessProvider + ?Sized> GameSession<'a, P> {
    /// Validate the configuration (and supplied secret, if any) and set up the game.
    pub fn new<R: Rng>(
        config: GameConfig,
        provider: &'a mut P,
        options: SessionOptions,
        rng: &mut R,
    ) -> Result<Self> {
        let game = match options.secret.clone() {
            Some(secret) => Game::with_secret(config, secret)?,
            None => Game::new(config, rng)?,
        };
        Ok(Self {
            game,
            provider,
            max_retries: options.max_retries,
            limits: options.limits(),
            interrupt: None,
            turns: Vec::new(),
        })
    }

    /// Stop at the next turn boundary once `flag` is raised.
    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    pub fn secret(&self) -> &[u32] {
        self.game.secret()
    }

    /// Play the game to completion and summarize it.
    #[instrument(skip_all, fields(model = %self.provider.descriptor().model))]
    pub fn run(mut self) -> GameResult {
        let started = Instant::now();
        info!(secret = ?self.game.secret(), "session started");

        let mut started_turns = 0u32;
        let mut aborted = false;
        while !self.game.is_over() {
            if self.interrupted() {
                warn!("interrupted, stopping session");
                self.abort(SessionAbort::Interrupted, None);
                aborted = true;
                break;
            }
            if let Some(tripped) = self.limits.check(started.elapsed(), started_turns) {
                warn!(%tripped, "safety limit reached");
                self.abort(SessionAbort::Limit(tripped), None);
                aborted = true;
                break;
            }
            started_turns += 1;
            match self.play_turn() {
                Ok(record) => self.turns.push(record),
                Err((abort, tokens)) => {
                    warn!(%abort, "turn aborted");
                    self.abort(abort, tokens);
                    aborted = true;
                    break;
                }
            }
        }

        let outcome = if self.game.won() {
            Outcome::Win
        } else if aborted {
            Outcome::Error
        } else {
            Outcome::Loss
        };
        let total_tokens = self
            .turns
            .iter()
            .filter_map(|turn| turn.tokens)
            .fold(TokenUsage::default(), |mut acc, tokens| {
                acc += tokens;
                acc
            });
        let duration = started.elapsed().as_secs_f64();

        info!(outcome = outcome.as_str(), turns = self.game.turns_taken(), "session finished");
        GameResult {
            config: *self.game.config(),
            llm_config: self.provider.descriptor(),
            secret: self.game.secret().to_vec(),
            outcome,
            total_turns: self.game.turns_taken(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
            duration_seconds: (duration * 100.0).round() / 100.0,
            total_tokens,
            turns: self.turns,
        }
    }

    /// Record the synthetic last turn, keeping usage spent on the abandoned turn.
    fn abort(&mut self, reason: SessionAbort, tokens: Option<TokenUsage>) {
        let turn_number = self.next_turn_number();
        let mut record = TurnRecord::aborted(turn_number, reason.to_string());
        record.tokens = tokens;
        self.turns.push(record);
    }

    fn next_turn_number(&self) -> u32 {
        u32::try_from(self.turns.len()).map_or(u32::MAX, |n| n.saturating_add(1))
    }

    /// Run one turn including retries. Returns the record to append, or the
    /// abort reason with the usage already spent on this turn.
    fn play_turn(&mut self) -> Result<TurnRecord, (SessionAbort, Option<TokenUsage>)> {
        let turn_number = self.next_turn_number();
        let mut tokens: Option<TokenUsage> = None;
        let mut retry_count = 0u32;

        loop {
            if retry_count > 0 && self.interrupted() {
                return Err((SessionAbort::Interrupted, tokens));
            }
            let reply = match self.provider.next_guess(&self.turns, retry_count) {
                Ok(reply) => reply,
                Err(err) => return Err((SessionAbort::Provider(err), tokens)),
            };
            if let Some(usage) = reply.tokens {
                *tokens.get_or_insert_with(TokenUsage::default) += usage;
            }
            let can_retry = retry_count < self.max_retries;
            let mut record = TurnRecord {
                turn_number,
                raw_response: reply.raw_response,
                parsed: reply.parsed,
                guess: None,
                feedback: None,
                error: None,
                tokens,
                attempts: retry_count + 1,
                prompt_shown: reply.prompt_shown,
            };

            let Some(guess) = reply.guess.filter(|_| reply.parsed) else {
                if can_retry {
                    debug!(turn_number, retry_count, "unparseable reply, retrying");
                    retry_count += 1;
                    continue;
                }
                self.game.forfeit_turn();
                record.error = Some(RETRIES_EXHAUSTED.to_string());
                return Ok(record);
            };

            match self.game.submit(&guess) {
                Ok(feedback) => {
                    debug!(turn_number, %feedback, "guess scored");
                    record.guess = Some(guess);
                    record.feedback = Some(feedback);
                    return Ok(record);
                }
                Err(err) => {
                    if can_retry {
                        debug!(turn_number, retry_count, %err, "invalid guess, retrying");
                        retry_count += 1;
                        continue;
                    }
                    self.game.forfeit_turn();
                    record.guess = Some(guess);
                    record.error = Some(err.to_string());
                    record.feedback = Some(Feedback::ZERO);
                    return Ok(record);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::{ProviderDescriptor, ProviderMode};
    use crate::providers::ProviderReply;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Replies with the same text forever and counts calls.
    struct EchoProvider {
        text: String,
        calls: u32,
    }

    impl GuessProvider for EchoProvider {
        fn next_guess(
            &mut self,
            _history: &[TurnRecord],
            _retry_count: u32,
        ) -> Result<ProviderReply, ProviderError> {
            self.calls += 1;
            Ok(ProviderReply::from_response(self.text.clone(), None))
        }

        fn descriptor(&self) -> ProviderDescriptor {
            ProviderDescriptor {
                mode: ProviderMode::Manual,
                model: "echo".to_string(),
                temperature: None,
                max_tokens: None,
                parser_model: None,
            }
        }
    }

    fn options(secret: &[u32]) -> SessionOptions {
        SessionOptions {
            secret: Some(secret.to_vec()),
            ..SessionOptions::default()
        }
    }

    #[test]
    fn abort_reasons_render_record_messages() {
        let abort = SessionAbort::Provider(ProviderError::Interrupted);
        assert_eq!(abort.to_string(), "Fatal error: User quit");
        let abort = SessionAbort::Limit(LimitTripped::CallCap { max: 7 });
        assert_eq!(abort.to_string(), "Max API calls reached (7) (safety limit)");
        assert_eq!(SessionAbort::Interrupted.to_string(), "Interrupted by user");
    }

    #[test]
    fn raised_flag_stops_before_the_first_call() {
        let mut provider = EchoProvider {
            text: "{\"guess\": [0, 1, 2, 3]}".to_string(),
            calls: 0,
        };
        let flag = Arc::new(AtomicBool::new(true));
        let result = GameSession::new(
            GameConfig::default(),
            &mut provider,
            options(&[0, 1, 2, 3]),
            &mut StdRng::seed_from_u64(0),
        )
        .expect("session")
        .with_interrupt(flag)
        .run();

        assert_eq!(provider.calls, 0);
        assert_eq!(result.outcome, Outcome::Error);
        assert_eq!(result.total_turns, 0);
        assert_eq!(result.turns[0].error.as_deref(), Some("Interrupted by user"));
    }

    #[test]
    fn unparseable_provider_loses_after_max_turns() {
        let mut provider = EchoProvider {
            text: "pass".to_string(),
            calls: 0,
        };
        let config = GameConfig {
            max_turns: Some(3),
            ..GameConfig::default()
        };
        let session = GameSession::new(
            config,
            &mut provider,
            options(&[0, 1, 2, 3]),
            &mut StdRng::seed_from_u64(0),
        )
        .expect("session");
        let result = session.run();

        assert_eq!(result.outcome, Outcome::Loss);
        assert_eq!(result.total_turns, 3);
        assert_eq!(result.turns.len(), 3);
        assert!(
            result
                .turns
                .iter()
                .all(|t| t.error.as_deref() == Some(RETRIES_EXHAUSTED) && t.attempts == 2)
        );
        assert_eq!(provider.calls, 6);
    }

    #[test]
    fn invalid_secret_is_rejected_before_play() {
        let mut provider = EchoProvider {
            text: String::new(),
            calls: 0,
        };
        let result = GameSession::new(
            GameConfig::default(),
            &mut provider,
            options(&[0, 1, 2]),
            &mut StdRng::seed_from_u64(0),
        );
        assert!(result.is_err());
        assert_eq!(provider.calls, 0);
    }

    #[test]
    fn drawn_secret_follows_the_rng() {
        let mut a = EchoProvider {
            text: String::new(),
            calls: 0,
        };
        let mut b = EchoProvider {
            text: String::new(),
            calls: 0,
        };
        let first = GameSession::new(
            GameConfig::default(),
            &mut a,
            SessionOptions::default(),
            &mut StdRng::seed_from_u64(11),
        )
        .expect("session");
        let second = GameSession::new(
            GameConfig::default(),
            &mut b,
            SessionOptions::default(),
            &mut StdRng::seed_from_u64(11),
        )
        .expect("session");
        assert_eq!(first.secret(), second.secret());
    }
}
