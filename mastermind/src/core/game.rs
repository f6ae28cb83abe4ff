//! Game state for one session: the secret, the turn tally and the won flag.

use anyhow::anyhow;
use rand::Rng;
use rand::seq::SliceRandom;
use serde_json::Value;
use thiserror::Error;

use crate::core::scoring::score;
use crate::core::types::{ConfigError, Feedback, GameConfig};

/// Why a guess (or an externally supplied secret) was rejected.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuessError {
    #[error("Guess must have exactly {expected} positions")]
    WrongLength { expected: u32 },
    #[error("All values must be integers")]
    NotInteger,
    #[error("All values must be between 0 and {max}")]
    OutOfRange { max: u32 },
    #[error("Duplicate colors not allowed in this game")]
    Duplicate,
}

/// One Mastermind game. Owns the secret and the turn counter.
#[derive(Debug, Clone)]
pub struct Game {
    config: GameConfig,
    secret: Vec<u32>,
    turns: u32,
    won: bool,
}

impl Game {
    /// Start a game with a freshly drawn secret.
    pub fn new<R: Rng>(config: GameConfig, rng: &mut R) -> Result<Self, ConfigError> {
        config.validate()?;
        let secret = generate_secret(&config, rng);
        Ok(Self::from_parts(config, secret))
    }

    /// Start a game against a known secret. The secret must obey the same rules as a guess.
    pub fn with_secret(config: GameConfig, secret: Vec<u32>) -> anyhow::Result<Self> {
        config.validate()?;
        check_code(&config, &secret).map_err(|err| anyhow!("invalid secret: {err}"))?;
        Ok(Self::from_parts(config, secret))
    }

    fn from_parts(config: GameConfig, secret: Vec<u32>) -> Self {
        Self {
            config,
            secret,
            turns: 0,
            won: false,
        }
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    pub fn secret(&self) -> &[u32] {
        &self.secret
    }

    pub fn turns_taken(&self) -> u32 {
        self.turns
    }

    pub fn won(&self) -> bool {
        self.won
    }

    /// Check a guess as stated by the agent and convert it to colors.
    ///
    /// Violations are reported in order: arity, integer type, range, uniqueness.
    pub fn validate(&self, guess: &[Value]) -> Result<Vec<u32>, GuessError> {
        if guess.len() != self.config.num_pegs as usize {
            return Err(GuessError::WrongLength {
                expected: self.config.num_pegs,
            });
        }
        let ints = guess
            .iter()
            .map(integer_value)
            .collect::<Option<Vec<Option<i64>>>>()
            .ok_or(GuessError::NotInteger)?;
        let colors = ints
            .into_iter()
            .map(|x| {
                x.and_then(|x| u32::try_from(x).ok())
                    .filter(|&c| c < self.config.num_colors)
            })
            .collect::<Option<Vec<u32>>>()
            .ok_or(GuessError::OutOfRange {
                max: self.config.num_colors - 1,
            })?;
        check_code(&self.config, &colors)?;
        Ok(colors)
    }

    /// Score a guess. Invalid guesses leave the game untouched.
    pub fn submit(&mut self, guess: &[Value]) -> Result<Feedback, GuessError> {
        let colors = self.validate(guess)?;
        self.turns += 1;
        let feedback = score(&self.secret, &colors);
        if feedback.black == self.config.num_pegs {
            self.won = true;
        }
        Ok(feedback)
    }

    /// Consume a turn without scoring anything.
    pub fn forfeit_turn(&mut self) {
        self.turns += 1;
    }

    pub fn is_over(&self) -> bool {
        if self.won {
            return true;
        }
        matches!(self.config.max_turns, Some(max) if self.turns >= max)
    }
}

/// Smallest magnitude a float can have only because an integer literal overflowed `i64`.
const I64_OVERFLOW: f64 = 9_223_372_036_854_775_808.0;

/// `None` when the value is not an integer; `Some(None)` for an integer too
/// large for `i64`, which JSON parsing turns into `u64` or a whole float.
fn integer_value(value: &Value) -> Option<Option<i64>> {
    if let Some(n) = value.as_i64() {
        return Some(Some(n));
    }
    if value.is_u64() {
        return Some(None);
    }
    value
        .as_f64()
        .filter(|f| f.fract() == 0.0 && f.abs() >= I64_OVERFLOW)
        .map(|_| None)
}

/// Arity, range and uniqueness checks shared by guesses and supplied secrets.
fn check_code(config: &GameConfig, code: &[u32]) -> Result<(), GuessError> {
    if code.len() != config.num_pegs as usize {
        return Err(GuessError::WrongLength {
            expected: config.num_pegs,
        });
    }
    if code.iter().any(|&c| c >= config.num_colors) {
        return Err(GuessError::OutOfRange {
            max: config.num_colors - 1,
        });
    }
    if !config.allow_duplicates {
        let mut seen = code.to_vec();
        seen.sort_unstable();
        seen.dedup();
        if seen.len() != code.len() {
            return Err(GuessError::Duplicate);
        }
    }
    Ok(())
}

/// Draw a secret: independent colors with duplicates, a shuffled prefix without.
pub fn generate_secret<R: Rng>(config: &GameConfig, rng: &mut R) -> Vec<u32> {
    if config.allow_duplicates {
        (0..config.num_pegs)
            .map(|_| rng.gen_range(0..config.num_colors))
            .collect()
    } else {
        let mut colors: Vec<u32> = (0..config.num_colors).collect();
        colors.shuffle(rng);
        colors.truncate(config.num_pegs as usize);
        colors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::parser::extract_guess;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use serde_json::json;

    fn values(xs: &[i64]) -> Vec<Value> {
        xs.iter().map(|&x| json!(x)).collect()
    }

    fn no_dup_config() -> GameConfig {
        GameConfig {
            num_colors: 6,
            num_pegs: 4,
            allow_duplicates: false,
            max_turns: Some(3),
        }
    }

    #[test]
    fn validate_reports_violations_in_order() {
        let game = Game::with_secret(no_dup_config(), vec![0, 1, 2, 3]).expect("game");

        let err = game.validate(&values(&[0, 1, 2])).unwrap_err();
        assert_eq!(err.to_string(), "Guess must have exactly 4 positions");

        let err = game
            .validate(&[json!(0), json!("one"), json!(9), json!(0)])
            .unwrap_err();
        assert_eq!(err, GuessError::NotInteger);

        let err = game.validate(&values(&[0, 0, 9, -1])).unwrap_err();
        assert_eq!(err.to_string(), "All values must be between 0 and 5");

        let err = game.validate(&values(&[0, 0, 1, 2])).unwrap_err();
        assert_eq!(err, GuessError::Duplicate);

        assert_eq!(game.validate(&values(&[3, 2, 1, 0])), Ok(vec![3, 2, 1, 0]));
    }

    #[test]
    fn float_entries_are_not_integers() {
        let game = Game::with_secret(GameConfig::default(), vec![0, 1, 2, 3]).expect("game");
        let err = game
            .validate(&[json!(0), json!(1.5), json!(2), json!(3)])
            .unwrap_err();
        assert_eq!(err, GuessError::NotInteger);
    }

    #[test]
    fn oversized_integers_are_out_of_range() {
        let game = Game::with_secret(GameConfig::default(), vec![0, 1, 2, 3]).expect("game");
        let guess = extract_guess(r#"{"guess": [0, 1, 2, 99999999999999999999]}"#).expect("parsed");
        assert_eq!(
            game.validate(&guess).unwrap_err().to_string(),
            "All values must be between 0 and 5"
        );
        let err = game
            .validate(&[json!(0), json!(1), json!(2), json!(u64::MAX)])
            .unwrap_err();
        assert_eq!(err, GuessError::OutOfRange { max: 5 });
        let err = game
            .validate(&[json!(0), json!(2.0), json!(2), json!(u64::MAX)])
            .unwrap_err();
        assert_eq!(err, GuessError::NotInteger);
    }

    #[test]
    fn rejected_guess_does_not_consume_a_turn() {
        let mut game = Game::with_secret(no_dup_config(), vec![0, 1, 2, 3]).expect("game");
        assert!(game.submit(&values(&[0, 0, 1, 2])).is_err());
        assert!(game.submit(&values(&[7, 1, 2, 3])).is_err());
        assert!(game.submit(&values(&[0, 1])).is_err());
        assert_eq!(game.turns_taken(), 0);
        assert!(!game.won());
    }

    #[test]
    fn winning_guess_sets_won_and_ends_game() {
        let mut game = Game::with_secret(GameConfig::default(), vec![0, 1, 2, 3]).expect("game");
        let feedback = game.submit(&values(&[0, 1, 3, 2])).expect("valid");
        assert_eq!(feedback, Feedback { black: 2, white: 2 });
        assert!(!game.is_over());

        let feedback = game.submit(&values(&[0, 1, 2, 3])).expect("valid");
        assert_eq!(feedback, Feedback { black: 4, white: 0 });
        assert!(game.won());
        assert!(game.is_over());
        assert_eq!(game.turns_taken(), 2);
    }

    #[test]
    fn max_turns_ends_game_including_forfeits() {
        let mut game = Game::with_secret(no_dup_config(), vec![0, 1, 2, 3]).expect("game");
        game.submit(&values(&[5, 4, 3, 2])).expect("valid");
        game.forfeit_turn();
        assert!(!game.is_over());
        game.forfeit_turn();
        assert!(game.is_over());
        assert!(!game.won());
    }

    #[test]
    fn unlimited_game_never_ends_without_win() {
        let config = GameConfig {
            max_turns: None,
            ..GameConfig::default()
        };
        let mut game = Game::with_secret(config, vec![0, 0, 0, 0]).expect("game");
        for _ in 0..50 {
            game.submit(&values(&[1, 1, 1, 1])).expect("valid");
        }
        assert!(!game.is_over());
    }

    #[test]
    fn supplied_secret_is_checked_against_config() {
        let err = Game::with_secret(no_dup_config(), vec![1, 1, 2, 3]).unwrap_err();
        assert!(err.to_string().contains("Duplicate"));
        let err = Game::with_secret(GameConfig::default(), vec![6, 1, 2, 3]).unwrap_err();
        assert!(err.to_string().contains("between 0 and 5"));
        let bad = GameConfig {
            num_colors: 1,
            ..GameConfig::default()
        };
        assert!(Game::with_secret(bad, vec![0, 0, 0, 0]).is_err());
    }

    #[test]
    fn generated_secret_respects_config() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            let secret = generate_secret(&no_dup_config(), &mut rng);
            assert_eq!(secret.len(), 4);
            assert!(secret.iter().all(|&c| c < 6));
            let mut sorted = secret.clone();
            sorted.sort_unstable();
            sorted.dedup();
            assert_eq!(sorted.len(), 4, "duplicates in {secret:?}");
        }
        let secret = generate_secret(&GameConfig::default(), &mut rng);
        assert!(secret.iter().all(|&c| c < 6));
    }

    #[test]
    fn seeded_rng_is_deterministic() {
        let a = Game::new(GameConfig::default(), &mut StdRng::seed_from_u64(42)).expect("game");
        let b = Game::new(GameConfig::default(), &mut StdRng::seed_from_u64(42)).expect("game");
        assert_eq!(a.secret(), b.secret());
    }

    #[test]
    fn exact_permutation_uses_every_color() {
        let config = GameConfig {
            num_colors: 4,
            num_pegs: 4,
            allow_duplicates: false,
            max_turns: None,
        };
        let mut secret = generate_secret(&config, &mut StdRng::seed_from_u64(1));
        secret.sort_unstable();
        assert_eq!(secret, vec![0, 1, 2, 3]);
    }
}
