//! Mastermind benchmark for language-model agents.
//!
//! Agents play Mastermind through interchangeable guess providers (hosted API,
//! local CLI tool, manual paste) and every game is recorded as one JSON line.
//!
//! - **[`core`]**: Pure, deterministic logic (scoring, response parsing, game
//!   state, safety limits). No I/O.
//! - **[`io`]**: Side effects (configuration, subprocesses, prompts, result log).
//! - **[`providers`]**: The [`providers::GuessProvider`] backends.
//!
//! [`session`] drives one game; [`play`] implements the `mastermind play` command.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod play;
pub mod providers;
pub mod session;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
