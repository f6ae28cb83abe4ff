//! Batch configuration merging.
//!
//! Applies suite overrides to the default `mastermind.toml` so every model in
//! a batch plays under identical rules.

use anyhow::Result;
use mastermind::io::config::MastermindConfig;

use crate::suite::SuiteFile;

/// Apply suite game rules and session overrides to the base config.
pub fn apply_suite_config(mut base: MastermindConfig, suite: &SuiteFile) -> Result<MastermindConfig> {
    base.game.colors = suite.game.colors;
    base.game.pegs = suite.game.pegs;
    base.game.allow_duplicates = suite.game.allow_duplicates;
    base.game.max_turns = suite.game.max_turns;
    if let Some(max_retries) = suite.session.max_retries {
        base.session.max_retries = max_retries;
    }
    if let Some(max_api_calls) = suite.session.max_api_calls {
        base.session.max_api_calls = max_api_calls;
    }
    if let Some(timeout_secs) = suite.session.timeout_secs {
        base.session.timeout_secs = timeout_secs;
    }
    base.validate()?;
    Ok(base)
}
