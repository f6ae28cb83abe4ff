//! I/O helpers: configuration, subprocesses, prompts and the result log.

pub mod config;
pub mod process;
pub mod prompt;
pub mod results_log;
