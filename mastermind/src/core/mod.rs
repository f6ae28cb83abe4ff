//! Deterministic, pure game logic.
//!
//! Core modules must be free of I/O side effects. Randomness is injected by
//! the caller so secrets are reproducible under a seed.

pub mod game;
pub mod limits;
pub mod parser;
pub mod scoring;
pub mod types;
