//! Stable exit codes for `mastermind` commands.

/// Command succeeded. Games that ended in `loss` or `error` still count as success.
pub const OK: i32 = 0;
/// Invalid arguments or configuration, or an I/O failure.
pub const INVALID: i32 = 1;
/// A second Ctrl-C arrived before the current game could be recorded.
pub const INTERRUPTED: i32 = 130;
