use serde::{Deserialize, Serialize};

/// Final state of one model's `mastermind play` process within a batch.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    /// Exited 0 and left a readable result log.
    Success,
    /// Exited non-zero.
    Failed,
    /// Killed at the process deadline.
    Timeout,
    /// Could not be started, or its result log was missing or empty.
    Error,
}

impl ModelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ModelStatus::Success => "success",
            ModelStatus::Failed => "failed",
            ModelStatus::Timeout => "timeout",
            ModelStatus::Error => "error",
        }
    }
}

/// Classify one finished attempt. A clean exit is provisional until the log is read.
pub fn classify_attempt(exit_code: Option<i32>, timed_out: bool) -> ModelStatus {
    if timed_out {
        return ModelStatus::Timeout;
    }
    match exit_code {
        Some(0) => ModelStatus::Success,
        Some(_) | None => ModelStatus::Failed,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_on_clean_exit() {
        assert_eq!(classify_attempt(Some(0), false), ModelStatus::Success);
    }

    #[test]
    fn timeout_wins_over_exit_code() {
        assert_eq!(classify_attempt(Some(0), true), ModelStatus::Timeout);
        assert_eq!(classify_attempt(None, true), ModelStatus::Timeout);
    }

    #[test]
    fn failed_on_nonzero_or_signal() {
        assert_eq!(classify_attempt(Some(1), false), ModelStatus::Failed);
        assert_eq!(classify_attempt(None, false), ModelStatus::Failed);
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&ModelStatus::Timeout).expect("serialize");
        assert_eq!(json, "\"timeout\"");
    }
}
