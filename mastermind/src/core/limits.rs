//! Session-wide safety limits.
//!
//! Limits are checked once before each turn begins, never mid-turn, so a turn
//! that is already running may overshoot them by its own retries.

use std::fmt;
use std::time::Duration;

/// Wall-clock and provider-call ceilings for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyLimits {
    pub timeout: Duration,
    pub max_calls: u32,
}

impl Default for SafetyLimits {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(300),
            max_calls: 100,
        }
    }
}

/// A limit that stopped the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitTripped {
    Timeout { limit: Duration },
    CallCap { max: u32 },
}

impl fmt::Display for LimitTripped {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitTripped::Timeout { limit } => {
                write!(f, "Game timeout after {}s (safety limit)", limit.as_secs_f64())
            }
            LimitTripped::CallCap { max } => write!(f, "Max API calls reached ({max}) (safety limit)"),
        }
    }
}

impl SafetyLimits {
    /// Return the first tripped limit. Timeout is checked before the call cap.
    ///
    /// The timeout trips once `elapsed` exceeds it, so a zero timeout trips on
    /// any measured session.
    pub fn check(&self, elapsed: Duration, calls: u32) -> Option<LimitTripped> {
        if elapsed > self.timeout {
            return Some(LimitTripped::Timeout {
                limit: self.timeout,
            });
        }
        if calls >= self.max_calls {
            return Some(LimitTripped::CallCap {
                max: self.max_calls,
            });
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn within_limits_is_none() {
        let limits = SafetyLimits::default();
        assert_eq!(limits.check(Duration::from_secs(10), 5), None);
    }

    #[test]
    fn zero_timeout_trips_immediately() {
        let limits = SafetyLimits {
            timeout: Duration::ZERO,
            max_calls: 100,
        };
        let tripped = limits.check(Duration::from_nanos(1), 0).expect("tripped");
        assert_eq!(tripped.to_string(), "Game timeout after 0s (safety limit)");
    }

    #[test]
    fn timeout_trips_only_past_the_ceiling() {
        let limits = SafetyLimits {
            timeout: Duration::from_secs(5),
            max_calls: 100,
        };
        assert_eq!(limits.check(Duration::from_secs(5), 0), None);
        assert!(limits.check(Duration::from_millis(5001), 0).is_some());
    }

    #[test]
    fn call_cap_trips_at_threshold() {
        let limits = SafetyLimits {
            timeout: Duration::from_secs(300),
            max_calls: 3,
        };
        assert_eq!(limits.check(Duration::from_secs(1), 2), None);
        let tripped = limits.check(Duration::from_secs(1), 3).expect("tripped");
        assert_eq!(tripped, LimitTripped::CallCap { max: 3 });
        assert_eq!(
            tripped.to_string(),
            "Max API calls reached (3) (safety limit)"
        );
    }

    #[test]
    fn timeout_wins_when_both_trip() {
        let limits = SafetyLimits {
            timeout: Duration::from_secs(5),
            max_calls: 1,
        };
        assert_eq!(
            limits.check(Duration::from_secs(6), 9),
            Some(LimitTripped::Timeout {
                limit: Duration::from_secs(5)
            })
        );
    }

    #[test]
    fn fractional_timeouts_keep_their_precision() {
        let tripped = LimitTripped::Timeout {
            limit: Duration::from_millis(50),
        };
        assert_eq!(tripped.to_string(), "Game timeout after 0.05s (safety limit)");
        let tripped = LimitTripped::Timeout {
            limit: Duration::from_secs(300),
        };
        assert_eq!(tripped.to_string(), "Game timeout after 300s (safety limit)");
    }
}
