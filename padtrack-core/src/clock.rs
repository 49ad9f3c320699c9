//! The mission countdown clock state machine.
//!
//! Time is a single signed second count: negative before the reference
//! instant (`T-`), non-negative after (`T+`), much like BC/AD year counting.
//! Ticking always moves in the positive direction, toward and through zero.
//! The state machine itself is synchronous; the engine owns the 1 Hz ticker
//! task that drives it while running.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Whether the clock is counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunMode {
    Held,
    Running,
}

impl fmt::Display for RunMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunMode::Held => write!(f, "held"),
            RunMode::Running => write!(f, "running"),
        }
    }
}

impl std::str::FromStr for RunMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "held" => Ok(RunMode::Held),
            "running" => Ok(RunMode::Running),
            other => Err(format!("unknown run mode '{other}'")),
        }
    }
}

/// A clock time string did not match `T-HHMMSS` / `T+HHMMSS`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid clock time '{0}': expected T-HHMMSS or T+HHMMSS")]
pub struct InvalidTimeFormat(pub String);

/// The countdown/count-up clock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CountdownClock {
    raw_seconds: i64,
    mode: RunMode,
}

impl CountdownClock {
    /// Creates a held clock from a `T±HHMMSS` string.
    pub fn new(time: &str) -> Result<Self, InvalidTimeFormat> {
        Ok(Self {
            raw_seconds: parse_time(time)?,
            mode: RunMode::Held,
        })
    }

    /// Overwrites the current time. Legal in either run mode.
    pub fn set_time(&mut self, time: &str) -> Result<(), InvalidTimeFormat> {
        self.raw_seconds = parse_time(time)?;
        Ok(())
    }

    /// Advances one second and returns the new raw time.
    pub fn tick(&mut self) -> i64 {
        self.raw_seconds += 1;
        self.raw_seconds
    }

    /// Raw signed seconds relative to the reference instant.
    pub fn raw(&self) -> i64 {
        self.raw_seconds
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub(crate) fn set_mode(&mut self, mode: RunMode) {
        self.mode = mode;
    }

    /// Renders the current time back to `T±HHMMSS`.
    pub fn time_string(&self) -> String {
        let sign = if self.raw_seconds < 0 { '-' } else { '+' };
        let total = self.raw_seconds.unsigned_abs();
        let hours = total / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        format!("T{sign}{hours:02}{minutes:02}{seconds:02}")
    }
}

/// Parses `T±HHMMSS` into signed seconds.
///
/// Exactly one sign character and six digits; anything else is rejected
/// rather than coerced.
fn parse_time(time: &str) -> Result<i64, InvalidTimeFormat> {
    let bytes = time.as_bytes();
    let valid = bytes.len() == 8
        && bytes[0] == b'T'
        && (bytes[1] == b'-' || bytes[1] == b'+')
        && bytes[2..].iter().all(u8::is_ascii_digit);
    if !valid {
        return Err(InvalidTimeFormat(time.to_string()));
    }

    let field = |a: usize, b: usize| -> i64 {
        time[a..b].parse().unwrap_or(0) // digits checked above
    };
    let total = field(2, 4) * 3600 + field(4, 6) * 60 + field(6, 8);
    Ok(if bytes[1] == b'-' { -total } else { total })
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[test]
    fn parses_t_minus_and_t_plus() -> TestResult {
        assert_eq!(CountdownClock::new("T-003000")?.raw(), -1800);
        assert_eq!(CountdownClock::new("T+010203")?.raw(), 3723);
        assert_eq!(CountdownClock::new("T-000000")?.raw(), 0);
        Ok(())
    }

    #[test]
    fn rejects_malformed_time_strings() {
        for bad in ["T-12345", "T-1234567", "T*000030", "X-000030", "T-0000a0", "", "T-"] {
            assert_eq!(
                CountdownClock::new(bad),
                Err(InvalidTimeFormat(bad.to_string())),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn renders_zero_padded_fields() -> TestResult {
        let mut clock = CountdownClock::new("T-003000")?;
        assert_eq!(clock.time_string(), "T-003000");
        clock.set_time("T+010203")?;
        assert_eq!(clock.time_string(), "T+010203");
        clock.set_time("T-000007")?;
        assert_eq!(clock.time_string(), "T-000007");
        Ok(())
    }

    #[test]
    fn ticks_through_zero_in_the_positive_direction() -> TestResult {
        let mut clock = CountdownClock::new("T-000002")?;
        assert_eq!(clock.tick(), -1);
        assert_eq!(clock.tick(), 0);
        assert_eq!(clock.time_string(), "T+000000");
        assert_eq!(clock.tick(), 1);
        assert_eq!(clock.time_string(), "T+000001");
        Ok(())
    }

    #[test]
    fn set_time_is_legal_in_either_mode() -> TestResult {
        let mut clock = CountdownClock::new("T-000100")?;
        clock.set_mode(RunMode::Running);
        clock.set_time("T+000500")?;
        assert_eq!(clock.raw(), 300);
        assert_eq!(clock.mode(), RunMode::Running);
        Ok(())
    }

    #[test]
    fn a_failed_set_leaves_the_clock_untouched() -> TestResult {
        let mut clock = CountdownClock::new("T-000030")?;
        assert!(clock.set_time("T-0030").is_err());
        assert_eq!(clock.raw(), -30);
        Ok(())
    }
}
