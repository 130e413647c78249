//! Human readable duration expressions.
//!
//! ```
//! use redis_dataloader::duration::parse;
//!
//! assert_eq!(parse("1 day"), 86_400_000);
//! assert_eq!(parse("1d"), 86_400_000);
//! assert_eq!(parse("5sec"), 5_000);
//! assert_eq!(parse("garbage"), 0);
//! ```

use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

const MAX_INPUT_LEN: usize = 100;

const SECOND: f64 = 1_000.0;
const MINUTE: f64 = 60.0 * SECOND;
const HOUR: f64 = 60.0 * MINUTE;
const DAY: f64 = 24.0 * HOUR;
const WEEK: f64 = 7.0 * DAY;
const YEAR: f64 = 365.25 * DAY;
const MONTH: f64 = YEAR / 12.0;

lazy_static! {
    static ref DURATION_RE: Regex = Regex::new(
        r"^(\d*\.?\d+) *(month?|months?|milliseconds?|msecs?|ms|seconds?|secs?|s|minutes?|mins?|m|hours?|hrs?|h|days?|d|weeks?|w|years?|yrs?|y)?$"
    )
    .expect("duration pattern is valid");
}

/// Converts a duration expression to milliseconds.
///
/// A missing unit means milliseconds. Input that does not parse, or is longer than 100
/// characters, yields `0`. Surrounding whitespace is not accepted.
pub fn parse(input: &str) -> u64 {
    let value = input.to_lowercase();
    if value.len() > MAX_INPUT_LEN {
        return 0;
    }
    let Some(caps) = DURATION_RE.captures(&value) else {
        return 0;
    };
    let Ok(amount) = caps[1].parse::<f64>() else {
        return 0;
    };
    let unit = caps.get(2).map_or("ms", |m| m.as_str());
    (amount * factor(unit)).round() as u64
}

fn factor(unit: &str) -> f64 {
    if unit.starts_with("ms") || unit.starts_with("mil") {
        1.0
    } else if unit.starts_with("mo") {
        MONTH
    } else if unit.starts_with('s') {
        SECOND
    } else if unit.starts_with('m') {
        MINUTE
    } else if unit.starts_with('h') {
        HOUR
    } else if unit.starts_with('d') {
        DAY
    } else if unit.starts_with('w') {
        WEEK
    } else {
        YEAR
    }
}

/// A cache lifetime, either as raw milliseconds or as an expression such as `"12 days"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expiration {
    Millis(u64),
    Text(String),
}

impl Expiration {
    /// Do not write to the remote cache.
    pub const NEVER: Expiration = Expiration::Millis(0);

    pub fn as_millis(&self) -> u64 {
        match self {
            Expiration::Millis(ms) => *ms,
            Expiration::Text(text) => parse(text),
        }
    }
}

impl Default for Expiration {
    fn default() -> Self {
        Expiration::NEVER
    }
}

impl fmt::Display for Expiration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expiration::Millis(ms) => write!(f, "{}ms", ms),
            Expiration::Text(text) => f.write_str(text),
        }
    }
}

impl From<u64> for Expiration {
    fn from(ms: u64) -> Self {
        Expiration::Millis(ms)
    }
}

impl From<std::time::Duration> for Expiration {
    fn from(duration: std::time::Duration) -> Self {
        Expiration::Millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }
}

impl From<&str> for Expiration {
    fn from(text: &str) -> Self {
        Expiration::Text(text.to_string())
    }
}

impl From<String> for Expiration {
    fn from(text: String) -> Self {
        Expiration::Text(text)
    }
}
