//! Call timestamp interpretation.

use super::NormalizationError;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Timestamp value as found in the payload, before interpretation
#[derive(Debug, Clone, PartialEq)]
pub enum RawTimestamp {
    Number(f64),
    Text(String),
}

/// Unit a numeric epoch value is read in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochUnit {
    Seconds,
    Milliseconds,
}

/// Rule for telling epoch seconds from epoch milliseconds
///
/// Values below `seconds_below` are seconds, everything else milliseconds.
/// The default of 100,000,000,000 is year 5138 read as seconds and early
/// 1973 read as milliseconds, so any real call date lands on the right side.
/// A second-based value past 5138 or a millisecond-based one before March
/// 1973 would be misread.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpochUnitPolicy {
    pub seconds_below: f64,
}

impl Default for EpochUnitPolicy {
    fn default() -> Self {
        Self {
            seconds_below: 100_000_000_000.0,
        }
    }
}

impl EpochUnitPolicy {
    pub fn classify(&self, value: f64) -> EpochUnit {
        if value < self.seconds_below {
            EpochUnit::Seconds
        } else {
            EpochUnit::Milliseconds
        }
    }

    /// Convert an epoch value to an instant
    ///
    /// Fractional milliseconds are truncated toward zero.
    pub fn to_datetime(&self, value: f64) -> Option<DateTime<Utc>> {
        let millis = match self.classify(value) {
            EpochUnit::Seconds => value * 1000.0,
            EpochUnit::Milliseconds => value,
        }
        .trunc();

        // i64::MAX as f64 rounds up, so the upper check must be exclusive
        if !millis.is_finite() || millis < i64::MIN as f64 || millis >= i64::MAX as f64 {
            return None;
        }

        DateTime::from_timestamp_millis(millis as i64)
    }
}

/// Parse a date string
///
/// Accepts RFC 3339, RFC 2822, `YYYY-MM-DD HH:MM:SS[.fff]` and
/// `YYYY-MM-DDTHH:MM:SS[.fff]` without offset (read as UTC), and a bare
/// `YYYY-MM-DD` (midnight UTC).
pub fn parse_date_string(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();

    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }

    for format in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(value, format) {
            return Some(naive.and_utc());
        }
    }

    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Interpret a raw timestamp found at `pointer`
pub(crate) fn interpret(
    raw: RawTimestamp,
    pointer: &'static str,
    policy: &EpochUnitPolicy,
) -> Result<DateTime<Utc>, NormalizationError> {
    match raw {
        RawTimestamp::Number(value) => {
            policy
                .to_datetime(value)
                .ok_or(NormalizationError::TimestampOutOfRange {
                    pointer: pointer.to_string(),
                    value,
                })
        }
        RawTimestamp::Text(text) => {
            parse_date_string(&text).ok_or(NormalizationError::UnparseableTimestamp {
                pointer: pointer.to_string(),
                value: text,
            })
        }
    }
}

#[cfg(test)]
#[path = "timestamp_tests.rs"]
mod tests;
