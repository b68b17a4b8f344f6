//! Ordered extraction rules for each normalized field.

use super::timestamp::RawTimestamp;
use super::Transcript;
use serde_json::Value;

/// One way of reading a field out of a payload
///
/// `pointer` is an RFC 6901 JSON pointer into the working object; `extract`
/// turns the value found there into the field's type, or declines with
/// `None` when the value has the wrong shape.
pub struct ExtractionRule<T> {
    pub pointer: &'static str,
    pub extract: fn(&Value) -> Option<T>,
}

impl<T> ExtractionRule<T> {
    pub const fn new(pointer: &'static str, extract: fn(&Value) -> Option<T>) -> Self {
        Self { pointer, extract }
    }

    /// Apply the rule to the working object
    ///
    /// Values that are absent under [`is_present`] never reach `extract`.
    pub fn apply(&self, working: &Value) -> Option<T> {
        working
            .pointer(self.pointer)
            .filter(|value| is_present(value))
            .and_then(self.extract)
    }
}

impl<T> std::fmt::Debug for ExtractionRule<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionRule")
            .field("pointer", &self.pointer)
            .finish()
    }
}

/// Evaluate rules in order and return the first hit with its pointer
pub(crate) fn first_match<T>(
    rules: &[ExtractionRule<T>],
    working: &Value,
) -> Option<(T, &'static str)> {
    rules
        .iter()
        .find_map(|rule| rule.apply(working).map(|value| (value, rule.pointer)))
}

/// Whether a value counts as supplied
///
/// Senders use `null`, `false`, `0` and `""` interchangeably for "no value",
/// so all four are treated as absent. Empty arrays and objects are present.
pub fn is_present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

fn text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn transcript(value: &Value) -> Option<Transcript> {
    match value {
        Value::Array(turns) => Some(Transcript::Turns(turns.clone())),
        Value::String(s) => Some(Transcript::Text(s.clone())),
        _ => None,
    }
}

fn raw_timestamp(value: &Value) -> Option<RawTimestamp> {
    match value {
        Value::Number(n) => n.as_f64().map(RawTimestamp::Number),
        Value::String(s) => Some(RawTimestamp::Text(s.clone())),
        _ => None,
    }
}

pub static SUMMARY_RULES: &[ExtractionRule<String>] = &[
    ExtractionRule::new("/analysis/transcript_summary", text),
    ExtractionRule::new("/analysis/summary", text),
    ExtractionRule::new("/summary", text),
];

pub static TRANSCRIPT_RULES: &[ExtractionRule<Transcript>] = &[
    ExtractionRule::new("/transcript", transcript),
    ExtractionRule::new("/conversation", transcript),
];

pub static TIMESTAMP_RULES: &[ExtractionRule<RawTimestamp>] = &[
    ExtractionRule::new("/metadata/start_time_unix_secs", raw_timestamp),
    ExtractionRule::new("/call/start_timestamp", raw_timestamp),
    ExtractionRule::new("/start_timestamp", raw_timestamp),
];

pub static SOURCE_RULES: &[ExtractionRule<String>] = &[
    ExtractionRule::new("/call/phone_number_id", text),
    ExtractionRule::new("/agent_id", text),
    ExtractionRule::new("/call/agent_id", text),
];

#[cfg(test)]
#[path = "rules_tests.rs"]
mod tests;
