//! Payload normalization.

use super::rules::{first_match, is_present};
use super::timestamp::{interpret, EpochUnitPolicy};
use super::{
    NormalizedCallRecord, NO_SUMMARY, SOURCE_RULES, SUMMARY_RULES, TIMESTAMP_RULES,
    TRANSCRIPT_RULES, UNKNOWN_SOURCE,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

/// Normalization failures, fatal to the job run
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum NormalizationError {
    #[error("Unparseable call timestamp at {pointer}: '{value}'")]
    UnparseableTimestamp { pointer: String, value: String },

    #[error("Call timestamp at {pointer} is out of range: {value}")]
    TimestampOutOfRange { pointer: String, value: f64 },
}

/// Where a normalized field came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldSource {
    /// Read from the payload at this JSON pointer
    Rule { pointer: &'static str },

    /// Defaulted because no rule matched
    Fallback,
}

impl FieldSource {
    fn from_match(pointer: Option<&'static str>) -> Self {
        match pointer {
            Some(pointer) => Self::Rule { pointer },
            None => Self::Fallback,
        }
    }
}

/// Per-field resolution trace
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Provenance {
    /// Whether the payload was unwrapped from its `data` field
    pub unwrapped_data: bool,
    pub summary: FieldSource,
    pub transcript: FieldSource,
    pub call_date: FieldSource,
    pub source_id: FieldSource,
}

/// A normalized record together with its resolution trace
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Normalized {
    pub record: NormalizedCallRecord,
    pub provenance: Provenance,
}

/// Extracts a [`NormalizedCallRecord`] from an arbitrary JSON payload
///
/// Pure transform: no I/O, and the only ambient input is the clock used
/// when the payload carries no timestamp.
#[derive(Debug, Clone, Default)]
pub struct PayloadNormalizer {
    epoch_policy: EpochUnitPolicy,
}

impl PayloadNormalizer {
    pub fn new(epoch_policy: EpochUnitPolicy) -> Self {
        Self { epoch_policy }
    }

    pub fn epoch_policy(&self) -> &EpochUnitPolicy {
        &self.epoch_policy
    }

    /// Normalize using the current time as the timestamp fallback
    pub fn normalize(&self, payload: &Value) -> Result<NormalizedCallRecord, NormalizationError> {
        self.normalize_at(payload, Utc::now())
    }

    /// Normalize using `now` as the timestamp fallback
    pub fn normalize_at(
        &self,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> Result<NormalizedCallRecord, NormalizationError> {
        self.resolve_at(payload, now).map(|normalized| normalized.record)
    }

    /// Normalize and report which rule produced each field
    ///
    /// # Errors
    ///
    /// A timestamp that was found but cannot be interpreted fails the whole
    /// normalization rather than falling back to `now`.
    pub fn resolve_at(
        &self,
        payload: &Value,
        now: DateTime<Utc>,
    ) -> Result<Normalized, NormalizationError> {
        let wrapped = payload.get("data").filter(|data| is_present(data));
        let working = wrapped.unwrap_or(payload);

        let summary = first_match(SUMMARY_RULES, working);
        let transcript = first_match(TRANSCRIPT_RULES, working);
        let source_id = first_match(SOURCE_RULES, working);

        let (call_date, date_pointer) = match first_match(TIMESTAMP_RULES, working) {
            Some((raw, pointer)) => (interpret(raw, pointer, &self.epoch_policy)?, Some(pointer)),
            None => (now, None),
        };

        let provenance = Provenance {
            unwrapped_data: wrapped.is_some(),
            summary: FieldSource::from_match(summary.as_ref().map(|(_, p)| *p)),
            transcript: FieldSource::from_match(transcript.as_ref().map(|(_, p)| *p)),
            call_date: FieldSource::from_match(date_pointer),
            source_id: FieldSource::from_match(source_id.as_ref().map(|(_, p)| *p)),
        };

        let record = NormalizedCallRecord {
            summary: summary
                .map(|(value, _)| value)
                .unwrap_or_else(|| NO_SUMMARY.to_string()),
            transcript: transcript.map(|(value, _)| value).unwrap_or_default(),
            call_date,
            source_id: source_id
                .map(|(value, _)| value)
                .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
        };

        Ok(Normalized { record, provenance })
    }
}

#[cfg(test)]
#[path = "normalizer_tests.rs"]
mod tests;
