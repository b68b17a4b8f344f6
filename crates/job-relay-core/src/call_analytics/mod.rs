//! # Call Analytics Ingestion
//!
//! Turns loosely-structured call-analytics webhooks from voice-agent
//! platforms into one canonical record and persists it.
//!
//! Payloads arrive in several shapes: sometimes wrapped under `data`, with the
//! summary in one of three places, timestamps in seconds, milliseconds or as
//! date strings, and the caller identified by phone number or agent id. The
//! [`PayloadNormalizer`] resolves each field with an ordered list of
//! [`ExtractionRule`]s; [`CallAnalyticsJob`] feeds the result to a
//! [`RecordStore`](crate::RecordStore).

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

mod job;
mod normalizer;
mod rules;
mod timestamp;

pub use job::{CallAnalyticsJob, CallIngestOutput, JobError};
pub use normalizer::{FieldSource, NormalizationError, Normalized, PayloadNormalizer, Provenance};
pub use rules::{
    is_present, ExtractionRule, SOURCE_RULES, SUMMARY_RULES, TIMESTAMP_RULES, TRANSCRIPT_RULES,
};
pub use timestamp::{EpochUnit, EpochUnitPolicy, RawTimestamp};

/// Name under which the ingestion job is registered with the backend
pub const JOB_NAME: &str = "process-elevenlabs-call";

/// Summary stored when the payload carries none
pub const NO_SUMMARY: &str = "No summary provided";

/// Source identifier stored when the payload names no caller or agent
pub const UNKNOWN_SOURCE: &str = "Unknown";

/// Conversation transcript
///
/// Platforms send either a list of turn objects or one block of text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Transcript {
    Turns(Vec<Value>),
    Text(String),
}

impl Transcript {
    /// Number of turns, or characters for a text transcript
    pub fn len(&self) -> usize {
        match self {
            Self::Turns(turns) => turns.len(),
            Self::Text(text) => text.chars().count(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Transcript {
    fn default() -> Self {
        Self::Turns(Vec::new())
    }
}

/// Canonical call record handed to the record store
///
/// Serializes with the store's column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCallRecord {
    pub summary: String,

    pub transcript: Transcript,

    #[serde(serialize_with = "serialize_call_date")]
    pub call_date: DateTime<Utc>,

    #[serde(rename = "phone_number_id")]
    pub source_id: String,
}

impl NormalizedCallRecord {
    /// Call date as ISO-8601 with millisecond precision and a `Z` suffix
    pub fn call_date_iso(&self) -> String {
        self.call_date.to_rfc3339_opts(SecondsFormat::Millis, true)
    }
}

fn serialize_call_date<S>(value: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&value.to_rfc3339_opts(SecondsFormat::Millis, true))
}
