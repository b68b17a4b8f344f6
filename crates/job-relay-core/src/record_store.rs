//! # Record Store Gateway
//!
//! Interface to the external store that persists normalized call records.

use crate::call_analytics::NormalizedCallRecord;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier assigned by the store to an inserted record
///
/// Stores hand out either numeric keys or textual ones (UUIDs), so both are
/// accepted and echoed back unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RecordId {
    Number(i64),
    Text(String),
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Record store write failures, fatal to the job run
#[derive(Debug, Clone, thiserror::Error)]
pub enum PersistenceError {
    /// The store refused the write (schema mismatch, constraint violation, auth)
    #[error("{message}")]
    Rejected { message: String },

    #[error("Record store unreachable: {message}")]
    Unreachable { message: String },

    #[error("Unexpected record store response: {message}")]
    InvalidResponse { message: String },
}

/// Interface for persisting normalized call records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Insert a record and return the identifier the store assigned to it
    async fn insert(&self, record: NormalizedCallRecord) -> Result<RecordId, PersistenceError>;
}
