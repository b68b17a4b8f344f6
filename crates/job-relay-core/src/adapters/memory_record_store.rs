//! # In-Memory Record Store
//!
//! Thread-safe record store that keeps inserted records in a vector and
//! hands out sequential numeric identifiers starting at 1.

use crate::call_analytics::NormalizedCallRecord;
use crate::{PersistenceError, RecordId, RecordStore};
use async_trait::async_trait;
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct StoreState {
    records: Vec<NormalizedCallRecord>,
    attempts: usize,
    failure: Option<String>,
}

/// In-memory [`RecordStore`]
#[derive(Debug, Clone, Default)]
pub struct InMemoryRecordStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that rejects every insert with `message`
    pub fn failing(message: impl Into<String>) -> Self {
        let store = Self::new();
        store.lock().failure = Some(message.into());
        store
    }

    /// Snapshot of the stored records in insertion order
    pub fn records(&self) -> Vec<NormalizedCallRecord> {
        self.lock().records.clone()
    }

    /// Number of insert calls, successful or not
    pub fn insert_attempts(&self) -> usize {
        self.lock().attempts
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn insert(&self, record: NormalizedCallRecord) -> Result<RecordId, PersistenceError> {
        let mut state = self.lock();
        state.attempts += 1;

        if let Some(message) = &state.failure {
            return Err(PersistenceError::Rejected {
                message: message.clone(),
            });
        }

        state.records.push(record);
        Ok(RecordId::Number(state.records.len() as i64))
    }
}

#[cfg(test)]
#[path = "memory_record_store_tests.rs"]
mod tests;
