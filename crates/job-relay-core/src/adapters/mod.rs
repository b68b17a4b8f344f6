//! # In-Memory Adapters
//!
//! Implementations of the gateway traits that keep all state in memory.
//! Used by tests and by dry runs of the CLI.

pub mod memory_executor;
pub mod memory_record_store;

pub use memory_executor::{InMemoryJobExecutor, RunScript, TriggerCall};
pub use memory_record_store::InMemoryRecordStore;
