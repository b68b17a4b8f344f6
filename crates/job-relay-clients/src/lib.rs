//! # Job Relay Clients
//!
//! HTTP implementations of the Job Relay gateway traits:
//!
//! - [`TriggerClient`]: [`JobExecutor`](job_relay_core::JobExecutor) backed by the
//!   Trigger.dev task and run APIs
//! - [`SupabaseStore`]: [`RecordStore`](job_relay_core::RecordStore) backed by
//!   Supabase's PostgREST interface
//!
//! Neither client holds a job-backend credential. [`TriggerClient`] receives
//! the credential with every call; [`SupabaseStore`] owns only its own
//! service key.

pub mod supabase;
pub mod trigger;

pub use supabase::{SupabaseConfig, SupabaseStore};
pub use trigger::{TriggerClient, TriggerClientConfig};

use url::Url;

/// Client construction failures
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("Invalid URL for {field}: {message}")]
    InvalidUrl { field: String, message: String },

    #[error("Failed to create HTTP client: {message}")]
    HttpClient { message: String },
}

/// Parse a base URL, rejecting values that cannot carry path segments
pub(crate) fn parse_base_url(field: &str, value: &str) -> Result<Url, ClientError> {
    let url = Url::parse(value).map_err(|e| ClientError::InvalidUrl {
        field: field.to_string(),
        message: e.to_string(),
    })?;

    if url.cannot_be_a_base() {
        return Err(ClientError::InvalidUrl {
            field: field.to_string(),
            message: format!("'{}' cannot be used as a base URL", value),
        });
    }

    Ok(url)
}

/// Append path segments to a base URL, percent-encoding each one
pub(crate) fn endpoint(base: &Url, segments: &[&str]) -> Url {
    let mut url = base.clone();
    if let Ok(mut path) = url.path_segments_mut() {
        path.pop_if_empty().extend(segments);
    }
    url
}

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
