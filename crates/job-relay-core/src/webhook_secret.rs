//! # Webhook Secret Validation
//!
//! Shared-secret check applied to every inbound webhook before any
//! credential is selected or any job is started.
//!
//! Callers may supply the secret either as the `agtr_secret` query parameter
//! or as the `X-Webhook-Secret` header. The query parameter wins when both
//! are present. When no secret is configured the validator runs in open mode
//! and authorizes everything.

use subtle::ConstantTimeEq;
use tracing::debug;
use zeroize::Zeroizing;

/// Secret values supplied by the caller of one request
#[derive(Debug, Clone, Copy, Default)]
pub struct SuppliedSecret<'a> {
    /// Value of the `agtr_secret` query parameter
    pub query: Option<&'a str>,

    /// Value of the `X-Webhook-Secret` header
    pub header: Option<&'a str>,
}

impl<'a> SuppliedSecret<'a> {
    pub fn new(query: Option<&'a str>, header: Option<&'a str>) -> Self {
        Self { query, header }
    }

    /// The value that takes part in the comparison
    ///
    /// Empty values count as absent, so an empty query parameter falls back
    /// to the header.
    pub fn effective(&self) -> Option<&'a str> {
        self.query
            .filter(|v| !v.is_empty())
            .or(self.header.filter(|v| !v.is_empty()))
    }
}

/// Authorization failures (401, terminal)
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AuthorizationError {
    #[error("Unauthorized: Invalid or missing webhook secret")]
    MissingSecret,

    #[error("Unauthorized: Invalid or missing webhook secret")]
    SecretMismatch,
}

/// Compares caller-supplied secrets against the configured expectation
#[derive(Clone, Default)]
pub struct SecretValidator {
    expected: Option<Zeroizing<String>>,
}

impl SecretValidator {
    /// Create a validator; `None` or an empty secret selects open mode
    pub fn new(expected: Option<String>) -> Self {
        Self {
            expected: expected
                .filter(|s| !s.is_empty())
                .map(Zeroizing::new),
        }
    }

    /// Validator that authorizes every request
    pub fn open() -> Self {
        Self { expected: None }
    }

    /// Load the expected secret from `WEBHOOK_SECRET`
    pub fn from_env() -> Self {
        Self::new(std::env::var(crate::WEBHOOK_SECRET_KEY).ok())
    }

    pub fn is_open(&self) -> bool {
        self.expected.is_none()
    }

    /// Authorize a request
    ///
    /// # Errors
    ///
    /// - [`AuthorizationError::MissingSecret`] when a secret is configured and none was supplied
    /// - [`AuthorizationError::SecretMismatch`] when the supplied value differs
    pub fn authorize(&self, supplied: SuppliedSecret<'_>) -> Result<(), AuthorizationError> {
        let Some(expected) = self.expected.as_ref() else {
            return Ok(());
        };

        let provided = supplied.effective().ok_or_else(|| {
            debug!("Webhook secret required but not supplied");
            AuthorizationError::MissingSecret
        })?;

        if constant_time_eq(provided.as_bytes(), expected.as_bytes()) {
            Ok(())
        } else {
            debug!(
                source = if supplied.query.is_some_and(|v| !v.is_empty()) {
                    "query"
                } else {
                    "header"
                },
                "Webhook secret mismatch"
            );
            Err(AuthorizationError::SecretMismatch)
        }
    }
}

impl std::fmt::Debug for SecretValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretValidator")
            .field("open_mode", &self.is_open())
            .finish()
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
#[path = "webhook_secret_tests.rs"]
mod tests;
