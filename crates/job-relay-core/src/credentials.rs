//! # Credential Scope
//!
//! Per-environment credentials for the job-execution backend.
//!
//! The scope is loaded once at startup and never mutated afterwards. A
//! request selects its credential with [`CredentialScope::select`] and passes
//! the borrowed [`ApiKey`] explicitly to every gateway call, so concurrent
//! requests for different environments cannot observe each other's choice.

use crate::{ConfigurationError, Environment};
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// API credential for the job-execution backend
///
/// The value is zeroed on drop and never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct ApiKey(String);

impl ApiKey {
    /// Wrap a credential, returning `None` for blank values
    pub fn new(value: impl Into<String>) -> Option<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return None;
        }
        Some(Self(value))
    }

    /// Get the raw credential (only for immediate use in a request header)
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(<redacted>)")
    }
}

/// Mapping from environment to backend credential
#[derive(Clone, Default)]
pub struct CredentialScope {
    production: Option<ApiKey>,
    staging: Option<ApiKey>,
}

impl CredentialScope {
    pub fn new(production: Option<ApiKey>, staging: Option<ApiKey>) -> Self {
        Self {
            production,
            staging,
        }
    }

    /// Build a scope from a key lookup function
    ///
    /// Each environment reads the key named by [`Environment::credential_key`].
    /// Blank values are treated as missing.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |env: Environment| lookup(env.credential_key()).and_then(ApiKey::new);
        Self {
            production: read(Environment::Production),
            staging: read(Environment::Staging),
        }
    }

    /// Build a scope from the process environment
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Replace the credential for one environment
    pub fn with_credential(mut self, environment: Environment, key: ApiKey) -> Self {
        match environment {
            Environment::Production => self.production = Some(key),
            Environment::Staging => self.staging = Some(key),
        }
        self
    }

    /// Select the credential for an environment
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::MissingCredential`] naming the key that
    /// must be set when the environment has no credential.
    pub fn select(&self, environment: Environment) -> Result<&ApiKey, ConfigurationError> {
        let slot = match environment {
            Environment::Production => &self.production,
            Environment::Staging => &self.staging,
        };

        slot.as_ref()
            .ok_or_else(|| ConfigurationError::MissingCredential {
                environment,
                key: environment.credential_key().to_string(),
            })
    }

    pub fn is_configured(&self, environment: Environment) -> bool {
        self.select(environment).is_ok()
    }

    /// Environments that have no credential
    pub fn missing(&self) -> Vec<Environment> {
        Environment::ALL
            .into_iter()
            .filter(|env| !self.is_configured(*env))
            .collect()
    }
}

impl fmt::Debug for CredentialScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialScope")
            .field("production", &self.production.is_some())
            .field("staging", &self.staging.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "credentials_tests.rs"]
mod tests;
