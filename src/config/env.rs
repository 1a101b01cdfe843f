//! Environment Variable Configuration Provider
//!
//! Environment variables are treated as immutable at runtime because
//! modifying them is not thread-safe.

use super::provider::ConfigProvider;
use super::{ConfigError, ConfigResult};

/// Prefix for every variable read by the CLI.
pub const ENV_PREFIX: &str = "LLM_ESTIMATE_";

/// Read-only environment variable configuration provider.
#[derive(Debug, Clone)]
pub struct EnvConfigProvider {
    prefix: Option<String>,
}

impl EnvConfigProvider {
    /// Create a new environment provider with no prefix
    pub fn new() -> Self {
        Self { prefix: None }
    }

    /// Create an environment provider with a prefix
    pub fn prefixed(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }

    /// Get the full environment variable name
    fn env_key(&self, key: &str) -> String {
        let key = key.to_uppercase().replace(['.', '-'], "_");
        match &self.prefix {
            Some(prefix) => format!("{}{}", prefix, key),
            None => key,
        }
    }
}

impl Default for EnvConfigProvider {
    fn default() -> Self {
        Self::prefixed(ENV_PREFIX)
    }
}

impl ConfigProvider for EnvConfigProvider {
    fn name(&self) -> &str {
        "env"
    }

    fn get_raw(&self, key: &str) -> ConfigResult<Option<String>> {
        let env_key = self.env_key(key);
        match std::env::var(&env_key) {
            Ok(value) => Ok(Some(value)),
            Err(std::env::VarError::NotPresent) => Ok(None),
            Err(e) => Err(ConfigError::Env(e)),
        }
    }
}
