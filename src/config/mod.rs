//! Layered configuration: builtin defaults, a JSON settings file, then
//! environment variables.
//!
//! ```rust,no_run
//! use llm_estimate::config::SettingsLoader;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let settings = SettingsLoader::new()
//!     .default_file()
//!     .env()
//!     .load()?;
//! # Ok(())
//! # }
//! ```

pub mod env;
pub mod file;
pub mod memory;
pub mod provider;
pub mod settings;

pub use env::{ENV_PREFIX, EnvConfigProvider};
pub use file::SettingsFile;
pub use memory::MemoryConfigProvider;
pub use provider::ConfigProvider;
pub use settings::{ModelOverride, Settings, SettingsLoader};

use thiserror::Error;

/// Errors that can occur in configuration operations
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Invalid configuration value
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// The key with invalid value
        key: String,
        /// Error message
        message: String,
    },

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Environment variable error
    #[error("Environment error: {0}")]
    Env(#[from] std::env::VarError),

    /// Multiple validation errors
    #[error("{0}")]
    ValidationErrors(ValidationErrors),
}

#[derive(Debug)]
pub struct ValidationErrors(pub Vec<ConfigError>);

impl std::fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Validation failed: ")?;
        let msgs: Vec<String> = self.0.iter().map(|e| e.to_string()).collect();
        write!(f, "{}", msgs.join("; "))
    }
}

/// Result type for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Key fragment for a model id: `gpt-3.5-turbo` -> `GPT_3_5_TURBO`.
pub fn env_model_key(model: &str) -> String {
    model
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::InvalidValue {
            key: "tokens_per_word".to_string(),
            message: "must be positive".to_string(),
        };
        assert!(err.to_string().contains("tokens_per_word"));
    }

    #[test]
    fn test_validation_errors_display() {
        let errors = ValidationErrors(vec![
            ConfigError::InvalidValue {
                key: "a".into(),
                message: "bad".into(),
            },
            ConfigError::InvalidValue {
                key: "b".into(),
                message: "worse".into(),
            },
        ]);
        assert_eq!(
            errors.to_string(),
            "Validation failed: Invalid value for a: bad; Invalid value for b: worse"
        );
    }

    #[test]
    fn test_env_model_key() {
        assert_eq!(env_model_key("gpt-3.5-turbo"), "GPT_3_5_TURBO");
        assert_eq!(env_model_key("claude-3-opus"), "CLAUDE_3_OPUS");
    }
}
