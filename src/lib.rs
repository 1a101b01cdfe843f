//! # llm-estimate
//!
//! Deterministic estimation of LLM API usage: word/token conversion, cost
//! quotes from a per-model price table, and conversation-turn budgeting
//! against a context window.
//!
//! ## Quick Start
//!
//! ```rust
//! use llm_estimate::EstimationEngine;
//! use rust_decimal_macros::dec;
//!
//! # fn main() -> Result<(), llm_estimate::Error> {
//! let engine = EstimationEngine::builtin();
//!
//! assert_eq!(engine.estimate_tokens(500)?, 650);
//!
//! let quote = engine.calculate_cost("gpt-3.5-turbo", 100, 200)?;
//! assert_eq!(quote.total_cost, dec!(0.00055));
//! assert_eq!(quote.scaled(1000).total_cost, dec!(0.55));
//!
//! assert_eq!(engine.max_turns(16_000, 200, 50, 150)?, 79);
//! # Ok(())
//! # }
//! ```

#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod budget;
pub mod config;
pub mod engine;
pub mod models;
pub mod prelude;
pub mod tokens;

pub use budget::{
    BudgetStatus, CallRecord, CostQuote, CostTracker, ExportFormat, ModelUsage, OnExceed,
    PriceEntry, PricingTable, PricingTableBuilder, SessionReport,
};
pub use config::{ConfigError, Settings, SettingsLoader};
pub use engine::EstimationEngine;
pub use models::{ModelKind, ModelRegistry, ModelSelector, ModelSpec, Provider, Selection};
pub use tokens::{
    ContextBudget, ContextWindow, DEFAULT_TOKENS_PER_WORD, TokenEstimate, TokenEstimator,
    WindowStatus, max_turns, plan_turns, trim_count,
};

use rust_decimal::Decimal;

/// Error type for llm-estimate operations.
///
/// Every variant is a recoverable result for the caller; none of them
/// indicates a broken process.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// A quantity was negative, zero where a positive value is required, or
    /// too large to represent.
    #[error("Invalid input for {field}: {value} ({reason})")]
    InvalidInput {
        field: &'static str,
        value: String,
        reason: &'static str,
    },

    /// The price table or registry has no entry for the requested model.
    #[error("Unknown model: '{model}'")]
    UnknownModel { model: String },

    /// Fixed overhead alone does not fit the context window.
    #[error("Context budget exceeded: system prompt needs {system_tokens} tokens but window is {window_tokens} (deficit: {deficit})")]
    BudgetExceeded {
        window_tokens: u64,
        system_tokens: u64,
        deficit: u64,
    },

    /// Per-turn cost is zero, so any number of turns fits.
    #[error("Unbounded budget: per-turn token cost is zero, no turn limit applies")]
    UnboundedBudget,

    /// No registered model satisfies the requested size.
    #[error("No model fits {required_tokens} tokens")]
    NoSuitableModel { required_tokens: u64 },

    /// Session cost limit reached.
    #[error("Cost limit exceeded: ${used} used (limit: ${limit})")]
    CostLimitExceeded { used: Decimal, limit: Decimal },

    /// Invalid or missing configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization or deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV export failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Error category for unified error handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Caller supplied a bad quantity; re-prompt and retry.
    InvalidInput,
    /// A model name did not resolve.
    Lookup,
    /// Window, turn or cost limits.
    ResourceLimit,
    /// Settings file, environment or validation errors
    Configuration,
    /// IO and serialization
    Internal,
}

impl Error {
    pub(crate) fn invalid(field: &'static str, value: impl ToString, reason: &'static str) -> Self {
        Error::InvalidInput {
            field,
            value: value.to_string(),
            reason,
        }
    }

    pub fn unknown_model(model: impl Into<String>) -> Self {
        Error::UnknownModel {
            model: model.into(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Error::InvalidInput { .. } => ErrorCategory::InvalidInput,
            Error::UnknownModel { .. } | Error::NoSuitableModel { .. } => ErrorCategory::Lookup,
            Error::BudgetExceeded { .. }
            | Error::UnboundedBudget
            | Error::CostLimitExceeded { .. } => ErrorCategory::ResourceLimit,
            Error::Config(_) => ErrorCategory::Configuration,
            Error::Io(_) | Error::Json(_) | Error::Csv(_) => ErrorCategory::Internal,
        }
    }

    pub fn is_invalid_input(&self) -> bool {
        self.category() == ErrorCategory::InvalidInput
    }

    pub fn is_resource_limit(&self) -> bool {
        self.category() == ErrorCategory::ResourceLimit
    }

    /// Model name that failed to resolve, if any.
    pub fn model(&self) -> Option<&str> {
        match self {
            Error::UnknownModel { model } => Some(model),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::Io(e) => Error::Io(e),
            config::ConfigError::Serialization(e) => Error::Json(e),
            other => Error::Config(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Converts a signed caller-supplied quantity into a token count.
pub(crate) fn non_negative(field: &'static str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| Error::invalid(field, value, "must not be negative"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::unknown_model("gpt-9");
        assert!(err.to_string().contains("'gpt-9'"));
        assert_eq!(err.model(), Some("gpt-9"));

        let err = Error::BudgetExceeded {
            window_tokens: 100,
            system_tokens: 200,
            deficit: 100,
        };
        assert!(err.to_string().contains("deficit: 100"));
    }

    #[test]
    fn test_error_category() {
        assert!(Error::invalid("word_count", -1, "must not be negative").is_invalid_input());
        assert!(Error::UnboundedBudget.is_resource_limit());
        assert_eq!(
            Error::unknown_model("x").category(),
            ErrorCategory::Lookup
        );
        assert_eq!(
            Error::Config("bad".into()).category(),
            ErrorCategory::Configuration
        );
    }

    #[test]
    fn test_non_negative() {
        assert_eq!(non_negative("tokens", 0).unwrap(), 0);
        assert_eq!(non_negative("tokens", 42).unwrap(), 42);
        let err = non_negative("tokens", -5).unwrap_err();
        assert!(matches!(err, Error::InvalidInput { field: "tokens", .. }));
        assert!(err.to_string().contains("-5"));
    }

    #[test]
    fn test_config_error_conversion() {
        let err: Error = config::ConfigError::InvalidValue {
            key: "tokens_per_word".into(),
            message: "must be positive".into(),
        }
        .into();
        assert!(matches!(err, Error::Config(_)));
    }
}
