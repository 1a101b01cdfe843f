//! Prelude module for convenient imports.
//!
//! # Usage
//!
//! ```rust
//! use llm_estimate::prelude::*;
//!
//! let engine = EstimationEngine::builtin();
//! assert_eq!(engine.estimate_tokens(100).unwrap(), 130);
//! ```

// Core types
pub use crate::EstimationEngine;
pub use crate::Error;
pub use crate::Result;

// Tokens
pub use crate::tokens::{ContextBudget, ContextWindow, TokenEstimate, TokenEstimator};

// Costs
pub use crate::budget::{BudgetStatus, CostQuote, CostTracker, OnExceed, PricingTable};

// Models
pub use crate::models::{ModelRegistry, ModelSelector, ModelSpec, Selection};

// Configuration
pub use crate::config::{Settings, SettingsLoader};
