//! Token estimation and context-window budgeting.

mod estimator;
mod planner;
mod window;

pub use estimator::{DEFAULT_TOKENS_PER_WORD, TokenEstimate, TokenEstimator, count_words};
pub use planner::{ContextBudget, max_turns, plan_turns};
pub use window::{
    ContextWindow, DEFAULT_CRITICAL_THRESHOLD, DEFAULT_KEEP_MESSAGES, DEFAULT_WARNING_THRESHOLD,
    WindowStatus, trim_count,
};
