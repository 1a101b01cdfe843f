//! Conversation-turn budgeting against a fixed context window.

use serde::{Deserialize, Serialize};

use crate::{Error, Result, non_negative};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    pub window_tokens: u64,
    pub system_tokens: u64,
    pub per_turn_user_tokens: u64,
    pub per_turn_assistant_tokens: u64,
    pub max_turns: u64,
}

impl ContextBudget {
    #[inline]
    pub fn per_turn_tokens(&self) -> u64 {
        self.per_turn_user_tokens + self.per_turn_assistant_tokens
    }

    /// Tokens consumed when every planned turn is used.
    pub fn used_tokens(&self) -> u64 {
        self.system_tokens + self.max_turns * self.per_turn_tokens()
    }

    /// Tokens left over that are not enough for another turn.
    pub fn slack_tokens(&self) -> u64 {
        self.window_tokens - self.used_tokens()
    }
}

/// Plans how many full turns fit after the system prompt.
///
/// Partial turns never count. Fails with [`Error::BudgetExceeded`] when the
/// system prompt alone is larger than the window and with
/// [`Error::UnboundedBudget`] when a turn costs zero tokens.
pub fn plan_turns(
    window_tokens: i64,
    system_tokens: i64,
    per_turn_user_tokens: i64,
    per_turn_assistant_tokens: i64,
) -> Result<ContextBudget> {
    if window_tokens <= 0 {
        return Err(Error::invalid(
            "window_tokens",
            window_tokens,
            "must be positive",
        ));
    }
    let window = window_tokens as u64;
    let system = non_negative("system_tokens", system_tokens)?;
    let user = non_negative("per_turn_user_tokens", per_turn_user_tokens)?;
    let assistant = non_negative("per_turn_assistant_tokens", per_turn_assistant_tokens)?;

    if system > window {
        return Err(Error::BudgetExceeded {
            window_tokens: window,
            system_tokens: system,
            deficit: system - window,
        });
    }
    let remaining = window - system;

    let per_turn = user
        .checked_add(assistant)
        .ok_or_else(|| Error::invalid("per_turn_tokens", "overflow", "turn size too large"))?;
    if per_turn == 0 {
        return Err(Error::UnboundedBudget);
    }

    let max_turns = remaining / per_turn;
    tracing::debug!(window, system, per_turn, max_turns, "planned context budget");

    Ok(ContextBudget {
        window_tokens: window,
        system_tokens: system,
        per_turn_user_tokens: user,
        per_turn_assistant_tokens: assistant,
        max_turns,
    })
}

pub fn max_turns(
    window_tokens: i64,
    system_tokens: i64,
    per_turn_user_tokens: i64,
    per_turn_assistant_tokens: i64,
) -> Result<u64> {
    plan_turns(
        window_tokens,
        system_tokens,
        per_turn_user_tokens,
        per_turn_assistant_tokens,
    )
    .map(|budget| budget.max_turns)
}
