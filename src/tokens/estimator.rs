//! Word <-> token conversion with a fixed per-word ratio.

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::{Error, Result, non_negative};

/// Common approximation for English text.
pub const DEFAULT_TOKENS_PER_WORD: Decimal = dec!(1.3);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEstimate {
    pub word_count: u64,
    pub estimated_tokens: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenEstimator {
    tokens_per_word: Decimal,
}

impl Default for TokenEstimator {
    fn default() -> Self {
        Self {
            tokens_per_word: DEFAULT_TOKENS_PER_WORD,
        }
    }
}

impl TokenEstimator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Estimator with a custom ratio. The ratio must be positive.
    pub fn with_ratio(tokens_per_word: Decimal) -> Result<Self> {
        if tokens_per_word <= Decimal::ZERO {
            return Err(Error::Config(format!(
                "tokens_per_word must be positive, got {}",
                tokens_per_word
            )));
        }
        Ok(Self { tokens_per_word })
    }

    pub fn tokens_per_word(&self) -> Decimal {
        self.tokens_per_word
    }

    pub fn estimate_tokens(&self, word_count: i64) -> Result<u64> {
        let words = non_negative("word_count", word_count)?;
        round_half_up(
            Decimal::from(words).checked_mul(self.tokens_per_word),
            "word_count",
            word_count,
        )
    }

    pub fn estimate_words(&self, token_count: i64) -> Result<u64> {
        let tokens = non_negative("token_count", token_count)?;
        round_half_up(
            Decimal::from(tokens).checked_div(self.tokens_per_word),
            "token_count",
            token_count,
        )
    }

    pub fn estimate(&self, word_count: i64) -> Result<TokenEstimate> {
        Ok(TokenEstimate {
            word_count: non_negative("word_count", word_count)?,
            estimated_tokens: self.estimate_tokens(word_count)?,
        })
    }

    pub fn estimate_text(&self, text: &str) -> Result<TokenEstimate> {
        let word_count = count_words(text);
        Ok(TokenEstimate {
            word_count,
            estimated_tokens: round_half_up(
                Decimal::from(word_count).checked_mul(self.tokens_per_word),
                "word_count",
                word_count,
            )?,
        })
    }
}

/// Whitespace-separated word count.
pub fn count_words(text: &str) -> u64 {
    text.split_whitespace().count() as u64
}

// Inputs are non-negative here, so away-from-zero is round-half-up.
fn round_half_up(value: Option<Decimal>, field: &'static str, input: impl ToString) -> Result<u64> {
    value
        .and_then(|v| {
            v.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
                .to_u64()
        })
        .ok_or_else(|| Error::invalid(field, input, "result does not fit in a token count"))
}
