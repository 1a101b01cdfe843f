use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Priced single API call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CostQuote {
    pub model_name: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub input_cost: Decimal,
    pub output_cost: Decimal,
    pub total_cost: Decimal,
}

impl CostQuote {
    #[inline]
    pub fn total_tokens(&self) -> u64 {
        self.input_tokens + self.output_tokens
    }

    /// Aggregate of `calls` identical calls.
    pub fn scaled(&self, calls: u64) -> Self {
        let factor = Decimal::from(calls);
        let input_cost = self.input_cost * factor;
        let output_cost = self.output_cost * factor;
        Self {
            model_name: self.model_name.clone(),
            input_tokens: self.input_tokens.saturating_mul(calls),
            output_tokens: self.output_tokens.saturating_mul(calls),
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }
}
