//! Model pricing definitions for cost calculation.
//!
//! Prices are USD per 1K tokens. The builtin table comes from the model
//! registry; entries can be replaced programmatically. Environment and
//! settings-file prices arrive through [`crate::config::Settings`].

use std::collections::HashMap;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::quote::CostQuote;
use super::TOKENS_PER_PRICE_UNIT;
use crate::models::ModelRegistry;
use crate::{Error, Result, non_negative};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceEntry {
    pub input_price_per_1k: Decimal,
    pub output_price_per_1k: Decimal,
}

impl PriceEntry {
    pub const fn new(input_price_per_1k: Decimal, output_price_per_1k: Decimal) -> Self {
        Self {
            input_price_per_1k,
            output_price_per_1k,
        }
    }

    pub fn input_cost(&self, tokens: u64) -> Decimal {
        Decimal::from(tokens) / TOKENS_PER_PRICE_UNIT * self.input_price_per_1k
    }

    pub fn output_cost(&self, tokens: u64) -> Decimal {
        Decimal::from(tokens) / TOKENS_PER_PRICE_UNIT * self.output_price_per_1k
    }

    pub fn quote(&self, model: &str, input_tokens: u64, output_tokens: u64) -> CostQuote {
        let input_cost = self.input_cost(input_tokens);
        let output_cost = self.output_cost(output_tokens);
        CostQuote {
            model_name: model.to_string(),
            input_tokens,
            output_tokens,
            input_cost,
            output_cost,
            total_cost: input_cost + output_cost,
        }
    }
}

/// Read-only price table. Lookups are exact; there is no fallback price.
#[derive(Debug, Clone, Default)]
pub struct PricingTable {
    models: HashMap<String, PriceEntry>,
}

impl PricingTable {
    pub fn builder() -> PricingTableBuilder {
        PricingTableBuilder::new()
    }

    /// Table with every model of the builtin registry.
    pub fn builtin() -> Self {
        PricingTableBuilder::new().with_defaults().build()
    }

    pub fn get(&self, model: &str) -> Result<&PriceEntry> {
        self.models.get(model).ok_or_else(|| {
            tracing::debug!(model, "price lookup miss");
            Error::unknown_model(model)
        })
    }

    pub fn contains(&self, model: &str) -> bool {
        self.models.contains_key(model)
    }

    pub fn calculate_cost(
        &self,
        model: &str,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<CostQuote> {
        let input_tokens = non_negative("input_tokens", input_tokens)?;
        let output_tokens = non_negative("output_tokens", output_tokens)?;
        let pricing = self.get(model)?;
        Ok(pricing.quote(model, input_tokens, output_tokens))
    }

    pub fn models(&self) -> impl Iterator<Item = (&str, &PriceEntry)> {
        self.models.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct PricingTableBuilder {
    models: HashMap<String, PriceEntry>,
}

impl PricingTableBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_defaults(self) -> Self {
        self.with_registry(&ModelRegistry::builtins())
    }

    pub fn with_registry(mut self, registry: &ModelRegistry) -> Self {
        for spec in registry.all() {
            self.models.insert(spec.id.clone(), spec.pricing);
        }
        self
    }

    pub fn model(mut self, name: impl Into<String>, pricing: PriceEntry) -> Self {
        self.models.insert(name.into(), pricing);
        self
    }

    pub fn model_base(self, name: impl Into<String>, input: Decimal, output: Decimal) -> Self {
        self.model(name, PriceEntry::new(input, output))
    }

    pub fn build(self) -> PricingTable {
        PricingTable {
            models: self.models,
        }
    }
}
