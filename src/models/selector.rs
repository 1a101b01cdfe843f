//! Cheapest-model selection for a request size.

use serde::Serialize;

use super::registry::ModelRegistry;
use crate::budget::{CostQuote, PricingTable};
use crate::{Error, Result, non_negative};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Selection {
    pub model: String,
    pub context_window: u64,
    pub quote: CostQuote,
}

/// Picks chat models that fit a request, ordered by quoted cost.
#[derive(Debug, Clone, Copy)]
pub struct ModelSelector<'a> {
    registry: &'a ModelRegistry,
    pricing: &'a PricingTable,
}

impl<'a> ModelSelector<'a> {
    pub fn new(registry: &'a ModelRegistry, pricing: &'a PricingTable) -> Self {
        Self { registry, pricing }
    }

    /// Every fitting, priced chat model, cheapest first. Ties are broken by
    /// model id so the order is stable.
    pub fn rank(&self, input_tokens: i64, output_tokens: i64) -> Result<Vec<Selection>> {
        let input = non_negative("input_tokens", input_tokens)?;
        let output = non_negative("output_tokens", output_tokens)?;

        let mut candidates: Vec<Selection> = self
            .registry
            .all()
            .filter(|spec| spec.kind.generates_output() && spec.fits(input, output))
            .filter_map(|spec| {
                let pricing = self.pricing.get(&spec.id).ok()?;
                Some(Selection {
                    model: spec.id.clone(),
                    context_window: spec.context_window,
                    quote: pricing.quote(&spec.id, input, output),
                })
            })
            .collect();

        candidates.sort_by(|a, b| {
            a.quote
                .total_cost
                .cmp(&b.quote.total_cost)
                .then_with(|| a.model.cmp(&b.model))
        });
        Ok(candidates)
    }

    pub fn cheapest_fit(&self, input_tokens: i64, output_tokens: i64) -> Result<Selection> {
        let ranked = self.rank(input_tokens, output_tokens)?;
        match ranked.into_iter().next() {
            Some(selection) => {
                tracing::debug!(
                    model = %selection.model,
                    cost = %selection.quote.total_cost,
                    "selected cheapest fitting model"
                );
                Ok(selection)
            }
            None => Err(Error::NoSuitableModel {
                required_tokens: (input_tokens as u64).saturating_add(output_tokens as u64),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cheapest_fit_small_request() {
        let registry = ModelRegistry::builtins();
        let pricing = PricingTable::builtin();
        let selector = ModelSelector::new(&registry, &pricing);

        let selection = selector.cheapest_fit(1_000, 500).unwrap();
        // claude-3-haiku: 0.00025 + 0.000625
        assert_eq!(selection.model, "claude-3-haiku");
        assert_eq!(selection.quote.total_cost, dec!(0.000875));
    }

    #[test]
    fn test_cheapest_fit_respects_window() {
        let registry = ModelRegistry::builtins();
        // models missing from the price table are never candidates
        let pricing = PricingTable::builder()
            .model_base("gpt-3.5-turbo", dec!(0.0015), dec!(0.002))
            .model_base("gpt-4-turbo", dec!(0.01), dec!(0.03))
            .build();
        let selector = ModelSelector::new(&registry, &pricing);

        // too large for gpt-3.5-turbo's 4096 window
        let selection = selector.cheapest_fit(6_000, 1_000).unwrap();
        assert_eq!(selection.model, "gpt-4-turbo");
        assert!(selection.context_window >= 7_000);

        let ranked = selector.rank(1_000, 1_000).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|s| s.model.as_str()).collect();
        assert_eq!(ids, vec!["gpt-3.5-turbo", "gpt-4-turbo"]);
    }

    #[test]
    fn test_embeddings_never_selected() {
        let registry = ModelRegistry::builtins();
        let pricing = PricingTable::builtin();
        let ranked = ModelSelector::new(&registry, &pricing).rank(100, 0).unwrap();
        assert!(ranked.iter().all(|s| !s.model.starts_with("text-embedding")));
    }

    #[test]
    fn test_nothing_fits() {
        let registry = ModelRegistry::builtins();
        let pricing = PricingTable::builtin();
        let selector = ModelSelector::new(&registry, &pricing);

        assert!(matches!(
            selector.cheapest_fit(300_000, 100),
            Err(Error::NoSuitableModel {
                required_tokens: 300_100
            })
        ));
        assert!(matches!(
            selector.cheapest_fit(-1, 100),
            Err(Error::InvalidInput { .. })
        ));
    }
}
