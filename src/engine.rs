//! Facade owning one estimator, price table and model registry.

use std::sync::Arc;

use rust_decimal::Decimal;

use crate::budget::{CostQuote, CostTracker, OnExceed, PricingTable, PricingTableBuilder};
use crate::config::Settings;
use crate::models::{ModelRegistry, ModelSelector, Selection};
use crate::tokens::{ContextBudget, ContextWindow, TokenEstimate, TokenEstimator, plan_turns};
use crate::{Result, non_negative};

/// Immutable after construction and cheap to clone; safe to share between
/// threads without locking.
#[derive(Debug, Clone)]
pub struct EstimationEngine {
    estimator: TokenEstimator,
    pricing: Arc<PricingTable>,
    registry: Arc<ModelRegistry>,
    warning_threshold: Option<Decimal>,
    max_cost: Option<Decimal>,
    on_exceed: OnExceed,
}

impl EstimationEngine {
    /// Builtin models and the default 1.3 tokens-per-word ratio.
    pub fn builtin() -> Self {
        let settings = Settings::default();
        Self {
            estimator: TokenEstimator::default(),
            pricing: Arc::new(PricingTable::builtin()),
            registry: Arc::new(ModelRegistry::builtins()),
            warning_threshold: settings.warning_threshold,
            max_cost: settings.max_cost,
            on_exceed: settings.on_exceed,
        }
    }

    pub fn from_settings(settings: &Settings) -> Result<Self> {
        settings.validate()?;
        let estimator = TokenEstimator::with_ratio(settings.tokens_per_word)?;

        let mut registry = ModelRegistry::builtins();
        registry.apply_overrides(&settings.models);

        let mut builder = PricingTableBuilder::new().with_registry(&registry);
        for (id, over) in &settings.models {
            if registry.get(id).is_none() {
                builder = builder.model_base(
                    id.clone(),
                    over.input_price_per_1k,
                    over.output_price_per_1k,
                );
            }
        }
        let pricing = builder.build();
        tracing::debug!(
            models = pricing.len(),
            tokens_per_word = %estimator.tokens_per_word(),
            "estimation engine ready"
        );

        Ok(Self {
            estimator,
            pricing: Arc::new(pricing),
            registry: Arc::new(registry),
            warning_threshold: settings.warning_threshold,
            max_cost: settings.max_cost,
            on_exceed: settings.on_exceed,
        })
    }

    pub fn estimator(&self) -> &TokenEstimator {
        &self.estimator
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    pub fn estimate_tokens(&self, word_count: i64) -> Result<u64> {
        self.estimator.estimate_tokens(word_count)
    }

    pub fn estimate_words(&self, token_count: i64) -> Result<u64> {
        self.estimator.estimate_words(token_count)
    }

    pub fn estimate(&self, word_count: i64) -> Result<TokenEstimate> {
        self.estimator.estimate(word_count)
    }

    pub fn estimate_text(&self, text: &str) -> Result<TokenEstimate> {
        self.estimator.estimate_text(text)
    }

    pub fn calculate_cost(
        &self,
        model: &str,
        input_tokens: i64,
        output_tokens: i64,
    ) -> Result<CostQuote> {
        self.pricing.calculate_cost(model, input_tokens, output_tokens)
    }

    /// Quotes a call before it is made: prompt tokens are estimated from the
    /// text and the completion is assumed to use `max_output_tokens`.
    pub fn estimate_text_cost(
        &self,
        model: &str,
        prompt: &str,
        max_output_tokens: i64,
    ) -> Result<CostQuote> {
        let output = non_negative("max_output_tokens", max_output_tokens)?;
        let estimate = self.estimator.estimate_text(prompt)?;
        let pricing = self.pricing.get(model)?;
        Ok(pricing.quote(model, estimate.estimated_tokens, output))
    }

    pub fn max_turns(
        &self,
        window_tokens: i64,
        system_tokens: i64,
        per_turn_user_tokens: i64,
        per_turn_assistant_tokens: i64,
    ) -> Result<u64> {
        self.plan_turns(
            window_tokens,
            system_tokens,
            per_turn_user_tokens,
            per_turn_assistant_tokens,
        )
        .map(|budget| budget.max_turns)
    }

    pub fn plan_turns(
        &self,
        window_tokens: i64,
        system_tokens: i64,
        per_turn_user_tokens: i64,
        per_turn_assistant_tokens: i64,
    ) -> Result<ContextBudget> {
        plan_turns(
            window_tokens,
            system_tokens,
            per_turn_user_tokens,
            per_turn_assistant_tokens,
        )
    }

    /// Plans turns against a registered model's context window.
    pub fn plan_turns_for_model(
        &self,
        model: &str,
        system_tokens: i64,
        per_turn_user_tokens: i64,
        per_turn_assistant_tokens: i64,
    ) -> Result<ContextBudget> {
        let window = self.registry.context_window(model)?;
        let window = i64::try_from(window)
            .map_err(|_| crate::Error::invalid("window_tokens", window, "too large"))?;
        plan_turns(
            window,
            system_tokens,
            per_turn_user_tokens,
            per_turn_assistant_tokens,
        )
    }

    pub fn max_turns_for_model(
        &self,
        model: &str,
        system_tokens: i64,
        per_turn_user_tokens: i64,
        per_turn_assistant_tokens: i64,
    ) -> Result<u64> {
        self.plan_turns_for_model(
            model,
            system_tokens,
            per_turn_user_tokens,
            per_turn_assistant_tokens,
        )
        .map(|budget| budget.max_turns)
    }

    pub fn context_window(&self, model: &str) -> Result<ContextWindow> {
        self.registry.resolve(model).map(ContextWindow::for_model)
    }

    pub fn selector(&self) -> ModelSelector<'_> {
        ModelSelector::new(&self.registry, &self.pricing)
    }

    pub fn cheapest_fit(&self, input_tokens: i64, output_tokens: i64) -> Result<Selection> {
        self.selector().cheapest_fit(input_tokens, output_tokens)
    }

    /// Session tracker sharing this engine's price table and limits.
    pub fn tracker(&self) -> CostTracker {
        CostTracker::new(Arc::clone(&self.pricing))
            .with_warning_threshold(self.warning_threshold)
            .with_max_cost(self.max_cost)
            .with_on_exceed(self.on_exceed)
    }
}

impl Default for EstimationEngine {
    fn default() -> Self {
        Self::builtin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::config::ModelOverride;
    use rust_decimal_macros::dec;

    #[test]
    fn test_builtin_engine() {
        let engine = EstimationEngine::builtin();
        assert_eq!(engine.estimate_tokens(500).unwrap(), 650);
        assert_eq!(engine.max_turns(16_000, 200, 50, 150).unwrap(), 79);

        let quote = engine.calculate_cost("gpt-3.5-turbo", 100, 200).unwrap();
        assert_eq!(quote.total_cost, dec!(0.00055));
    }

    #[test]
    fn test_from_settings() {
        let mut settings = Settings {
            tokens_per_word: dec!(1.5),
            ..Default::default()
        };
        settings.models.insert(
            "gpt-4".into(),
            ModelOverride::prices(dec!(0.02), dec!(0.04)),
        );
        settings.models.insert(
            "priced-only".into(),
            ModelOverride::prices(dec!(0.5), dec!(0.5)),
        );

        let engine = EstimationEngine::from_settings(&settings).unwrap();
        assert_eq!(engine.estimate_tokens(100).unwrap(), 150);

        let quote = engine.calculate_cost("gpt-4", 1_000, 1_000).unwrap();
        assert_eq!(quote.total_cost, dec!(0.06));
        assert_eq!(
            engine.registry().resolve("gpt-4").unwrap().pricing,
            *engine.pricing().get("gpt-4").unwrap()
        );

        // priced but without a window: quotable, not plannable
        assert!(engine.calculate_cost("priced-only", 1, 1).is_ok());
        assert!(matches!(
            engine.max_turns_for_model("priced-only", 0, 1, 1),
            Err(Error::UnknownModel { .. })
        ));
    }

    #[test]
    fn test_from_invalid_settings() {
        let settings = Settings {
            tokens_per_word: dec!(0),
            ..Default::default()
        };
        assert!(matches!(
            EstimationEngine::from_settings(&settings),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_estimate_text_cost() {
        let engine = EstimationEngine::builtin();
        // 10 words -> 13 tokens
        let quote = engine
            .estimate_text_cost("gpt-4", "one two three four five six seven eight nine ten", 1_000)
            .unwrap();
        assert_eq!(quote.input_tokens, 13);
        assert_eq!(quote.output_tokens, 1_000);
        assert_eq!(quote.input_cost, dec!(0.00039));
        assert_eq!(quote.output_cost, dec!(0.06));

        assert!(engine.estimate_text_cost("gpt-4", "hi", -1).is_err());
        assert!(engine.estimate_text_cost("nope", "hi", 1).is_err());
    }

    #[test]
    fn test_turns_for_model() {
        let engine = EstimationEngine::builtin();
        // gpt-3.5-turbo: 4096 window
        assert_eq!(
            engine.max_turns_for_model("gpt-3.5-turbo", 96, 300, 700).unwrap(),
            4
        );
        assert!(matches!(
            engine.max_turns_for_model("gpt-3.5-turbo", 5_000, 1, 1),
            Err(Error::BudgetExceeded { deficit: 904, .. })
        ));

        let window = engine.context_window("gpt-4").unwrap();
        assert_eq!(window.limit(), 8_192);
    }

    #[test]
    fn test_tracker_uses_settings_limits() {
        let settings = Settings {
            max_cost: Some(dec!(0.001)),
            ..Default::default()
        };
        let settings = Settings {
            warning_threshold: None,
            ..settings
        };
        let engine = EstimationEngine::from_settings(&settings).unwrap();
        let tracker = engine.tracker();

        tracker.record("gpt-3.5-turbo", 1_000, 0).unwrap();
        assert!(matches!(
            tracker.record("gpt-3.5-turbo", 1, 1),
            Err(Error::CostLimitExceeded { .. })
        ));
    }
}
