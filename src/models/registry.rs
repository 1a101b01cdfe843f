use std::collections::HashMap;

use super::builtin;
use super::provider::{ModelKind, Provider};
use super::spec::{ModelId, ModelSpec};
use crate::budget::PriceEntry;
use crate::config::ModelOverride;
use crate::{Error, Result};

#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    models: HashMap<ModelId, ModelSpec>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builtins() -> Self {
        let mut registry = Self::new();
        builtin::register_all(&mut registry);
        registry
    }

    pub fn register(&mut self, spec: ModelSpec) {
        self.models.insert(spec.id.clone(), spec);
    }

    /// Applies settings overrides.
    ///
    /// Known models take the new prices and any window given. Unknown models
    /// are registered only when they declare a context window; otherwise they
    /// exist in the price table alone.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, ModelOverride>) {
        for (id, over) in overrides {
            let pricing = PriceEntry::new(over.input_price_per_1k, over.output_price_per_1k);
            if let Some(spec) = self.models.get_mut(id) {
                spec.pricing = pricing;
                if let Some(window) = over.context_window {
                    spec.context_window = window;
                }
                if let Some(max_output) = over.max_output_tokens {
                    spec.max_output_tokens = max_output;
                }
                if let Some(provider) = over.provider {
                    spec.provider = provider;
                }
                if let Some(kind) = over.kind {
                    spec.kind = kind;
                }
            } else if let Some(window) = over.context_window {
                tracing::debug!(model = %id, window, "registering model from settings");
                self.register(ModelSpec {
                    id: id.clone(),
                    provider: over.provider.unwrap_or(Provider::Other),
                    kind: over.kind.unwrap_or_default(),
                    context_window: window,
                    max_output_tokens: over.max_output_tokens.unwrap_or(window),
                    pricing,
                });
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<&ModelSpec> {
        self.models.get(id)
    }

    /// Exact lookup; unknown ids are an error, never a fallback model.
    pub fn resolve(&self, id: &str) -> Result<&ModelSpec> {
        self.models.get(id).ok_or_else(|| Error::unknown_model(id))
    }

    pub fn context_window(&self, id: &str) -> Result<u64> {
        self.resolve(id).map(|spec| spec.context_window)
    }

    /// All models ordered by id.
    pub fn all(&self) -> impl Iterator<Item = &ModelSpec> {
        let mut specs: Vec<&ModelSpec> = self.models.values().collect();
        specs.sort_by(|a, b| a.id.cmp(&b.id));
        specs.into_iter()
    }

    pub fn by_provider(&self, provider: Provider) -> Vec<&ModelSpec> {
        self.all().filter(|spec| spec.provider == provider).collect()
    }

    pub fn by_kind(&self, kind: ModelKind) -> Vec<&ModelSpec> {
        self.all().filter(|spec| spec.kind == kind).collect()
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }
}
