//! Estimator settings with layered loading.
//!
//! Loads settings from (lowest to highest priority):
//! 1. Builtin defaults
//! 2. JSON settings file
//! 3. Config providers, usually the `LLM_ESTIMATE_*` environment

use std::collections::HashMap;
use std::path::PathBuf;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use super::env::EnvConfigProvider;
use super::file::SettingsFile;
use super::provider::{ConfigProvider, ConfigProviderExt};
use super::{ConfigError, ConfigResult, ValidationErrors, env_model_key};
use crate::budget::OnExceed;
use crate::models::{ModelKind, ModelRegistry, Provider};
use crate::tokens::DEFAULT_TOKENS_PER_WORD;

pub const DEFAULT_WARNING_THRESHOLD_USD: Decimal = dec!(10);
pub const DEFAULT_MAX_COST_USD: Decimal = dec!(50);

/// Price (and optionally registry) override for one model.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelOverride {
    pub input_price_per_1k: Decimal,
    pub output_price_per_1k: Decimal,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<Provider>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<ModelKind>,
}

impl ModelOverride {
    pub fn prices(input_price_per_1k: Decimal, output_price_per_1k: Decimal) -> Self {
        Self {
            input_price_per_1k,
            output_price_per_1k,
            context_window: None,
            max_output_tokens: None,
            provider: None,
            kind: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub tokens_per_word: Decimal,
    pub warning_threshold: Option<Decimal>,
    pub max_cost: Option<Decimal>,
    pub on_exceed: OnExceed,
    pub models: HashMap<String, ModelOverride>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tokens_per_word: DEFAULT_TOKENS_PER_WORD,
            warning_threshold: Some(DEFAULT_WARNING_THRESHOLD_USD),
            max_cost: Some(DEFAULT_MAX_COST_USD),
            on_exceed: OnExceed::default(),
            models: HashMap::new(),
        }
    }
}

impl Settings {
    /// Collects every violation instead of stopping at the first.
    pub fn validate(&self) -> ConfigResult<()> {
        let mut errors = Vec::new();
        let mut invalid = |key: String, message: String| {
            errors.push(ConfigError::InvalidValue { key, message });
        };

        if self.tokens_per_word <= Decimal::ZERO {
            invalid(
                "tokens_per_word".into(),
                format!("must be positive, got {}", self.tokens_per_word),
            );
        }
        if let Some(warning) = self.warning_threshold
            && warning < Decimal::ZERO
        {
            invalid("warning_threshold".into(), format!("must not be negative, got {}", warning));
        }
        if let Some(max) = self.max_cost
            && max < Decimal::ZERO
        {
            invalid("max_cost".into(), format!("must not be negative, got {}", max));
        }
        if let (Some(warning), Some(max)) = (self.warning_threshold, self.max_cost)
            && warning > max
        {
            invalid(
                "warning_threshold".into(),
                format!("{} is above max_cost {}", warning, max),
            );
        }

        let mut names: Vec<&String> = self.models.keys().collect();
        names.sort();
        for name in names {
            let model = &self.models[name];
            if model.input_price_per_1k < Decimal::ZERO {
                invalid(
                    format!("models.{}.input_price_per_1k", name),
                    "must not be negative".into(),
                );
            }
            if model.output_price_per_1k < Decimal::ZERO {
                invalid(
                    format!("models.{}.output_price_per_1k", name),
                    "must not be negative".into(),
                );
            }
            if model.context_window == Some(0) {
                invalid(
                    format!("models.{}.context_window", name),
                    "must be positive".into(),
                );
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::ValidationErrors(ValidationErrors(errors)))
        }
    }

    /// Applies scalar and per-model price values from a provider.
    pub fn apply_provider(&mut self, provider: &dyn ConfigProvider) -> ConfigResult<()> {
        if let Some(ratio) = provider.get_parsed::<Decimal>("TOKENS_PER_WORD")? {
            self.tokens_per_word = ratio;
        }
        if let Some(warning) = provider.get_parsed::<Decimal>("COST_WARNING_THRESHOLD")? {
            self.warning_threshold = Some(warning);
        }
        if let Some(max) = provider.get_parsed::<Decimal>("COST_MAX_THRESHOLD")? {
            self.max_cost = Some(max);
        }
        if let Some(raw) = provider.get_raw("ON_EXCEED")? {
            self.on_exceed = raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: "ON_EXCEED".into(),
                message,
            })?;
        }

        let mut names: Vec<String> = ModelRegistry::builtins()
            .all()
            .map(|spec| spec.id.clone())
            .collect();
        names.extend(self.models.keys().cloned());
        names.sort();
        names.dedup();

        for name in names {
            let key = env_model_key(&name);
            let input = provider.get_parsed::<Decimal>(&format!("PRICING_{}_INPUT", key))?;
            let output = provider.get_parsed::<Decimal>(&format!("PRICING_{}_OUTPUT", key))?;
            let (input, output) = match (input, output) {
                (Some(input), Some(output)) => (input, output),
                (None, None) => continue,
                (Some(_), None) => {
                    return Err(ConfigError::InvalidValue {
                        key: format!("PRICING_{}_OUTPUT", key),
                        message: format!("must be set together with PRICING_{}_INPUT", key),
                    });
                }
                (None, Some(_)) => {
                    return Err(ConfigError::InvalidValue {
                        key: format!("PRICING_{}_INPUT", key),
                        message: format!("must be set together with PRICING_{}_OUTPUT", key),
                    });
                }
            };
            tracing::debug!(model = %name, source = provider.name(), "price override applied");
            self.models
                .entry(name)
                .and_modify(|m| {
                    m.input_price_per_1k = input;
                    m.output_price_per_1k = output;
                })
                .or_insert_with(|| ModelOverride::prices(input, output));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct SettingsLoader {
    file: Option<PathBuf>,
    require_file: bool,
    providers: Vec<Box<dyn ConfigProvider>>,
}

impl SettingsLoader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Settings file that must exist.
    pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
        self.file = Some(path.into());
        self.require_file = true;
        self
    }

    /// Platform settings file, used only when present.
    pub fn default_file(mut self) -> Self {
        self.file = SettingsFile::default_path();
        self.require_file = false;
        self
    }

    /// `LLM_ESTIMATE_*` environment variables.
    pub fn env(self) -> Self {
        self.provider(Box::new(EnvConfigProvider::default()))
    }

    pub fn provider(mut self, provider: Box<dyn ConfigProvider>) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn load(self) -> ConfigResult<Settings> {
        let mut settings = match &self.file {
            Some(path) => {
                let file = SettingsFile::new(path);
                if self.require_file || file.exists() {
                    file.load()?
                } else {
                    Settings::default()
                }
            }
            None => Settings::default(),
        };

        for provider in &self.providers {
            settings.apply_provider(provider.as_ref())?;
        }

        settings.validate()?;
        Ok(settings)
    }
}
