use serde::{Deserialize, Serialize};

use super::provider::{ModelKind, Provider};
use crate::budget::PriceEntry;

pub type ModelId = String;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub id: ModelId,
    pub provider: Provider,
    pub kind: ModelKind,
    pub context_window: u64,
    pub max_output_tokens: u64,
    pub pricing: PriceEntry,
}

impl ModelSpec {
    /// Whether a request of this size fits the window and output limit.
    pub fn fits(&self, input_tokens: u64, output_tokens: u64) -> bool {
        input_tokens.saturating_add(output_tokens) <= self.context_window
            && output_tokens <= self.max_output_tokens
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn spec() -> ModelSpec {
        ModelSpec {
            id: "gpt-3.5-turbo".into(),
            provider: Provider::OpenAi,
            kind: ModelKind::Chat,
            context_window: 4_096,
            max_output_tokens: 4_096,
            pricing: PriceEntry::new(dec!(0.0015), dec!(0.002)),
        }
    }

    #[test]
    fn test_fits() {
        let spec = spec();
        assert!(spec.fits(3_000, 1_096));
        assert!(!spec.fits(3_000, 1_097));
        assert!(!spec.fits(u64::MAX, 1));
    }

    #[test]
    fn test_output_limit() {
        let spec = ModelSpec {
            context_window: 128_000,
            max_output_tokens: 4_096,
            ..spec()
        };
        assert!(spec.fits(100_000, 4_096));
        assert!(!spec.fits(1_000, 5_000));
    }
}
