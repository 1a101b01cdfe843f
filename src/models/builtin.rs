use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use super::provider::{ModelKind, Provider};
use super::registry::ModelRegistry;
use super::spec::ModelSpec;
use crate::budget::PriceEntry;

// Embedding models accept 8191 input tokens and bill no output.
const EMBEDDING_WINDOW: u64 = 8_191;

pub fn register_all(registry: &mut ModelRegistry) {
    registry.register(chat("gpt-3.5-turbo", Provider::OpenAi, 4_096, 4_096, dec!(0.0015), dec!(0.002)));
    registry.register(chat("gpt-3.5-turbo-16k", Provider::OpenAi, 16_385, 4_096, dec!(0.003), dec!(0.004)));
    registry.register(chat("gpt-4", Provider::OpenAi, 8_192, 8_192, dec!(0.03), dec!(0.06)));
    registry.register(chat("gpt-4-32k", Provider::OpenAi, 32_768, 32_768, dec!(0.06), dec!(0.12)));
    registry.register(chat("gpt-4-turbo", Provider::OpenAi, 128_000, 4_096, dec!(0.01), dec!(0.03)));

    registry.register(embedding("text-embedding-3-small", dec!(0.00002)));
    registry.register(embedding("text-embedding-3-large", dec!(0.00013)));
    registry.register(embedding("text-embedding-ada-002", dec!(0.0001)));

    registry.register(chat("claude-3-haiku", Provider::Anthropic, 200_000, 4_096, dec!(0.00025), dec!(0.00125)));
    registry.register(chat("claude-3-sonnet", Provider::Anthropic, 200_000, 4_096, dec!(0.003), dec!(0.015)));
    registry.register(chat("claude-3-opus", Provider::Anthropic, 200_000, 4_096, dec!(0.015), dec!(0.075)));
}

fn chat(
    id: &str,
    provider: Provider,
    context_window: u64,
    max_output_tokens: u64,
    input_per_1k: Decimal,
    output_per_1k: Decimal,
) -> ModelSpec {
    ModelSpec {
        id: id.into(),
        provider,
        kind: ModelKind::Chat,
        context_window,
        max_output_tokens,
        pricing: PriceEntry::new(input_per_1k, output_per_1k),
    }
}

fn embedding(id: &str, input_per_1k: Decimal) -> ModelSpec {
    ModelSpec {
        id: id.into(),
        provider: Provider::OpenAi,
        kind: ModelKind::Embedding,
        context_window: EMBEDDING_WINDOW,
        max_output_tokens: 0,
        pricing: PriceEntry::new(input_per_1k, Decimal::ZERO),
    }
}
