use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    OpenAi,
    Anthropic,
    /// Self-hosted or otherwise unlisted provider.
    Other,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::Other => "other",
        }
    }
}

impl std::fmt::Display for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelKind {
    #[default]
    Chat,
    Embedding,
}

impl ModelKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Embedding => "embedding",
        }
    }

    /// Whether the model produces billed output tokens.
    pub fn generates_output(&self) -> bool {
        matches!(self, Self::Chat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_provider_serde() {
        assert_eq!(serde_json::to_string(&Provider::OpenAi).unwrap(), "\"openai\"");
        let parsed: Provider = serde_json::from_str("\"anthropic\"").unwrap();
        assert_eq!(parsed, Provider::Anthropic);
        assert_eq!(Provider::Other.to_string(), "other");
    }

    #[test]
    fn test_kind() {
        assert!(ModelKind::Chat.generates_output());
        assert!(!ModelKind::Embedding.generates_output());
        let parsed: ModelKind = serde_json::from_str("\"embedding\"").unwrap();
        assert_eq!(parsed, ModelKind::Embedding);
    }
}
