use std::str::FromStr;

use super::orchestrator::AiProvider;
use super::providers::{seed_for, PROVIDER_SEEDS};
use crate::errors::GameError;

pub const DEFAULT_APP_URL: &str = "http://localhost:3000";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    OpenRouter,
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    pub fn id(&self) -> &'static str {
        seed_for(*self).id
    }

    pub fn display_name(&self) -> &'static str {
        seed_for(*self).display
    }

    pub fn default_base_url(&self) -> &'static str {
        seed_for(*self).base_url
    }
}

impl FromStr for ProviderKind {
    type Err = GameError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let wanted = value.trim().to_lowercase();
        PROVIDER_SEEDS
            .iter()
            .find(|seed| seed.id == wanted)
            .map(|seed| seed.kind)
            .ok_or_else(|| {
                GameError::Configuration(format!(
                    "Unsupported AI provider: {value}. Supported providers: openrouter, openai, anthropic, gemini"
                ))
            })
    }
}

/// Resolved credentials and model choice for one provider.
#[derive(Debug, Clone)]
pub struct AiProviderConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub fallback_model: Option<String>,
    /// Sent as `HTTP-Referer` by the OpenRouter wire format.
    pub app_url: String,
}

/// Raw provider settings as read from the environment or supplied by a host.
#[derive(Debug, Clone, Default)]
pub struct AiServiceConfig {
    pub provider: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub model: Option<String>,
    pub fallback_model: Option<String>,
    pub app_url: Option<String>,
}

impl AiServiceConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup so hosts and tests do not have to
    /// touch the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        Self {
            provider: non_empty("AI_PROVIDER").unwrap_or_else(|| "openrouter".to_string()),
            api_key: non_empty("AI_API_KEY"),
            base_url: non_empty("AI_BASE_URL"),
            model: non_empty("AI_MODEL"),
            fallback_model: non_empty("AI_FALLBACK_MODEL"),
            app_url: non_empty("APP_URL"),
        }
    }
}

/// Select and construct the provider variant for `config`. Fails before any
/// network traffic when the kind is unknown or credentials are incomplete.
pub fn create_provider(config: &AiServiceConfig) -> Result<AiProvider, GameError> {
    let kind: ProviderKind = config.provider.parse()?;
    let api_key = config
        .api_key
        .as_deref()
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .ok_or_else(|| GameError::Configuration("Missing AI_API_KEY environment variable".into()))?;
    let model = config
        .model
        .as_deref()
        .map(str::trim)
        .filter(|m| !m.is_empty())
        .ok_or_else(|| GameError::Configuration("Missing AI_MODEL environment variable".into()))?;

    let base_url = config
        .base_url
        .clone()
        .unwrap_or_else(|| kind.default_base_url().to_string());

    AiProvider::new(
        kind,
        AiProviderConfig {
            api_key: api_key.to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            fallback_model: config
                .fallback_model
                .clone()
                .filter(|m| !m.trim().is_empty()),
            app_url: config
                .app_url
                .clone()
                .unwrap_or_else(|| DEFAULT_APP_URL.to_string()),
        },
    )
}
