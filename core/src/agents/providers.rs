use super::config::ProviderKind;

/// Static metadata for each supported provider kind.
pub struct ProviderSeed {
    pub kind: ProviderKind,
    pub id: &'static str,
    pub display: &'static str,
    pub base_url: &'static str,
}

pub const PROVIDER_SEEDS: &[ProviderSeed] = &[
    ProviderSeed {
        kind: ProviderKind::OpenRouter,
        id: "openrouter",
        display: "OpenRouter",
        base_url: "https://openrouter.ai/api/v1",
    },
    ProviderSeed {
        kind: ProviderKind::OpenAi,
        id: "openai",
        display: "OpenAI",
        base_url: "https://api.openai.com/v1",
    },
    ProviderSeed {
        kind: ProviderKind::Anthropic,
        id: "anthropic",
        display: "Anthropic",
        base_url: "https://api.anthropic.com/v1",
    },
    ProviderSeed {
        kind: ProviderKind::Gemini,
        id: "gemini",
        display: "Google Gemini",
        base_url: "https://generativelanguage.googleapis.com/v1beta",
    },
];

pub fn seed_for(kind: ProviderKind) -> &'static ProviderSeed {
    PROVIDER_SEEDS
        .iter()
        .find(|seed| seed.kind == kind)
        .unwrap_or(&PROVIDER_SEEDS[0])
}
