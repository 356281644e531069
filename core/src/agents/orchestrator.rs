use std::sync::OnceLock;
use std::time::Duration;

use async_trait::async_trait;
use regex::Regex;
use reqwest::Client;
use serde_json::{json, Value};

use super::config::{AiProviderConfig, ProviderKind};
use crate::errors::GameError;

pub const DEFAULT_MAX_TOKENS: u32 = 1500;
pub const DEFAULT_TEMPERATURE: f32 = 0.7;

#[derive(Debug, Clone)]
pub struct GenerateWordsOptions {
    pub prompt: String,
    pub system_prompt: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl GenerateWordsOptions {
    pub fn new(prompt: impl Into<String>, system_prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: system_prompt.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

/// Capability shared by every word-generating backend. Implementations return
/// the decoded JSON document (`{"wordsWithHints": [...]}`); shape validation is
/// the caller's job.
#[async_trait]
pub trait WordProvider: Send + Sync {
    /// `retry_count` is 0 for a fresh call; 1 means the primary model already
    /// failed and the fallback model should be used.
    async fn generate_words(
        &self,
        options: &GenerateWordsOptions,
        retry_count: u32,
    ) -> Result<Value, GameError>;

    fn provider_name(&self) -> &str;
}

/// Fully encoded HTTP request for one attempt.
#[derive(Debug, Clone)]
pub struct WireRequest {
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Value,
}

/// One of the four supported wire protocols, selected by [`ProviderKind`].
pub struct AiProvider {
    kind: ProviderKind,
    config: AiProviderConfig,
    client: Client,
}

impl AiProvider {
    pub fn new(kind: ProviderKind, config: AiProviderConfig) -> Result<Self, GameError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(45))
            .user_agent("Impostor-Core/0.1")
            .build()
            .map_err(|err| {
                GameError::Configuration(format!("failed to construct HTTP client: {err}"))
            })?;
        Ok(Self {
            kind,
            config,
            client,
        })
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn config(&self) -> &AiProviderConfig {
        &self.config
    }

    fn max_attempts(&self) -> u32 {
        if self.config.fallback_model.is_some() {
            2
        } else {
            1
        }
    }

    fn model_for_attempt(&self, attempt: u32) -> &str {
        match (&self.config.fallback_model, attempt) {
            (Some(fallback), n) if n > 0 => fallback.as_str(),
            _ => self.config.model.as_str(),
        }
    }

    pub fn encode_request(&self, model: &str, options: &GenerateWordsOptions) -> WireRequest {
        let base = self.config.base_url.trim_end_matches('/');
        match self.kind {
            ProviderKind::OpenAi => WireRequest {
                url: format!("{base}/chat/completions"),
                headers: vec![("Authorization", format!("Bearer {}", self.config.api_key))],
                body: chat_completions_body(model, options),
            },
            ProviderKind::OpenRouter => WireRequest {
                url: format!("{base}/chat/completions"),
                headers: vec![
                    ("Authorization", format!("Bearer {}", self.config.api_key)),
                    ("HTTP-Referer", self.config.app_url.clone()),
                    ("X-Title", "Party Game Word Generator".to_string()),
                ],
                body: chat_completions_body(model, options),
            },
            ProviderKind::Anthropic => WireRequest {
                url: format!("{base}/messages"),
                headers: vec![
                    ("x-api-key", self.config.api_key.clone()),
                    ("anthropic-version", "2023-06-01".to_string()),
                ],
                body: json!({
                    "model": model,
                    "max_tokens": options.max_tokens,
                    "temperature": options.temperature,
                    "system": options.system_prompt,
                    "messages": [{ "role": "user", "content": options.prompt }],
                }),
            },
            ProviderKind::Gemini => WireRequest {
                url: format!(
                    "{base}/models/{model}:generateContent?key={}",
                    self.config.api_key
                ),
                headers: Vec::new(),
                body: json!({
                    "contents": [{
                        "parts": [{ "text": format!("{}\n\n{}", options.system_prompt, options.prompt) }]
                    }],
                    "generationConfig": {
                        "temperature": options.temperature,
                        "maxOutputTokens": options.max_tokens,
                        "topP": 0.9,
                        "responseMimeType": "application/json",
                    }
                }),
            },
        }
    }

    /// Extract the generated text from a success body and parse it as JSON.
    pub fn decode_response(&self, body: &Value) -> Result<Value, GameError> {
        let pointer = match self.kind {
            ProviderKind::OpenAi | ProviderKind::OpenRouter => "/choices/0/message/content",
            ProviderKind::Anthropic => "/content/0/text",
            ProviderKind::Gemini => "/candidates/0/content/parts/0/text",
        };
        let text = body
            .pointer(pointer)
            .and_then(Value::as_str)
            .filter(|text| !text.trim().is_empty())
            .ok_or_else(|| self.parse_error(format!("Invalid response structure from {}", self.provider_name())))?;

        let parsed = match self.kind {
            // Anthropic does not enforce structured output.
            ProviderKind::Anthropic => recover_json(text),
            _ => serde_json::from_str(text).map_err(|err| err.to_string()),
        };
        parsed.map_err(|detail| self.parse_error(detail))
    }

    fn parse_error(&self, detail: String) -> GameError {
        GameError::Parse {
            provider: self.provider_name().to_string(),
            detail,
        }
    }

    async fn request_once(
        &self,
        model: &str,
        options: &GenerateWordsOptions,
    ) -> Result<Value, GameError> {
        let wire = self.encode_request(model, options);
        let mut request = self.client.post(&wire.url).json(&wire.body);
        for (name, value) in &wire.headers {
            request = request.header(*name, value);
        }

        let response = request.send().await.map_err(|err| GameError::Provider {
            provider: self.provider_name().to_string(),
            model: model.to_string(),
            status: err.status().map(|s| s.as_u16()).unwrap_or(0),
            message: err.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let error_body: Option<Value> = response.json().await.ok();
            let message = error_body
                .as_ref()
                .and_then(|b| b.pointer("/error/message"))
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| status.canonical_reason().unwrap_or("Unknown status").to_string());
            return Err(GameError::Provider {
                provider: self.provider_name().to_string(),
                model: model.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response
            .json()
            .await
            .map_err(|err| self.parse_error(err.to_string()))?;
        self.decode_response(&body)
    }
}

#[async_trait]
impl WordProvider for AiProvider {
    async fn generate_words(
        &self,
        options: &GenerateWordsOptions,
        retry_count: u32,
    ) -> Result<Value, GameError> {
        let max_attempts = self.max_attempts();
        let mut attempt = retry_count;
        loop {
            let model = self.model_for_attempt(attempt);
            match self.request_once(model, options).await {
                Ok(document) => return Ok(document),
                Err(err) => {
                    log::error!("{} error with {model}: {err}", self.provider_name());
                    if attempt + 1 < max_attempts {
                        if let Some(fallback) = &self.config.fallback_model {
                            log::warn!("Retrying with fallback model: {fallback}");
                        }
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }

    fn provider_name(&self) -> &str {
        self.kind.display_name()
    }
}

fn chat_completions_body(model: &str, options: &GenerateWordsOptions) -> Value {
    json!({
        "model": model,
        "messages": [
            { "role": "system", "content": options.system_prompt },
            { "role": "user", "content": options.prompt },
        ],
        "response_format": { "type": "json_object" },
        "max_tokens": options.max_tokens,
        "temperature": options.temperature,
        "top_p": 0.9,
        "frequency_penalty": 0.1,
        "presence_penalty": 0.1,
    })
}

fn fenced_block() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*(\{.*\})\s*```").expect("valid regex"))
}

fn object_span() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"))
}

/// Parse `text` as JSON, falling back to a fenced code block and then to the
/// widest `{...}` span.
pub fn recover_json(text: &str) -> Result<Value, String> {
    if let Ok(value) = serde_json::from_str(text.trim()) {
        return Ok(value);
    }
    if let Some(captures) = fenced_block().captures(text) {
        return serde_json::from_str(&captures[1]).map_err(|err| err.to_string());
    }
    if let Some(span) = object_span().find(text) {
        return serde_json::from_str(span.as_str()).map_err(|err| err.to_string());
    }
    Err("No valid JSON found in response".to_string())
}
