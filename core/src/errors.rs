use serde::Serialize;
use thiserror::Error;

/// Coarse classification reported to callers of the word supply layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GenerationErrorKind {
    ApiError,
    RateLimit,
    GenerationError,
}

impl GenerationErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApiError => "api_error",
            Self::RateLimit => "rate_limit",
            Self::GenerationError => "generation_error",
        }
    }
}

#[derive(Debug, Error)]
pub enum GameError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    Configuration(String),
    #[error("{provider} API error ({model}): {status} - {message}")]
    Provider {
        provider: String,
        model: String,
        status: u16,
        message: String,
    },
    #[error("Failed to parse JSON response from {provider}: {detail}")]
    Parse { provider: String, detail: String },
    #[error("Generated words quality below threshold ({survivors}/{required})")]
    Quality { survivors: usize, required: usize },
    #[error("{message}")]
    Generation {
        kind: GenerationErrorKind,
        message: String,
    },
    #[error("Storage error: {0}")]
    Storage(String),
}

impl GameError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VAL-1001",
            Self::Configuration(_) => "CFG-1001",
            Self::Provider { .. } => "AI-1001",
            Self::Parse { .. } => "AI-1002",
            Self::Quality { .. } => "GEN-1002",
            Self::Generation { .. } => "GEN-1001",
            Self::Storage(_) => "DB-1001",
        }
    }

    pub fn explain(&self) -> &'static str {
        match self {
            Self::Validation(_) => "The request was malformed or a value was out of range.",
            Self::Configuration(_) => "The AI provider is unknown or its credentials are missing.",
            Self::Provider { .. } => "The upstream AI provider answered with a non-success status.",
            Self::Parse { .. } => "The upstream AI provider answered without a usable JSON payload.",
            Self::Quality { .. } => "Too many generated hints leaked their target word.",
            Self::Generation { .. } => "A secret word could not be produced for this round.",
            Self::Storage(_) => "The application could not access the SQLite database.",
        }
    }

    /// Classify the failure for observability. Rate limits win over generic
    /// upstream failures.
    pub fn kind(&self) -> GenerationErrorKind {
        match self {
            Self::Generation { kind, .. } => *kind,
            Self::Provider {
                status, message, ..
            } => {
                if *status == 429 || message.to_lowercase().contains("rate limit") {
                    GenerationErrorKind::RateLimit
                } else {
                    GenerationErrorKind::ApiError
                }
            }
            _ => GenerationErrorKind::GenerationError,
        }
    }

    /// Fold any failure into the umbrella category surfaced by the word supply.
    pub fn into_generation(self) -> Self {
        match self {
            Self::Generation { .. } => self,
            other => Self::Generation {
                kind: other.kind(),
                message: other.to_string(),
            },
        }
    }

    pub fn generation(message: impl Into<String>) -> Self {
        Self::Generation {
            kind: GenerationErrorKind::GenerationError,
            message: message.into(),
        }
    }
}

impl From<r2d2::Error> for GameError {
    fn from(err: r2d2::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<rusqlite::Error> for GameError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<serde_json::Error> for GameError {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(err.to_string())
    }
}
