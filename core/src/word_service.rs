//! Word supply: serve a secret word from the pool cache, or generate a fresh
//! batch on a miss and keep the remainder for later rounds.
//!
//! Pools are difficulty-agnostic, so a cache hit ignores the requested
//! difficulty. Callers must not overlap requests for the same key; nothing here
//! deduplicates concurrent generations.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use tokio::task::spawn_blocking;

use crate::db::DbPool;
use crate::errors::{GameError, GenerationErrorKind};
use crate::generation::{GenerationRequest, WordGenerator};
use crate::logging::{spawn_event, Event};
use crate::model::{Difficulty, Language, WordBatch, WordWithHints};
use crate::word_pool::WordPoolCache;

/// Number of entries requested per generation.
pub const GENERATION_BATCH: usize = 15;

/// Network boundary for fresh batches. Implementations return entries that
/// already passed shape validation and the quality filter.
#[async_trait]
pub trait WordSource: Send + Sync {
    async fn fetch_words(&self, request: &GenerationRequest) -> Result<Vec<WordWithHints>, GameError>;
}

#[async_trait]
impl WordSource for WordGenerator {
    async fn fetch_words(&self, request: &GenerationRequest) -> Result<Vec<WordWithHints>, GameError> {
        self.generate(request).await
    }
}

/// Calls a remote word-generation endpoint.
pub struct HttpWordSource {
    client: Client,
    endpoint: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: Option<String>,
    metadata: Option<ErrorMetadata>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorMetadata {
    error_type: Option<String>,
}

impl HttpWordSource {
    pub fn new(endpoint: impl Into<String>) -> Result<Self, GameError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|err| GameError::Configuration(format!("failed to construct HTTP client: {err}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl WordSource for HttpWordSource {
    async fn fetch_words(&self, request: &GenerationRequest) -> Result<Vec<WordWithHints>, GameError> {
        let payload = json!({
            "category": request.category,
            "language": request.language,
            "count": request.count,
            "difficulty": request.difficulty,
        });
        let response = self
            .client
            .post(&self.endpoint)
            .json(&payload)
            .send()
            .await
            .map_err(|err| GameError::Generation {
                kind: GenerationErrorKind::ApiError,
                message: err.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body: Option<ErrorBody> = response.json().await.ok();
            let kind = match body
                .as_ref()
                .and_then(|b| b.metadata.as_ref())
                .and_then(|m| m.error_type.as_deref())
            {
                Some("api_error") => GenerationErrorKind::ApiError,
                Some("rate_limit") => GenerationErrorKind::RateLimit,
                _ if status.as_u16() == 429 => GenerationErrorKind::RateLimit,
                _ => GenerationErrorKind::GenerationError,
            };
            let message = body
                .and_then(|b| b.error)
                .unwrap_or_else(|| format!("word generation endpoint returned {status}"));
            return Err(GameError::Generation { kind, message });
        }

        let batch: WordBatch = response
            .json()
            .await
            .map_err(|err| GameError::generation(format!("format mismatch: {err}")))?;
        Ok(batch.words_with_hints)
    }
}

#[derive(Clone)]
pub struct WordSupplyService {
    db: DbPool,
    pools: WordPoolCache,
    source: Arc<dyn WordSource>,
}

impl WordSupplyService {
    pub fn new(db: DbPool, source: Arc<dyn WordSource>) -> Self {
        Self {
            pools: WordPoolCache::new(db.clone()),
            db,
            source,
        }
    }

    pub fn pools(&self) -> &WordPoolCache {
        &self.pools
    }

    /// Every failure is reported as [`GameError::Generation`]; nothing is
    /// retried at this layer.
    pub async fn get_random_word_with_hints(
        &self,
        category: &str,
        language: Language,
        difficulty: Difficulty,
    ) -> Result<WordWithHints, GameError> {
        self.draw(category, language, difficulty)
            .await
            .map_err(GameError::into_generation)
    }

    async fn draw(
        &self,
        category: &str,
        language: Language,
        difficulty: Difficulty,
    ) -> Result<WordWithHints, GameError> {
        let category = category.to_lowercase();

        let cache = self.pools.clone();
        let key = category.clone();
        let cached = spawn_blocking(move || -> Result<Option<WordWithHints>, GameError> {
            match cache.lookup(&key, language)? {
                Some(pool) if !pool.entries.is_empty() => {
                    let (entry, _) = cache.consume_random(pool, &mut rand::thread_rng())?;
                    Ok(Some(entry))
                }
                _ => Ok(None),
            }
        })
        .await
        .map_err(|err| GameError::Storage(err.to_string()))??;

        if let Some(entry) = cached {
            log::debug!("served {category}:{language} from word pool");
            return Ok(entry);
        }

        let request = GenerationRequest {
            category: category.clone(),
            language,
            count: GENERATION_BATCH,
            difficulty,
        };
        let mut survivors = match self.source.fetch_words(&request).await {
            Ok(words) => words,
            Err(err) => {
                spawn_event(
                    &self.db,
                    Event::new(log::Level::Warn, "word.supply", "Word generation failed")
                        .code(err.code())
                        .explain(err.explain())
                        .data(json!({
                            "category": category,
                            "language": language,
                            "difficulty": difficulty,
                            "errorType": err.kind().as_str(),
                            "error": err.to_string(),
                        })),
                );
                return Err(err);
            }
        };
        if survivors.is_empty() {
            return Err(GameError::generation(format!(
                "No words available for category \"{category}\" in language \"{language}\""
            )));
        }

        let index = rand::thread_rng().gen_range(0..survivors.len());
        let selected = survivors.swap_remove(index);
        let remaining = survivors.len();

        if remaining > 0 {
            let cache = self.pools.clone();
            let key = category.clone();
            spawn_blocking(move || cache.store(&key, language, survivors, 1))
                .await
                .map_err(|err| GameError::Storage(err.to_string()))??;
        }

        spawn_event(
            &self.db,
            Event::new(log::Level::Info, "word.supply", "Generated word batch")
                .code("GEN-0200")
                .data(json!({
                    "category": category,
                    "language": language,
                    "difficulty": difficulty,
                    "pooled": remaining,
                })),
        );
        Ok(selected)
    }
}
