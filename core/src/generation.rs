//! Word batch generation: prompt, provider call, shape check and quality
//! filter. This is the pipeline behind the word-generation endpoint and the
//! in-process word source.

use std::sync::Arc;

use serde_json::Value;

use crate::agents::{GenerateWordsOptions, WordProvider};
use crate::errors::GameError;
use crate::model::{Difficulty, Language, WordBatch, WordWithHints};
use crate::prompts::{create_prompt, validate_response, SYSTEM_PROMPT};

pub const MAX_BATCH_SIZE: usize = 15;
pub const MAX_CATEGORY_LEN: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub category: String,
    pub language: Language,
    pub count: usize,
    pub difficulty: Difficulty,
}

impl GenerationRequest {
    /// Validate an untyped request body. Checks run in a fixed order and the
    /// first failure wins.
    pub fn from_json(body: &Value) -> Result<Self, GameError> {
        let invalid = |msg: &str| GameError::Validation(msg.to_string());

        let category = body
            .get("category")
            .and_then(Value::as_str)
            .filter(|c| !c.trim().is_empty())
            .ok_or_else(|| invalid("Category is required and must be a string"))?;

        let language = match body.get("language") {
            None | Some(Value::Null) => return Err(invalid("Language is required")),
            Some(Value::String(code)) if code.is_empty() => {
                return Err(invalid("Language is required"))
            }
            Some(Value::String(code)) => code.parse::<Language>().map_err(GameError::Validation)?,
            Some(other) => return Err(GameError::Validation(format!("Unsupported language: {other}"))),
        };

        let count = body
            .get("count")
            .and_then(Value::as_u64)
            .filter(|c| (1..=MAX_BATCH_SIZE as u64).contains(c))
            .ok_or_else(|| invalid("Count must be a number between 1 and 15"))?
            as usize;

        let difficulty = match body.get("difficulty") {
            None | Some(Value::Null) => Difficulty::default(),
            Some(value) => value
                .as_str()
                .and_then(|d| d.parse::<Difficulty>().ok())
                .ok_or_else(|| invalid(r#"Difficulty must be "easy", "medium", or "hard""#))?,
        };

        let category = category.trim().to_lowercase();
        if category.chars().count() > MAX_CATEGORY_LEN {
            return Err(invalid("Category name too long (max 50 characters)"));
        }

        Ok(Self {
            category,
            language,
            count,
            difficulty,
        })
    }
}

/// Minimum survivors for a batch of `count`: `ceil(count * 0.8)`.
pub fn required_survivors(count: usize) -> usize {
    (count * 4).div_ceil(5)
}

fn leaks_word(entry: &WordWithHints) -> bool {
    let word = entry.word.trim().to_lowercase();
    entry.hints.iter().any(|hint| {
        let hint = hint.to_lowercase();
        hint.contains(&word) || word.contains(&hint)
    })
}

/// Drop entries whose hints contain the word (or the reverse) and single
/// character words.
pub fn quality_filter(entries: Vec<WordWithHints>) -> Vec<WordWithHints> {
    entries
        .into_iter()
        .filter(|entry| entry.word.trim().chars().count() > 1 && !leaks_word(entry))
        .collect()
}

#[derive(Clone)]
pub struct WordGenerator {
    provider: Arc<dyn WordProvider>,
}

impl WordGenerator {
    pub fn new(provider: Arc<dyn WordProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    pub async fn generate(
        &self,
        request: &GenerationRequest,
    ) -> Result<Vec<WordWithHints>, GameError> {
        let prompt = create_prompt(
            &request.category,
            request.language,
            request.count,
            request.difficulty,
        );
        log::info!(
            "Generating {} words for category \"{}\" in {} ({} difficulty) via {}",
            request.count,
            request.category,
            request.language,
            request.difficulty.as_str(),
            self.provider.provider_name()
        );

        let options = GenerateWordsOptions::new(prompt, SYSTEM_PROMPT);
        let document = self.provider.generate_words(&options, 0).await?;

        if !validate_response(&document, request.count) {
            return Err(GameError::generation(
                "Generated response does not match expected format or count (format mismatch)",
            ));
        }
        let batch: WordBatch = serde_json::from_value(document).map_err(|err| {
            GameError::generation(format!("format mismatch: {err}"))
        })?;

        let survivors = quality_filter(batch.words_with_hints);
        let required = required_survivors(request.count);
        if survivors.len() < required {
            return Err(GameError::Quality {
                survivors: survivors.len(),
                required,
            });
        }
        Ok(survivors)
    }
}


#[cfg(test)]
mod tests {
    use super::testing::{batch, StubProvider};
    use super::*;
    use serde_json::json;

    fn request(count: usize) -> GenerationRequest {
        GenerationRequest {
            category: "animals".into(),
            language: Language::En,
            count,
            difficulty: Difficulty::Medium,
        }
    }

    fn entry(word: &str, hints: [&str; 3]) -> WordWithHints {
        WordWithHints {
            word: word.into(),
            hints: hints.map(str::to_string),
        }
    }

    #[test]
    fn required_survivors_rounds_up() {
        assert_eq!(required_survivors(10), 8);
        assert_eq!(required_survivors(15), 12);
        assert_eq!(required_survivors(1), 1);
        assert_eq!(required_survivors(3), 3);
    }

    #[test]
    fn quality_filter_drops_leaks_in_both_directions() {
        let kept = quality_filter(vec![
            entry("Elephant", ["memory", "circus", "large"]),
            entry("sunflower", ["sun", "seeds", "summer"]),
            entry("cat", ["catalog", "purr", "night"]),
            entry("x", ["a", "b", "c"]),
        ]);
        assert_eq!(kept, vec![entry("Elephant", ["memory", "circus", "large"])]);
    }

    #[test]
    fn request_validation_matches_endpoint_contract() {
        let err = GenerationRequest::from_json(&json!({ "count": 20, "category": "food", "language": "en" }))
            .unwrap_err();
        assert_eq!(err.to_string(), "Count must be a number between 1 and 15");
        let err = GenerationRequest::from_json(&json!({ "language": "en", "count": 5 })).unwrap_err();
        assert_eq!(err.to_string(), "Category is required and must be a string");
        let err = GenerationRequest::from_json(&json!({ "category": "food", "count": 5 })).unwrap_err();
        assert_eq!(err.to_string(), "Language is required");
        let err = GenerationRequest::from_json(
            &json!({ "category": "food", "language": "en", "count": 5, "difficulty": "insane" }),
        )
        .unwrap_err();
        assert_eq!(err.to_string(), r#"Difficulty must be "easy", "medium", or "hard""#);
        let long = "x".repeat(51);
        let err = GenerationRequest::from_json(&json!({ "category": long, "language": "en", "count": 5 }))
            .unwrap_err();
        assert_eq!(err.to_string(), "Category name too long (max 50 characters)");
    }

    #[test]
    fn request_validation_sanitizes_category() {
        let req = GenerationRequest::from_json(&json!({ "category": "  Animals ", "language": "sv", "count": 15 }))
            .unwrap();
        assert_eq!(req.category, "animals");
        assert_eq!(req.language, Language::Sv);
        assert_eq!(req.difficulty, Difficulty::Medium);
    }

    #[tokio::test]
    async fn generate_returns_filtered_survivors() {
        let provider = Arc::new(StubProvider::returning(batch(9, 1)));
        let generator = WordGenerator::new(provider.clone());
        let words = generator.generate(&request(10)).await.unwrap();
        assert_eq!(words.len(), 9);
        assert_eq!(provider.calls(), 1);
    }

    #[tokio::test]
    async fn three_leaks_out_of_ten_fail_quality() {
        let generator = WordGenerator::new(Arc::new(StubProvider::returning(batch(7, 3))));
        let err = generator.generate(&request(10)).await.unwrap_err();
        assert!(matches!(err, GameError::Quality { survivors: 7, required: 8 }));
    }

    #[tokio::test]
    async fn wrong_count_is_a_format_mismatch() {
        let generator = WordGenerator::new(Arc::new(StubProvider::returning(batch(5, 0))));
        let err = generator.generate(&request(10)).await.unwrap_err();
        assert!(err.to_string().contains("format mismatch"));
    }
}
