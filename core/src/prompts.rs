//! Prompt construction and response shape validation for word generation.
//!
//! Everything here is pure: the same inputs always produce the same prompt.

use serde_json::{json, Value};

use crate::model::{Difficulty, Language};

pub const SYSTEM_PROMPT: &str = r#"You are an expert game designer creating words and hints for a party guessing game similar to "One Word" or "Codenames".

CRITICAL REQUIREMENTS:
1. Generate EXACTLY the requested number of words
2. Each word must have EXACTLY 3 hints
3. Hints must be useful but not too obvious
4. Response must be valid JSON with the exact structure specified
5. Words should be common enough that most people know them
6. Avoid proper nouns unless universally known

HINT QUALITY GUIDELINES:
- Hint 1: Broad category or general association
- Hint 2: More specific characteristic or use
- Hint 3: Distinctive feature or context
- Never use the target word or its derivatives in hints
- Keep hints concise (2-4 words each)
- Make hints progressively more specific

EXAMPLE:
For "elephant" in English:
- Hint 1: "large"
- Hint 2: "peanut"
- Hint 3: "ears"

Always respond with valid JSON matching the requested schema. No additional text or explanations."#;

const GENERIC_CATEGORY_CONTEXT: &str = "Generate appropriate words for this category.";

struct LanguageProfile {
    name: &'static str,
    cultural_note: &'static str,
    examples: &'static [(&'static str, &'static str, [&'static str; 3])],
}

const ENGLISH: LanguageProfile = LanguageProfile {
    name: "English",
    cultural_note: "Focus on universally known terms in English-speaking countries.",
    examples: &[
        ("animals", "elephant", ["memory", "circus", "large"]),
        ("food", "pizza", ["delivery", "triangle", "teenage"]),
        ("objects", "hammer", ["judge", "thunder", "construction"]),
        ("places", "library", ["silence", "overdue", "research"]),
        ("professions", "chef", ["temperature", "creativity", "white"]),
    ],
};

const GERMAN: LanguageProfile = LanguageProfile {
    name: "German",
    cultural_note: "Fokussiere auf universell bekannte Begriffe im deutschsprachigen Raum.",
    examples: &[
        ("animals", "Elefant", ["Gedächtnis", "Zirkus", "Groß"]),
        ("food", "Pizza", ["Lieferung", "Dreieck", "Jugendlicher"]),
        ("objects", "Hammer", ["Richter", "Donner", "Bauen"]),
        ("places", "Bibliothek", ["Stille", "Überfällig", "Forschung"]),
        ("professions", "Koch", ["Temperatur", "Kreativität", "Weiß"]),
    ],
};

const SWEDISH: LanguageProfile = LanguageProfile {
    name: "Svenska",
    cultural_note: "Fokusera på allmänt kända termer i svensktalande länder.",
    examples: &[
        ("animals", "elefant", ["minne", "cirkus", "stor"]),
        ("food", "pizza", ["hemleverans", "triangel", "tonåring"]),
        ("objects", "hammare", ["domare", "åska", "byggarbetsplats"]),
        ("places", "bibliotek", ["tystnad", "försenad", "forskning"]),
        ("professions", "kock", ["temperatur", "kreativitet", "vit"]),
    ],
};

fn profile(language: Language) -> &'static LanguageProfile {
    match language {
        Language::En => &ENGLISH,
        Language::De => &GERMAN,
        Language::Sv => &SWEDISH,
    }
}

fn difficulty_modifier(difficulty: Difficulty) -> &'static str {
    match difficulty {
        Difficulty::Easy => {
            "Choose very common, everyday words that most people would recognize immediately."
        }
        Difficulty::Medium => {
            "Choose moderately common words that require some thinking but are still well-known."
        }
        Difficulty::Hard => {
            "Choose less common but still recognizable words that provide a good challenge."
        }
    }
}

fn category_context(category: &str) -> Option<&'static str> {
    let context = match category {
        "animals" => "Include domestic, wild, and exotic animals. Mix common pets with wildlife.",
        "food" => "Include dishes, ingredients, cooking methods, and food items from various cuisines.",
        "objects" => "Include household items, tools, furniture, technology, and everyday objects.",
        "places" => "Include buildings, locations, geographical features, and establishments.",
        "professions" => "Include traditional and modern jobs, skilled trades, and professional roles.",
        "movies" => "Include popular films, classic movies, and well-known franchises.",
        "sports" => "Include popular sports, equipment, positions, and game terminology.",
        "music" => "Include instruments, genres, musical terms, and performance concepts.",
        "nature" => "Include natural phenomena, landscapes, weather, and environmental features.",
        "technology" => "Include devices, software, digital concepts, and modern innovations.",
        _ => return None,
    };
    Some(context)
}

fn example_block(profile: &LanguageProfile, category: &str) -> Option<String> {
    let (_, word, hints) = profile.examples.iter().find(|(key, _, _)| *key == category)?;
    let example = json!({ "wordsWithHints": [{ "word": word, "hints": hints }] });
    serde_json::to_string_pretty(&example)
        .ok()
        .map(|rendered| format!("EXAMPLE FORMAT:\n{rendered}"))
}

/// Build the user prompt asking for `count` words of `category`.
pub fn create_prompt(
    category: &str,
    language: Language,
    count: usize,
    difficulty: Difficulty,
) -> String {
    let profile = profile(language);
    let key = category.to_lowercase();
    let context = category_context(&key).unwrap_or(GENERIC_CATEGORY_CONTEXT);
    let example = example_block(profile, &key).unwrap_or_default();

    format!(
        r#"Generate {count} words for the category "{category}" in {language_name}.

CATEGORY CONTEXT: {context}

DIFFICULTY LEVEL: {difficulty}

CULTURAL CONSIDERATION: {cultural_note}

WORD SELECTION CRITERIA:
- Words must be nouns (things, not actions or descriptions)
- Avoid abbreviations, acronyms, or technical jargon
- Ensure words are spell-able and pronounceable
- Mix different subcategories within the main category
- Include a variety of word lengths and complexities
- Ensure words are culturally relevant to the specified language
- Avoid overly obscure or niche terms

HINT CRAFTING RULES:
1. Each hint should be 1 word maximum
2. Hints should be indirect associations, not direct descriptors
3. Use broad categories, feelings, or abstract connections
4. Avoid physical descriptions (color, size, shape)
5. Avoid location-specific or functional hints
6. No synonyms, rhymes, or wordplay
7. Think of distant but logical connections

HINT STRATEGY:
- Use emotional or conceptual associations rather than literal descriptions
- Reference broader categories or themes
- Use contextual clues from completely different domains
- Aim for "aha!" moments rather than obvious connections
- Each hint should feel like a puzzle piece, not a direct clue
- Include playful, unexpected, or mildly humorous associations
- Use ironic or contrasting concepts that create surprise

QUALITY ASSURANCE:
- Each word must have exactly 3 hints
- Hints must be helpful for guessing but not too obvious
- Test mentally: Could someone reasonably guess the word from these hints?
- Ensure variety in word length and complexity within the set

{example}

Generate exactly {count} words following this structure. Respond only with valid JSON in this exact format:

{{
  "wordsWithHints": [
    {{
      "word": "example",
      "hints": ["hint one", "hint two", "hint three"]
    }}
  ]
}}"#,
        language_name = profile.name,
        difficulty = difficulty_modifier(difficulty),
        cultural_note = profile.cultural_note,
    )
}

fn non_blank(value: &Value) -> bool {
    value.as_str().is_some_and(|s| !s.trim().is_empty())
}

/// True iff `response` carries exactly `expected_count` entries, each with a
/// non-blank word and exactly three non-blank hints.
pub fn validate_response(response: &Value, expected_count: usize) -> bool {
    let Some(entries) = response.get("wordsWithHints").and_then(Value::as_array) else {
        return false;
    };
    if entries.len() != expected_count {
        return false;
    }
    entries.iter().all(|entry| {
        let word_ok = entry.get("word").is_some_and(non_blank);
        let hints_ok = entry
            .get("hints")
            .and_then(Value::as_array)
            .is_some_and(|hints| hints.len() == 3 && hints.iter().all(non_blank));
        word_ok && hints_ok
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(word: &str, hints: &[&str]) -> Value {
        json!({ "word": word, "hints": hints })
    }

    #[test]
    fn prompt_embeds_difficulty_category_and_language() {
        let prompt = create_prompt("Animals", Language::De, 15, Difficulty::Hard);
        assert!(prompt.starts_with("Generate 15 words for the category \"Animals\" in German."));
        assert!(prompt.contains("Include domestic, wild, and exotic animals."));
        assert!(prompt.contains("less common but still recognizable"));
        assert!(prompt.contains("Fokussiere auf universell"));
        assert!(prompt.contains("\"Elefant\""));
    }

    #[test]
    fn unknown_category_falls_back_to_generic_context() {
        let prompt = create_prompt("board games", Language::En, 5, Difficulty::Easy);
        assert!(prompt.contains("CATEGORY CONTEXT: Generate appropriate words for this category."));
        assert!(!prompt.contains("EXAMPLE FORMAT"));
        assert_eq!(prompt, create_prompt("board games", Language::En, 5, Difficulty::Easy));
    }

    #[test]
    fn validate_response_accepts_well_formed_batch() {
        let response = json!({
            "wordsWithHints": [entry("cat", &["purr", "whiskers", "night"]), entry("dog", &["bark", "leash", "loyal"])]
        });
        assert!(validate_response(&response, 2));
        assert!(!validate_response(&response, 3));
    }

    #[test]
    fn validate_response_rejects_deviations() {
        let two_hints = json!({ "wordsWithHints": [entry("cat", &["purr", "night"])] });
        let empty_word = json!({ "wordsWithHints": [entry("  ", &["a", "b", "c"])] });
        let blank_hint = json!({ "wordsWithHints": [entry("cat", &["a", "", "c"])] });
        let numeric = json!({ "wordsWithHints": [{ "word": 7, "hints": ["a", "b", "c"] }] });
        let missing = json!({ "words": [] });
        for response in [two_hints, empty_word, blank_hint, numeric, missing] {
            assert!(!validate_response(&response, 1), "{response}");
        }
    }
}
