//! Merging text-generation suggestions into existing skill lists.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use thiserror::Error;

/// Maximum number of new entries taken from one suggested category.
pub const DEFAULT_SUGGESTION_CAP: usize = 5;

#[derive(Debug, Error)]
pub enum SuggestionError {
    /// The reply is valid JSON but lacks a field the caller relies on.
    #[error("Generation reply is missing `{0}`")]
    MissingField(&'static str),

    #[error("Generation reply is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Appends up to `cap` incoming entries that are not already present.
///
/// Existing entries keep their order; duplicates within `incoming` are
/// taken once.
pub fn merge_unique(existing: &[String], incoming: &[String], cap: usize) -> Vec<String> {
    let mut seen: HashSet<&str> = existing.iter().map(String::as_str).collect();
    let mut merged = existing.to_vec();

    let fresh = incoming
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .filter(|s| seen.insert(*s))
        .take(cap);
    merged.extend(fresh.map(str::to_string));
    merged
}

/// Skill lists of a résumé, one per category.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Skills {
    pub technical: Vec<String>,
    pub soft: Vec<String>,
    pub languages: Vec<String>,
    pub tools: Vec<String>,
}

/// Suggested additions per category. Every category must be present.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SkillSuggestions {
    pub technical: Vec<String>,
    pub soft: Vec<String>,
    pub languages: Vec<String>,
    pub tools: Vec<String>,
}

impl SkillSuggestions {
    pub fn from_json(text: &str) -> Result<Self, SuggestionError> {
        Ok(serde_json::from_str(text)?)
    }
}

impl Skills {
    /// Merges suggestions category by category, `cap` new entries each.
    pub fn merge_suggestions(&self, suggestions: &SkillSuggestions, cap: usize) -> Skills {
        Skills {
            technical: merge_unique(&self.technical, &suggestions.technical, cap),
            soft: merge_unique(&self.soft, &suggestions.soft, cap),
            languages: merge_unique(&self.languages, &suggestions.languages, cap),
            tools: merge_unique(&self.tools, &suggestions.tools, cap),
        }
    }
}

/// Extracts generated text from a reply body.
///
/// Accepts either `{"text": "..."}` or a chat-completions body with
/// `choices[0].message.content`. Anything else is an error, never an empty
/// success.
pub fn extract_generated_text(reply: &str) -> Result<String, SuggestionError> {
    let value: Value = serde_json::from_str(reply)?;

    if let Some(text) = value.get("text") {
        return text
            .as_str()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .ok_or(SuggestionError::MissingField("text"));
    }

    value
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("message"))
        .and_then(|m| m.get("content"))
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(SuggestionError::MissingField("choices[0].message.content"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_merge_skips_existing_and_caps() {
        let existing = strings(&["Rust", "Python"]);
        let incoming = strings(&["Python", "Go", "SQL", "Go", "C", "Java", "Kotlin", "Zig"]);

        let merged = merge_unique(&existing, &incoming, 5);
        assert_eq!(merged, strings(&["Rust", "Python", "Go", "SQL", "C", "Java", "Kotlin"]));
    }

    #[test]
    fn test_merge_with_zero_cap_keeps_existing() {
        let existing = strings(&["Git"]);
        assert_eq!(merge_unique(&existing, &strings(&["Docker"]), 0), existing);
    }

    #[test]
    fn test_merge_ignores_blank_entries() {
        let merged = merge_unique(&[], &strings(&["  ", "Teamwork ", "Teamwork"]), 5);
        assert_eq!(merged, strings(&["Teamwork"]));
    }

    #[test]
    fn test_merge_suggestions_per_category() {
        let skills = Skills {
            technical: strings(&["Rust"]),
            ..Default::default()
        };
        let suggestions = SkillSuggestions::from_json(
            r#"{"technical":["Rust","TypeScript"],"soft":["Communication"],"languages":["English"],"tools":["Git"]}"#,
        )
        .unwrap();

        let merged = skills.merge_suggestions(&suggestions, DEFAULT_SUGGESTION_CAP);
        assert_eq!(merged.technical, strings(&["Rust", "TypeScript"]));
        assert_eq!(merged.soft, strings(&["Communication"]));
        assert_eq!(merged.tools, strings(&["Git"]));
    }

    #[test]
    fn test_suggestions_missing_category_is_error() {
        let result = SkillSuggestions::from_json(r#"{"technical":["Rust"]}"#);
        assert!(matches!(result, Err(SuggestionError::Json(_))));
    }

    #[test]
    fn test_extract_text_field() {
        assert_eq!(extract_generated_text(r#"{"text":"Hello"}"#).unwrap(), "Hello");
    }

    #[test]
    fn test_extract_chat_completion() {
        let body = r#"{"choices":[{"message":{"role":"assistant","content":"Draft"}}]}"#;
        assert_eq!(extract_generated_text(body).unwrap(), "Draft");
    }

    #[test]
    fn test_extract_missing_content_is_error() {
        let result = extract_generated_text(r#"{"error":{"message":"rate limited"}}"#);
        assert!(matches!(result, Err(SuggestionError::MissingField(_))));

        let result = extract_generated_text(r#"{"choices":[]}"#);
        assert!(matches!(result, Err(SuggestionError::MissingField(_))));
    }

    #[test]
    fn test_extract_empty_text_is_error() {
        assert!(matches!(
            extract_generated_text(r#"{"text":""}"#),
            Err(SuggestionError::MissingField("text"))
        ));
        assert!(matches!(
            extract_generated_text(r#"{"choices":[{"message":{"content":""}}]}"#),
            Err(SuggestionError::MissingField(_))
        ));
    }
}
