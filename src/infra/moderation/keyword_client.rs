// Keyword-list moderation.
//
// The fallback provider when no moderation API key is configured. A
// confession is rejected when its content contains any word from the
// list, case-insensitively. Deterministic, so rejection reasons are
// recomputed instead of cached.

use crate::core::confession::Confession;
use crate::core::moderation::{ModerationDecision, ModerationProvider};
use async_trait::async_trait;

const DEFAULT_FORBIDDEN_WORDS: &[&str] = &["bad", "offensive", "inappropriate", "hate"];

pub struct KeywordModerationClient {
    forbidden_words: Vec<String>,
}

impl KeywordModerationClient {
    pub fn new() -> Self {
        Self::with_words(
            DEFAULT_FORBIDDEN_WORDS
                .iter()
                .map(|word| word.to_string())
                .collect(),
        )
    }

    pub fn with_words(words: Vec<String>) -> Self {
        Self {
            forbidden_words: words
                .into_iter()
                .map(|word| word.to_lowercase())
                .collect(),
        }
    }

    fn matched_word(&self, content: &str) -> Option<&str> {
        let lowered = content.to_lowercase();
        self.forbidden_words
            .iter()
            .find(|word| lowered.contains(word.as_str()))
            .map(|word| word.as_str())
    }
}

impl Default for KeywordModerationClient {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ModerationProvider for KeywordModerationClient {
    async fn review(&self, confession: &Confession) -> ModerationDecision {
        match self.matched_word(&confession.content) {
            Some(word) => {
                tracing::info!(
                    "Confession {:?} rejected for forbidden word '{}'",
                    confession.id,
                    word
                );
                ModerationDecision::Rejected
            }
            None => ModerationDecision::Approved,
        }
    }

    async fn rejection_reason(&self, confession: &Confession) -> Option<String> {
        self.matched_word(&confession.content)
            .map(|word| format!("Content contains forbidden word: '{}'", word))
    }
}
