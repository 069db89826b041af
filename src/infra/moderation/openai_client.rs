// OpenAI moderation endpoint client.
//
// One classification call per review. The endpoint reports a flagged
// bit plus per-category booleans; flagged categories become the
// rejection reason. API failures never reject: the confession stays
// pending for a later pass.

use crate::core::confession::Confession;
use crate::core::moderation::{ModerationDecision, ModerationProvider};
use async_trait::async_trait;
use dashmap::DashMap;
use serde::Deserialize;
use std::collections::BTreeMap;

pub const DEFAULT_MODERATION_URL: &str = "https://api.openai.com/v1/moderations";

pub struct OpenAiModerationClient {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
    // Reasons by confession id, filled during review so that
    // rejection_reason does not repeat the API call.
    reasons: DashMap<i64, String>,
}

impl OpenAiModerationClient {
    pub fn new(api_key: String, api_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            api_url,
            reasons: DashMap::new(),
        }
    }

    async fn classify(
        &self,
        content: &str,
    ) -> Result<ApiModerationResult, Box<dyn std::error::Error + Send + Sync>> {
        let payload = serde_json::json!({ "input": content });

        let response = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("Moderation API returned status {}", response.status()).into());
        }

        let body: ApiModerationResponse = response.json().await?;
        body.results
            .into_iter()
            .next()
            .ok_or_else(|| "Moderation API returned no results".into())
    }
}

#[async_trait]
impl ModerationProvider for OpenAiModerationClient {
    async fn review(&self, confession: &Confession) -> ModerationDecision {
        let result = match self.classify(&confession.content).await {
            Ok(result) => result,
            Err(e) => {
                tracing::warn!("Moderation API call failed, leaving confession pending: {}", e);
                return ModerationDecision::Inconclusive;
            }
        };

        if result.flagged {
            if let Some(id) = confession.id {
                self.reasons
                    .insert(id, rejection_message(&flagged_categories(&result)));
            }
            ModerationDecision::Rejected
        } else {
            if let Some(id) = confession.id {
                self.reasons.remove(&id);
            }
            ModerationDecision::Approved
        }
    }

    async fn rejection_reason(&self, confession: &Confession) -> Option<String> {
        confession
            .id
            .and_then(|id| self.reasons.get(&id).map(|reason| reason.clone()))
    }
}

fn flagged_categories(result: &ApiModerationResult) -> Vec<String> {
    result
        .categories
        .iter()
        .filter(|(_, &flagged)| flagged)
        .map(|(name, _)| name.clone())
        .collect()
}

fn rejection_message(categories: &[String]) -> String {
    format!("Content flagged for: {}", categories.join(", "))
}

// ============================================================================
// API RESPONSE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiModerationResponse {
    results: Vec<ApiModerationResult>,
}

// BTreeMap keeps category order stable in rejection reasons.
#[derive(Debug, Deserialize)]
struct ApiModerationResult {
    flagged: bool,
    #[serde(default)]
    categories: BTreeMap<String, bool>,
}
