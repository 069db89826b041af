// Telegram Bot API client for channel publication.
//
// Confessions go out as an HTML-mode sendMessage, polls as a sendPoll
// to the same channel. Telegram answers every call with an ok/result
// envelope; a false `ok` carries a description which becomes the error.

use crate::core::confession::{Confession, Poll};
use crate::core::publishing::{ChannelError, ChannelPublisher};
use async_trait::async_trait;
use serde::Deserialize;

pub const TELEGRAM_API_BASE: &str = "https://api.telegram.org";

pub struct TelegramChannelClient {
    client: reqwest::Client,
    token: String,
    channel_id: String,
    base_url: String,
}

impl TelegramChannelClient {
    pub fn new(token: String, channel_id: String) -> Self {
        Self::with_base_url(token, channel_id, TELEGRAM_API_BASE.to_string())
    }

    pub fn with_base_url(token: String, channel_id: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            token,
            channel_id,
            base_url,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base_url, self.token, method)
    }

    async fn call(&self, method: &str, payload: serde_json::Value) -> Result<String, ChannelError> {
        let response = self
            .client
            .post(self.method_url(method))
            .json(&payload)
            .send()
            .await
            .map_err(|e| ChannelError::Http(e.to_string()))?;

        let status = response.status();
        let body: ApiTelegramResponse = response
            .json()
            .await
            .map_err(|e| ChannelError::Http(format!("status {}: {}", status, e)))?;

        if !body.ok {
            let description = body
                .description
                .unwrap_or_else(|| format!("request failed with status {}", status));
            return Err(ChannelError::Api(description));
        }

        let message = body
            .result
            .ok_or_else(|| ChannelError::Api("response carried no message".to_string()))?;
        Ok(message.message_id.to_string())
    }
}

/// Channel text for a confession: id header, body, then its tags as
/// hashtags.
pub fn render_message(confession: &Confession) -> String {
    let mut message = match confession.id {
        Some(id) => format!("#{}\n\n{}", id, confession.content),
        None => confession.content.clone(),
    };
    if !confession.tags.is_empty() {
        let tags: Vec<String> = confession
            .tags
            .iter()
            .map(|tag| format!("#{}", tag.name))
            .collect();
        message.push_str("\n\n");
        message.push_str(&tags.join(" "));
    }
    message
}

#[async_trait]
impl ChannelPublisher for TelegramChannelClient {
    async fn send_confession(&self, confession: &Confession) -> Result<String, ChannelError> {
        let payload = serde_json::json!({
            "chat_id": self.channel_id,
            "text": render_message(confession),
            "parse_mode": "HTML",
        });

        let message_id = self.call("sendMessage", payload).await?;
        tracing::info!(
            "Confession {:?} delivered to {} as message {}",
            confession.id,
            self.channel_id,
            message_id
        );
        Ok(message_id)
    }

    async fn send_poll(&self, poll: &Poll) -> Result<String, ChannelError> {
        let options: Vec<&str> = poll.options.iter().map(|option| option.text.as_str()).collect();

        let mut payload = serde_json::json!({
            "chat_id": self.channel_id,
            "question": poll.question,
            "options": options,
            "is_anonymous": true,
            "allows_multiple_answers": poll.allows_multiple_answers,
            "type": poll.kind.as_str(),
        });
        // Optional fields are omitted rather than sent as null
        if let Some(map) = payload.as_object_mut() {
            if let Some(correct_option_id) = poll.correct_option_id {
                map.insert("correct_option_id".to_string(), correct_option_id.into());
            }
            if let Some(explanation) = &poll.explanation {
                map.insert("explanation".to_string(), explanation.as_str().into());
            }
            if let Some(open_period) = poll.open_period_secs {
                map.insert("open_period".to_string(), open_period.into());
            }
        }

        self.call("sendPoll", payload).await
    }

    fn channel_id(&self) -> &str {
        &self.channel_id
    }
}

// ============================================================================
// API RESPONSE TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
struct ApiTelegramResponse {
    ok: bool,
    description: Option<String>,
    result: Option<ApiTelegramMessage>,
}

#[derive(Debug, Deserialize)]
struct ApiTelegramMessage {
    message_id: i64,
}
