// Moderation providers.
// - `keyword_client.rs` is the deterministic wordlist check.
// - `openai_client.rs` calls the remote moderation endpoint.

pub mod keyword_client;
pub mod openai_client;

pub use keyword_client::KeywordModerationClient;
pub use openai_client::{OpenAiModerationClient, DEFAULT_MODERATION_URL};
