// This is the entry point of the confession backend.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases, APIs)
// - `api/` = HTTP adapters (routes, request/response shapes)
//
// This file's job is to:
// 1. Load configuration
// 2. Initialize services (dependency injection)
// 3. Build the router
// 4. Serve HTTP

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "api/api_layer.rs"]
mod api;
#[path = "core/core_layer.rs"]
mod core;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::api::server::{build_router, serve, AppState, SharedConfessionStore, SharedPollStore};
use crate::core::moderation::ModerationProvider;
use crate::core::publishing::ChannelPublisher;
use crate::infra::confession::{InMemoryConfessionStore, SqliteConfessionStore};
use crate::infra::moderation::{
    KeywordModerationClient, OpenAiModerationClient, DEFAULT_MODERATION_URL,
};
use crate::infra::telegram::{DryRunPublisher, TelegramChannelClient};
use std::sync::Arc;

const DEFAULT_DATABASE_PATH: &str = "data/confessions.db";
const DEFAULT_CHANNEL_ID: &str = "@falt_conf";

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let host = std::env::var("API_HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port = std::env::var("API_PORT")
        .ok()
        .and_then(|v| v.parse::<u16>().ok())
        .unwrap_or(8000);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    // The SQLite store keeps its database under data/ so the repo root
    // stays tidy; ":memory:" runs entirely in process instead, because a
    // pooled SQLite ":memory:" gives every connection a separate database.
    let database_path =
        std::env::var("DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATABASE_PATH.to_string());

    let (store, poll_store): (SharedConfessionStore, SharedPollStore) =
        if database_path == ":memory:" {
            tracing::warn!("DATABASE_PATH is :memory:, confessions will not survive a restart");
            let shared = Arc::new(InMemoryConfessionStore::new());
            (shared.clone(), shared)
        } else {
            let shared = Arc::new(
                SqliteConfessionStore::new(&database_path)
                    .await
                    .expect("Failed to initialize SQLite store"),
            );
            (shared.clone(), shared)
        };

    // Moderation provider: the OpenAI endpoint when a key is configured,
    // the keyword list otherwise.
    let provider: Box<dyn ModerationProvider> = match std::env::var("MODERATION_API_KEY") {
        Ok(api_key) if !api_key.is_empty() => {
            let api_url = std::env::var("MODERATION_API_URL")
                .unwrap_or_else(|_| DEFAULT_MODERATION_URL.to_string());
            tracing::info!("Using the moderation endpoint at {}", api_url);
            Box::new(OpenAiModerationClient::new(api_key, api_url))
        }
        _ => {
            tracing::warn!("MODERATION_API_KEY not set, falling back to keyword moderation");
            Box::new(KeywordModerationClient::new())
        }
    };

    // Channel publisher: real Telegram when a bot token is configured,
    // an explicit dry-run otherwise.
    let channel_id =
        std::env::var("TELEGRAM_CHANNEL_ID").unwrap_or_else(|_| DEFAULT_CHANNEL_ID.to_string());
    let publisher: Box<dyn ChannelPublisher> = match std::env::var("TELEGRAM_BOT_TOKEN") {
        Ok(token) if !token.is_empty() => {
            tracing::info!("Publishing to Telegram channel {}", channel_id);
            Box::new(TelegramChannelClient::new(token, channel_id))
        }
        _ => {
            tracing::warn!(
                "TELEGRAM_BOT_TOKEN not set, publishing runs dry against {}",
                channel_id
            );
            Box::new(DryRunPublisher::new(channel_id))
        }
    };

    let state = AppState::new(store, poll_store, provider, publisher);
    let router = build_router(state);

    tracing::info!("Confession backend starting on {}:{}", host, port);
    serve(router, &host, port).await.expect("Server error");
}
