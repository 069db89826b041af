// Telegram channel adapters.
// - `telegram_client.rs` talks to the Bot HTTP API.
// - `dry_run.rs` logs instead of sending.

pub mod dry_run;
pub mod telegram_client;

pub use dry_run::DryRunPublisher;
pub use telegram_client::TelegramChannelClient;
