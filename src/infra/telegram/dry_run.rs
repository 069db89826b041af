// Publisher used when no bot token is configured.
//
// Logs what would have been sent and hands back fabricated message ids,
// so the full publish flow can run against an empty channel. The choice
// to run dry is made explicitly at startup, never silently mid-request.

use crate::core::confession::{Confession, Poll};
use crate::core::publishing::{ChannelError, ChannelPublisher};
use crate::infra::telegram::telegram_client::render_message;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};

pub struct DryRunPublisher {
    channel_id: String,
    counter: AtomicU64,
}

impl DryRunPublisher {
    pub fn new(channel_id: String) -> Self {
        Self {
            channel_id,
            counter: AtomicU64::new(1),
        }
    }

    fn next_message_id(&self) -> String {
        format!("dry-run-{}", self.counter.fetch_add(1, Ordering::SeqCst))
    }
}

#[async_trait]
impl ChannelPublisher for DryRunPublisher {
    async fn send_confession(&self, confession: &Confession) -> Result<String, ChannelError> {
        let message_id = self.next_message_id();
        tracing::info!(
            "[dry-run] message {} to {}:\n{}",
            message_id,
            self.channel_id,
            render_message(confession)
        );
        Ok(message_id)
    }

    async fn send_poll(&self, poll: &Poll) -> Result<String, ChannelError> {
        let message_id = self.next_message_id();
        tracing::info!(
            "[dry-run] poll {} to {}: {:?}",
            message_id,
            self.channel_id,
            poll.question
        );
        Ok(message_id)
    }

    fn channel_id(&self) -> &str {
        &self.channel_id
    }
}
