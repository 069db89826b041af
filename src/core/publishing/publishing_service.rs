// Publishing service - drives the APPROVED -> PUBLISHED transition.
//
// Delivery goes through the ChannelPublisher port. Ordering matters: the
// confession text is sent before its poll, and nothing is persisted until
// both sends succeeded, so a channel failure leaves the store untouched.

use crate::core::confession::{Confession, ConfessionError, ConfessionStatus, ConfessionStore, Poll};
use async_trait::async_trait;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Channel API error: {0}")]
    Api(String),
}

// ============================================================================
// PUBLISHER TRAIT (PORT)
// ============================================================================

/// Trait for delivering confessions to the outside channel.
///
/// Both send methods return the provider-assigned message id. Failures
/// propagate; there is no silent fallback.
#[async_trait]
pub trait ChannelPublisher: Send + Sync {
    async fn send_confession(&self, confession: &Confession) -> Result<String, ChannelError>;

    async fn send_poll(&self, poll: &Poll) -> Result<String, ChannelError>;

    /// The channel this publisher is configured for, recorded on every
    /// published record.
    fn channel_id(&self) -> &str;
}

// Blanket implementation for Box<dyn ChannelPublisher>
// Lets the composition root swap the real Telegram client for the
// dry-run publisher when no bot token is configured.
#[async_trait]
impl ChannelPublisher for Box<dyn ChannelPublisher> {
    async fn send_confession(&self, confession: &Confession) -> Result<String, ChannelError> {
        (**self).send_confession(confession).await
    }

    async fn send_poll(&self, poll: &Poll) -> Result<String, ChannelError> {
        (**self).send_poll(poll).await
    }

    fn channel_id(&self) -> &str {
        (**self).channel_id()
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Publication use case over a store and a channel publisher.
pub struct PublishingService<S: ConfessionStore, P: ChannelPublisher> {
    store: S,
    publisher: P,
}

impl<S: ConfessionStore, P: ChannelPublisher> PublishingService<S, P> {
    pub fn new(store: S, publisher: P) -> Self {
        Self { store, publisher }
    }

    /// Publish an approved confession to the channel.
    ///
    /// Only APPROVED confessions qualify; anything else is an
    /// `InvalidState` error naming the current status. On success the
    /// aggregate carries exactly one published record and the poll (if
    /// any) knows its channel message id.
    pub async fn publish(&self, confession_id: i64) -> Result<Confession, ConfessionError> {
        let mut confession = self
            .store
            .get_by_id(confession_id)
            .await?
            .ok_or(ConfessionError::NotFound(confession_id))?;

        if confession.status != ConfessionStatus::Approved {
            return Err(ConfessionError::InvalidState(confession.status));
        }

        let message_id = self
            .publisher
            .send_confession(&confession)
            .await
            .map_err(|e| ConfessionError::Channel(e.to_string()))?;

        // The poll always follows the confession it belongs to
        if let Some(poll) = confession.poll.as_mut() {
            let poll_message_id = self
                .publisher
                .send_poll(poll)
                .await
                .map_err(|e| ConfessionError::Channel(e.to_string()))?;
            poll.poll_message_id = Some(poll_message_id);
        }

        confession.mark_published(message_id, self.publisher.channel_id().to_string());
        self.store.save(confession).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
