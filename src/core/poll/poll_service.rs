// Poll service - vote casting and result lookup.
//
// Votes are cumulative: the same caller voting twice counts twice. The
// store does the actual increment atomically so concurrent votes never
// lose updates.

use crate::core::confession::{ConfessionError, Poll};
use async_trait::async_trait;
use std::sync::Arc;

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Trait for poll lookup and vote counting.
#[async_trait]
pub trait PollStore: Send + Sync {
    async fn get_poll(&self, poll_id: i64) -> Result<Option<Poll>, ConfessionError>;

    /// Increment one option's vote count by exactly one, in place.
    async fn add_vote(&self, poll_id: i64, option_id: i64) -> Result<(), ConfessionError>;
}

#[async_trait]
impl<S: PollStore + ?Sized> PollStore for Arc<S> {
    async fn get_poll(&self, poll_id: i64) -> Result<Option<Poll>, ConfessionError> {
        (**self).get_poll(poll_id).await
    }

    async fn add_vote(&self, poll_id: i64, option_id: i64) -> Result<(), ConfessionError> {
        (**self).add_vote(poll_id, option_id).await
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

pub struct PollService<S: PollStore> {
    store: S,
}

impl<S: PollStore> PollService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Cast one vote. The option must belong to the poll it is cast on;
    /// a foreign option id changes nothing and reports both ids back.
    pub async fn vote(&self, poll_id: i64, option_id: i64) -> Result<Poll, ConfessionError> {
        let poll = self
            .store
            .get_poll(poll_id)
            .await?
            .ok_or(ConfessionError::PollNotFound(poll_id))?;

        if !poll.has_option(option_id) {
            return Err(ConfessionError::InvalidOption { poll_id, option_id });
        }

        self.store.add_vote(poll_id, option_id).await?;

        self.store
            .get_poll(poll_id)
            .await?
            .ok_or(ConfessionError::PollNotFound(poll_id))
    }

    /// Current tallies, or None for an unknown poll.
    pub async fn results(&self, poll_id: i64) -> Result<Option<Poll>, ConfessionError> {
        self.store.get_poll(poll_id).await
    }
}

// ============================================================================
// TESTS
// ============================================================================
