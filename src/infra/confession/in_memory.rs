// In-memory confession store, used for ephemeral runs.
//
// A pooled SQLite ":memory:" database gives every connection a separate
// empty schema, so ":memory:" runs are served from this DashMap instead.
// Semantics mirror the SQLite store: child ids are stable across saves,
// tag ids are shared by name, and vote counts are owned by add_vote.

use crate::core::confession::{Confession, ConfessionError, ConfessionStatus, ConfessionStore, Poll};
use crate::core::poll::PollStore;
use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};

pub struct InMemoryConfessionStore {
    confessions: DashMap<i64, Confession>,
    tag_ids: DashMap<String, i64>,
    next_id: AtomicI64,
}

impl InMemoryConfessionStore {
    pub fn new() -> Self {
        Self {
            confessions: DashMap::new(),
            tag_ids: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    fn next_id(&self) -> i64 {
        self.next_id.fetch_add(1, Ordering::SeqCst)
    }

    fn assign_ids(&self, confession: &mut Confession) {
        for attachment in &mut confession.attachments {
            if attachment.id.is_none() {
                attachment.id = Some(self.next_id());
            }
        }
        for tag in &mut confession.tags {
            let id = *self
                .tag_ids
                .entry(tag.name.clone())
                .or_insert_with(|| self.next_id());
            tag.id = Some(id);
        }
        if let Some(poll) = confession.poll.as_mut() {
            if poll.id.is_none() {
                poll.id = Some(self.next_id());
            }
            for option in &mut poll.options {
                if option.id.is_none() {
                    option.id = Some(self.next_id());
                }
            }
        }
        for log in &mut confession.moderation_logs {
            if log.id.is_none() {
                log.id = Some(self.next_id());
                log.confession_id = confession.id;
            }
        }
        if let Some(record) = confession.published_record.as_mut() {
            if record.id.is_none() {
                record.id = Some(self.next_id());
            }
            record.confession_id = confession.id;
        }
        for comment in &mut confession.comments {
            if comment.id.is_none() {
                comment.id = Some(self.next_id());
            }
            comment.confession_id = confession.id;
        }
    }

    // Tallies recorded since the caller loaded its copy must not be
    // rolled back by the save.
    fn keep_stored_vote_counts(&self, confession: &mut Confession) {
        let stored = match confession.id.and_then(|id| self.confessions.get(&id)) {
            Some(stored) => stored,
            None => return,
        };
        if let (Some(poll), Some(stored_poll)) =
            (confession.poll.as_mut(), stored.poll.as_ref())
        {
            if poll.id != stored_poll.id {
                return;
            }
            for option in &mut poll.options {
                if option.id.is_none() {
                    continue;
                }
                if let Some(stored_option) = stored_poll
                    .options
                    .iter()
                    .find(|stored_option| stored_option.id == option.id)
                {
                    option.vote_count = stored_option.vote_count;
                }
            }
        }
    }
}

impl Default for InMemoryConfessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConfessionStore for InMemoryConfessionStore {
    async fn save(&self, mut confession: Confession) -> Result<Confession, ConfessionError> {
        let id = match confession.id {
            Some(id) => id,
            None => {
                let id = self.next_id();
                confession.id = Some(id);
                id
            }
        };
        self.keep_stored_vote_counts(&mut confession);
        self.assign_ids(&mut confession);
        self.confessions.insert(id, confession.clone());
        Ok(confession)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Confession>, ConfessionError> {
        Ok(self.confessions.get(&id).map(|entry| entry.clone()))
    }

    async fn list_by_status(
        &self,
        status: Option<ConfessionStatus>,
    ) -> Result<Vec<Confession>, ConfessionError> {
        let mut confessions: Vec<Confession> = self
            .confessions
            .iter()
            .filter(|entry| status.map_or(true, |wanted| entry.status == wanted))
            .map(|entry| entry.clone())
            .collect();
        confessions.sort_by_key(|confession| confession.id);
        Ok(confessions)
    }

    async fn update_status(
        &self,
        id: i64,
        status: ConfessionStatus,
    ) -> Result<bool, ConfessionError> {
        match self.confessions.get_mut(&id) {
            Some(mut entry) => {
                entry.status = status;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl PollStore for InMemoryConfessionStore {
    async fn get_poll(&self, poll_id: i64) -> Result<Option<Poll>, ConfessionError> {
        let poll = self.confessions.iter().find_map(|entry| {
            entry
                .poll
                .as_ref()
                .filter(|poll| poll.id == Some(poll_id))
                .cloned()
        });
        Ok(poll)
    }

    async fn add_vote(&self, poll_id: i64, option_id: i64) -> Result<(), ConfessionError> {
        let owner = self.confessions.iter().find_map(|entry| {
            match entry.poll.as_ref() {
                Some(poll) if poll.id == Some(poll_id) => entry.id,
                _ => None,
            }
        });
        let owner = match owner {
            Some(owner) => owner,
            None => return Err(ConfessionError::InvalidOption { poll_id, option_id }),
        };

        let mut entry = match self.confessions.get_mut(&owner) {
            Some(entry) => entry,
            None => return Err(ConfessionError::InvalidOption { poll_id, option_id }),
        };
        if let Some(poll) = entry.poll.as_mut() {
            if let Some(option) = poll
                .options
                .iter_mut()
                .find(|option| option.id == Some(option_id))
            {
                option.vote_count += 1;
                return Ok(());
            }
        }
        Err(ConfessionError::InvalidOption { poll_id, option_id })
    }
}
