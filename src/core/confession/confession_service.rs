// Confession service - submission, retrieval and status administration.
//
// Also home to the storage port and the error type shared by every
// service that drives the confession lifecycle.

use super::confession_models::{
    Attachment, AttachmentKind, Confession, ConfessionStatus, Poll, PollKind, PollOption, Tag,
};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;

// ============================================================================
// ERRORS
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfessionError {
    #[error("Confession with ID {0} not found")]
    NotFound(i64),

    #[error("Poll with ID {0} not found")]
    PollNotFound(i64),

    #[error("Cannot publish confession with status {0}")]
    InvalidState(ConfessionStatus),

    #[error("Poll {poll_id} has no option with ID {option_id}")]
    InvalidOption { poll_id: i64, option_id: i64 },

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Storage error: {0}")]
    Storage(String),
}

// ============================================================================
// STORAGE TRAIT (PORT)
// ============================================================================

/// Trait for persisting confession aggregates.
///
/// `save` is an upsert over the whole aggregate: it assigns ids to entities
/// that have none, writes every child collection consistently in one atomic
/// step, and never deletes or rewrites existing moderation log entries.
#[async_trait]
pub trait ConfessionStore: Send + Sync {
    /// Persist the aggregate and return it with all ids assigned.
    async fn save(&self, confession: Confession) -> Result<Confession, ConfessionError>;

    /// Load a full aggregate by id.
    async fn get_by_id(&self, id: i64) -> Result<Option<Confession>, ConfessionError>;

    /// List aggregates, optionally restricted to one status, oldest first.
    async fn list_by_status(
        &self,
        status: Option<ConfessionStatus>,
    ) -> Result<Vec<Confession>, ConfessionError>;

    /// Flip just the status column. Returns false when the id is unknown.
    async fn update_status(
        &self,
        id: i64,
        status: ConfessionStatus,
    ) -> Result<bool, ConfessionError>;
}

// Blanket implementation for Arc<S> so several services can share one
// store handle without each needing its own connection pool.
#[async_trait]
impl<S: ConfessionStore + ?Sized> ConfessionStore for Arc<S> {
    async fn save(&self, confession: Confession) -> Result<Confession, ConfessionError> {
        (**self).save(confession).await
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Confession>, ConfessionError> {
        (**self).get_by_id(id).await
    }

    async fn list_by_status(
        &self,
        status: Option<ConfessionStatus>,
    ) -> Result<Vec<Confession>, ConfessionError> {
        (**self).list_by_status(status).await
    }

    async fn update_status(
        &self,
        id: i64,
        status: ConfessionStatus,
    ) -> Result<bool, ConfessionError> {
        (**self).update_status(id, status).await
    }
}

// ============================================================================
// SUBMISSION TYPES
// ============================================================================

/// Incoming confession before it has an identity or a status.
#[derive(Debug, Clone)]
pub struct NewConfession {
    pub content: String,
    pub attachments: Vec<NewAttachment>,
    pub tags: Vec<String>,
    pub poll: Option<NewPoll>,
}

#[derive(Debug, Clone)]
pub struct NewAttachment {
    pub url: String,
    pub kind: AttachmentKind,
    pub caption: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewPoll {
    pub question: String,
    pub options: Vec<String>,
    pub allows_multiple_answers: bool,
    pub kind: PollKind,
    pub correct_option_id: Option<i64>,
    pub explanation: Option<String>,
    pub open_period_secs: Option<u32>,
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Entry points for everything that is not moderation or publication:
/// creating submissions, reading them back and the administrative
/// status override.
pub struct ConfessionService<S: ConfessionStore> {
    store: S,
}

impl<S: ConfessionStore> ConfessionService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Persist a new submission. The status is always PENDING no matter
    /// what the caller intended; moderation is the only road out.
    pub async fn create(&self, submission: NewConfession) -> Result<Confession, ConfessionError> {
        let mut confession = Confession::new(submission.content);

        for attachment in submission.attachments {
            confession.attachments.push(Attachment::new(
                attachment.url,
                attachment.kind,
                attachment.caption,
            ));
        }

        for name in submission.tags {
            confession.add_tag(Tag::new(&name));
        }

        if let Some(poll) = submission.poll {
            confession.poll = Some(Poll {
                id: None,
                question: poll.question,
                options: poll.options.into_iter().map(PollOption::new).collect(),
                allows_multiple_answers: poll.allows_multiple_answers,
                kind: poll.kind,
                correct_option_id: poll.correct_option_id,
                explanation: poll.explanation,
                open_period_secs: poll.open_period_secs,
                poll_message_id: None,
                created_at: Utc::now(),
            });
        }

        self.store.save(confession).await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Confession>, ConfessionError> {
        self.store.get_by_id(id).await
    }

    pub async fn list(
        &self,
        status: Option<ConfessionStatus>,
    ) -> Result<Vec<Confession>, ConfessionError> {
        self.store.list_by_status(status).await
    }

    /// Administrative status override. Bypasses the lifecycle guards, so
    /// it writes only the status column and appends no audit entry.
    pub async fn update_status(
        &self,
        id: i64,
        status: ConfessionStatus,
    ) -> Result<Option<Confession>, ConfessionError> {
        if !self.store.update_status(id, status).await? {
            return Ok(None);
        }
        self.store.get_by_id(id).await
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicI64, Ordering};

    /// In-memory store for testing
    struct MockConfessionStore {
        confessions: DashMap<i64, Confession>,
        next_id: AtomicI64,
    }

    impl MockConfessionStore {
        fn new() -> Self {
            Self {
                confessions: DashMap::new(),
                next_id: AtomicI64::new(1),
            }
        }

        fn assign_id(&self) -> i64 {
            self.next_id.fetch_add(1, Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ConfessionStore for MockConfessionStore {
        async fn save(&self, mut confession: Confession) -> Result<Confession, ConfessionError> {
            let id = *confession.id.get_or_insert_with(|| self.assign_id());
            for attachment in &mut confession.attachments {
                attachment.id.get_or_insert_with(|| self.assign_id());
            }
            for tag in &mut confession.tags {
                tag.id.get_or_insert_with(|| self.assign_id());
            }
            if let Some(poll) = confession.poll.as_mut() {
                poll.id.get_or_insert_with(|| self.assign_id());
                for option in &mut poll.options {
                    option.id.get_or_insert_with(|| self.assign_id());
                }
            }
            self.confessions.insert(id, confession.clone());
            Ok(confession)
        }

        async fn get_by_id(&self, id: i64) -> Result<Option<Confession>, ConfessionError> {
            Ok(self.confessions.get(&id).map(|c| c.clone()))
        }

        async fn list_by_status(
            &self,
            status: Option<ConfessionStatus>,
        ) -> Result<Vec<Confession>, ConfessionError> {
            let mut all: Vec<Confession> = self
                .confessions
                .iter()
                .map(|entry| entry.value().clone())
                .filter(|c| status.is_none() || status == Some(c.status))
                .collect();
            all.sort_by_key(|c| c.id);
            Ok(all)
        }

        async fn update_status(
            &self,
            id: i64,
            status: ConfessionStatus,
        ) -> Result<bool, ConfessionError> {
            match self.confessions.get_mut(&id) {
                Some(mut confession) => {
                    confession.status = status;
                    Ok(true)
                }
                None => Ok(false),
            }
        }
    }

    fn plain_submission(content: &str) -> NewConfession {
        NewConfession {
            content: content.to_string(),
            attachments: vec![],
            tags: vec![],
            poll: None,
        }
    }

    #[tokio::test]
    async fn test_create_assigns_id_and_forces_pending() {
        let service = ConfessionService::new(MockConfessionStore::new());

        let confession = service
            .create(plain_submission("first confession"))
            .await
            .unwrap();

        assert!(confession.id.is_some());
        assert_eq!(confession.status, ConfessionStatus::Pending);
        assert_eq!(confession.content, "first confession");
    }

    #[tokio::test]
    async fn test_create_builds_children() {
        let service = ConfessionService::new(MockConfessionStore::new());

        let submission = NewConfession {
            content: "with everything".to_string(),
            attachments: vec![NewAttachment {
                url: "https://example.com/cat.png".to_string(),
                kind: AttachmentKind::Image,
                caption: Some("a cat".to_string()),
            }],
            tags: vec!["Life".to_string(), "life".to_string(), "uni".to_string()],
            poll: Some(NewPoll {
                question: "Agree?".to_string(),
                options: vec!["Yes".to_string(), "No".to_string()],
                allows_multiple_answers: false,
                kind: PollKind::Regular,
                correct_option_id: None,
                explanation: None,
                open_period_secs: None,
            }),
        };

        let confession = service.create(submission).await.unwrap();

        assert_eq!(confession.attachments.len(), 1);
        assert_eq!(confession.attachments[0].kind, AttachmentKind::Image);
        // Case-variant tag names collapse to one tag
        assert_eq!(confession.tags.len(), 2);
        let poll = confession.poll.expect("poll must survive create");
        assert_eq!(poll.options.len(), 2);
        assert!(poll.options.iter().all(|o| o.vote_count == 0));
        assert!(poll.poll_message_id.is_none());
    }

    #[tokio::test]
    async fn test_list_filters_by_status() {
        let store = MockConfessionStore::new();
        let service = ConfessionService::new(store);

        let first = service.create(plain_submission("one")).await.unwrap();
        service.create(plain_submission("two")).await.unwrap();

        service
            .update_status(first.id.unwrap(), ConfessionStatus::Approved)
            .await
            .unwrap();

        let approved = service
            .list(Some(ConfessionStatus::Approved))
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].content, "one");

        let all = service.list(None).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn test_update_status_missing_returns_none() {
        let service = ConfessionService::new(MockConfessionStore::new());

        let updated = service
            .update_status(999, ConfessionStatus::Approved)
            .await
            .unwrap();

        assert!(updated.is_none());
    }
}
