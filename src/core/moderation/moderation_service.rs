// Moderation service - drives the PENDING -> APPROVED/REJECTED transition.
//
// The actual content screening happens behind the ModerationProvider port
// (keyword list or a remote classifier). This service owns the audit trail:
// every invocation appends exactly one moderation log entry.
//
// NO HTTP or storage specifics here - just the lifecycle rules.

use crate::core::confession::{Confession, ConfessionError, ConfessionStatus, ConfessionStore};
use async_trait::async_trait;

/// Moderator label recorded for automated decisions.
pub const AUTOMATED_MODERATOR: &str = "LLM";

// ============================================================================
// DECISION MODEL
// ============================================================================

/// Outcome of a content review.
///
/// `Inconclusive` means the provider could not produce a verdict (transport
/// failure, malformed reply). It maps back to PENDING so a broken classifier
/// never waves content through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModerationDecision {
    Approved,
    Rejected,
    Inconclusive,
}

impl ModerationDecision {
    /// The confession status this decision transitions to.
    pub fn status(&self) -> ConfessionStatus {
        match self {
            ModerationDecision::Approved => ConfessionStatus::Approved,
            ModerationDecision::Rejected => ConfessionStatus::Rejected,
            ModerationDecision::Inconclusive => ConfessionStatus::Pending,
        }
    }
}

// ============================================================================
// PROVIDER TRAIT (PORT)
// ============================================================================

/// Trait for content screening backends.
#[async_trait]
pub trait ModerationProvider: Send + Sync {
    /// Review a confession. Providers fold their own failures into
    /// `Inconclusive` instead of erroring, so review itself cannot fail.
    async fn review(&self, confession: &Confession) -> ModerationDecision;

    /// Reason recorded for the most recent rejection of this confession,
    /// if the provider kept one.
    async fn rejection_reason(&self, confession: &Confession) -> Option<String>;
}

// Blanket implementation for Box<dyn ModerationProvider>
// This allows the composition root to pick the keyword screen or the
// remote classifier at runtime without the service caring which.
#[async_trait]
impl ModerationProvider for Box<dyn ModerationProvider> {
    async fn review(&self, confession: &Confession) -> ModerationDecision {
        (**self).review(confession).await
    }

    async fn rejection_reason(&self, confession: &Confession) -> Option<String> {
        (**self).rejection_reason(confession).await
    }
}

// ============================================================================
// CORE SERVICE
// ============================================================================

/// Moderation use case over a store and a provider.
pub struct ModerationService<S: ConfessionStore, P: ModerationProvider> {
    store: S,
    provider: P,
}

impl<S: ConfessionStore, P: ModerationProvider> ModerationService<S, P> {
    pub fn new(store: S, provider: P) -> Self {
        Self { store, provider }
    }

    /// Run one moderation pass over a confession.
    ///
    /// Returns `Ok(true)` only when the decision was APPROVED. An unknown
    /// id returns `Ok(false)` without touching storage. Repeated calls on
    /// the same confession each append a fresh audit entry.
    pub async fn moderate(&self, confession_id: i64) -> Result<bool, ConfessionError> {
        let mut confession = match self.store.get_by_id(confession_id).await? {
            Some(confession) => confession,
            None => return Ok(false),
        };

        let decision = self.provider.review(&confession).await;

        let reason = if decision == ModerationDecision::Rejected {
            self.provider.rejection_reason(&confession).await
        } else {
            None
        };

        confession.record_moderation(decision.status(), AUTOMATED_MODERATOR, reason);
        self.store.save(confession).await?;

        Ok(decision == ModerationDecision::Approved)
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use dashmap::DashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// In-memory store that counts saves so tests can assert on
    /// persistence side effects.
    struct MockStore {
        confessions: DashMap<i64, Confession>,
        saves: AtomicUsize,
    }

    impl MockStore {
        fn new() -> Self {
            Self {
                confessions: DashMap::new(),
                saves: AtomicUsize::new(0),
            }
        }

        fn with_confession(id: i64, content: &str) -> Self {
            let store = Self::new();
            let mut confession = Confession::new(content.to_string());
            confession.id = Some(id);
            store.confessions.insert(id, confession);
            store
        }

        fn save_count(&self) -> usize {
            self.saves.load(Ordering::SeqCst)
        }

        fn stored(&self, id: i64) -> Confession {
            self.confessions.get(&id).map(|c| c.clone()).unwrap()
        }
    }

    #[async_trait]
    impl ConfessionStore for MockStore {
        async fn save(&self, confession: Confession) -> Result<Confession, ConfessionError> {
            self.saves.fetch_add(1, Ordering::SeqCst);
            let id = confession.id.unwrap_or(0);
            self.confessions.insert(id, confession.clone());
            Ok(confession)
        }

        async fn get_by_id(&self, id: i64) -> Result<Option<Confession>, ConfessionError> {
            Ok(self.confessions.get(&id).map(|c| c.clone()))
        }

        async fn list_by_status(
            &self,
            _status: Option<ConfessionStatus>,
        ) -> Result<Vec<Confession>, ConfessionError> {
            Ok(Vec::new())
        }

        async fn update_status(
            &self,
            _id: i64,
            _status: ConfessionStatus,
        ) -> Result<bool, ConfessionError> {
            Ok(false)
        }
    }

    struct FixedProvider {
        decision: ModerationDecision,
        reason: Option<String>,
    }

    #[async_trait]
    impl ModerationProvider for FixedProvider {
        async fn review(&self, _confession: &Confession) -> ModerationDecision {
            self.decision
        }

        async fn rejection_reason(&self, _confession: &Confession) -> Option<String> {
            self.reason.clone()
        }
    }

    fn approving() -> FixedProvider {
        FixedProvider {
            decision: ModerationDecision::Approved,
            reason: None,
        }
    }

    fn rejecting(reason: &str) -> FixedProvider {
        FixedProvider {
            decision: ModerationDecision::Rejected,
            reason: Some(reason.to_string()),
        }
    }

    #[tokio::test]
    async fn test_clean_content_is_approved() {
        let store = MockStore::with_confession(1, "I secretly enjoy mondays");
        let service = ModerationService::new(store, approving());

        let approved = service.moderate(1).await.unwrap();
        assert!(approved);

        let stored = service.store.stored(1);
        assert_eq!(stored.status, ConfessionStatus::Approved);
        assert_eq!(stored.moderation_logs.len(), 1);
        assert_eq!(stored.moderation_logs[0].moderator, "LLM");
        assert_eq!(stored.moderation_logs[0].decision, ConfessionStatus::Approved);
        assert!(stored.moderation_logs[0].reason.is_none());
    }

    #[tokio::test]
    async fn test_rejection_records_reason() {
        let store = MockStore::with_confession(2, "this is bad content");
        let service = ModerationService::new(
            store,
            rejecting("Content contains forbidden word: 'bad'"),
        );

        let approved = service.moderate(2).await.unwrap();
        assert!(!approved);

        let stored = service.store.stored(2);
        assert_eq!(stored.status, ConfessionStatus::Rejected);
        assert_eq!(stored.moderation_logs.len(), 1);
        let reason = stored.moderation_logs[0].reason.as_deref().unwrap();
        assert!(reason.contains("bad"));
    }

    #[tokio::test]
    async fn test_unknown_id_returns_false_without_saving() {
        let store = MockStore::new();
        let service = ModerationService::new(store, approving());

        let approved = service.moderate(404).await.unwrap();

        assert!(!approved);
        assert_eq!(service.store.save_count(), 0);
    }

    #[tokio::test]
    async fn test_inconclusive_keeps_confession_pending() {
        let store = MockStore::with_confession(3, "anything");
        let provider = FixedProvider {
            decision: ModerationDecision::Inconclusive,
            reason: None,
        };
        let service = ModerationService::new(store, provider);

        let approved = service.moderate(3).await.unwrap();
        assert!(!approved);

        // Stays queued for manual review, with the attempt on record
        let stored = service.store.stored(3);
        assert_eq!(stored.status, ConfessionStatus::Pending);
        assert_eq!(stored.moderation_logs.len(), 1);
        assert_eq!(stored.moderation_logs[0].decision, ConfessionStatus::Pending);
    }

    #[tokio::test]
    async fn test_repeated_moderation_appends_entries() {
        let store = MockStore::with_confession(4, "twice moderated");
        let service = ModerationService::new(store, approving());

        service.moderate(4).await.unwrap();
        service.moderate(4).await.unwrap();

        let stored = service.store.stored(4);
        assert_eq!(stored.moderation_logs.len(), 2);
        assert_eq!(service.store.save_count(), 2);
    }
}
