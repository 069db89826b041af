// Confession domain models - the aggregate and its child entities.
//
// These are pure domain types with no HTTP, SQL or Telegram dependencies.
// The infra layer persists them; the api layer converts them to wire shapes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a confession.
///
/// PENDING -> APPROVED or REJECTED (moderation), APPROVED -> PUBLISHED.
/// REJECTED and PUBLISHED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfessionStatus {
    Pending,
    Approved,
    Rejected,
    Published,
}

impl ConfessionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfessionStatus::Pending => "PENDING",
            ConfessionStatus::Approved => "APPROVED",
            ConfessionStatus::Rejected => "REJECTED",
            ConfessionStatus::Published => "PUBLISHED",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(ConfessionStatus::Pending),
            "APPROVED" => Some(ConfessionStatus::Approved),
            "REJECTED" => Some(ConfessionStatus::Rejected),
            "PUBLISHED" => Some(ConfessionStatus::Published),
            _ => None,
        }
    }
}

impl std::fmt::Display for ConfessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Kind of media attached to a confession.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttachmentKind {
    Image,
    Video,
    Audio,
    Music,
    Document,
    Other,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttachmentKind::Image => "IMAGE",
            AttachmentKind::Video => "VIDEO",
            AttachmentKind::Audio => "AUDIO",
            AttachmentKind::Music => "MUSIC",
            AttachmentKind::Document => "DOCUMENT",
            AttachmentKind::Other => "OTHER",
        }
    }

    /// Unknown values fall back to `Other` so old rows never fail to load.
    pub fn parse(value: &str) -> Self {
        match value {
            "IMAGE" => AttachmentKind::Image,
            "VIDEO" => AttachmentKind::Video,
            "AUDIO" => AttachmentKind::Audio,
            "MUSIC" => AttachmentKind::Music,
            "DOCUMENT" => AttachmentKind::Document,
            _ => AttachmentKind::Other,
        }
    }
}

/// Poll flavor, mirroring the channel provider's two poll types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollKind {
    #[default]
    Regular,
    Quiz,
}

impl PollKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PollKind::Regular => "regular",
            PollKind::Quiz => "quiz",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "quiz" => PollKind::Quiz,
            _ => PollKind::Regular,
        }
    }
}

/// Media attached to a confession. Owned by the confession.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: Option<i64>,
    pub url: String,
    pub kind: AttachmentKind,
    pub uploaded_at: DateTime<Utc>,
    pub caption: Option<String>,
}

impl Attachment {
    pub fn new(url: String, kind: AttachmentKind, caption: Option<String>) -> Self {
        Self {
            id: None,
            url,
            kind,
            uploaded_at: Utc::now(),
            caption,
        }
    }
}

/// Category tag. Shared across confessions, unique by normalized name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    pub id: Option<i64>,
    pub name: String,
}

impl Tag {
    /// Names are trimmed and lowercased so `Life` and `life` are one tag.
    pub fn new(name: &str) -> Self {
        Self {
            id: None,
            name: name.trim().to_lowercase(),
        }
    }
}

/// One answer option of a poll. `vote_count` only ever grows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PollOption {
    pub id: Option<i64>,
    pub text: String,
    pub vote_count: u32,
}

impl PollOption {
    pub fn new(text: String) -> Self {
        Self {
            id: None,
            text,
            vote_count: 0,
        }
    }
}

/// Poll attached to a confession (at most one per confession).
///
/// `correct_option_id` is the 0-based option index the channel provider
/// expects for quiz polls, not a row id. `poll_message_id` is set only
/// after the poll has been delivered to the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Poll {
    pub id: Option<i64>,
    pub question: String,
    pub options: Vec<PollOption>,
    pub allows_multiple_answers: bool,
    pub kind: PollKind,
    pub correct_option_id: Option<i64>,
    pub explanation: Option<String>,
    pub open_period_secs: Option<u32>,
    pub poll_message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Poll {
    pub fn has_option(&self, option_id: i64) -> bool {
        self.options.iter().any(|option| option.id == Some(option_id))
    }

    pub fn total_votes(&self) -> u32 {
        self.options.iter().map(|option| option.vote_count).sum()
    }
}

/// Audit entry for one moderation decision. Entries are append-only:
/// once persisted they are never edited or removed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationLog {
    pub id: Option<i64>,
    pub confession_id: Option<i64>,
    pub decision: ConfessionStatus,
    pub moderator: String,
    pub reason: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// Record of the one publication of a confession to the channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedRecord {
    pub id: Option<i64>,
    pub confession_id: Option<i64>,
    pub telegram_message_id: String,
    pub channel_id: String,
    pub published_at: DateTime<Utc>,
    pub discussion_thread_id: Option<String>,
}

/// Reader comment on a published confession. `reply_to` points at a
/// parent comment id; nothing rewrites it after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub id: Option<i64>,
    pub confession_id: Option<i64>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub reply_to: Option<i64>,
}

/// The confession aggregate.
///
/// Owns its attachments, poll, moderation logs, published record and
/// comments. Tags are shared references. Two invariants live here:
/// a published record exists exactly when the status is PUBLISHED, and
/// moderation logs only ever gain entries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confession {
    pub id: Option<i64>,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub status: ConfessionStatus,
    pub attachments: Vec<Attachment>,
    pub tags: Vec<Tag>,
    pub poll: Option<Poll>,
    pub moderation_logs: Vec<ModerationLog>,
    pub published_record: Option<PublishedRecord>,
    pub comments: Vec<Comment>,
}

impl Confession {
    /// New submission: always starts PENDING with empty collections.
    pub fn new(content: String) -> Self {
        Self {
            id: None,
            content,
            created_at: Utc::now(),
            status: ConfessionStatus::Pending,
            attachments: Vec::new(),
            tags: Vec::new(),
            poll: None,
            moderation_logs: Vec::new(),
            published_record: None,
            comments: Vec::new(),
        }
    }

    /// Add a tag unless one with the same normalized name is already present.
    pub fn add_tag(&mut self, tag: Tag) {
        if !self.tags.iter().any(|existing| existing.name == tag.name) {
            self.tags.push(tag);
        }
    }

    /// Apply a moderation decision: append exactly one audit entry and
    /// move the status. Existing entries are never touched.
    pub fn record_moderation(
        &mut self,
        decision: ConfessionStatus,
        moderator: &str,
        reason: Option<String>,
    ) {
        self.moderation_logs.push(ModerationLog {
            id: None,
            confession_id: self.id,
            decision,
            moderator: moderator.to_string(),
            reason,
            timestamp: Utc::now(),
        });
        self.status = decision;
    }

    /// Mark the confession published: one fresh record, status PUBLISHED.
    /// Replaces any earlier record so at most one ever exists.
    pub fn mark_published(&mut self, message_id: String, channel_id: String) {
        self.published_record = Some(PublishedRecord {
            id: None,
            confession_id: self.id,
            telegram_message_id: message_id,
            channel_id,
            published_at: Utc::now(),
            discussion_thread_id: None,
        });
        self.status = ConfessionStatus::Published;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_confession_starts_pending() {
        let confession = Confession::new("I ate the last donut".to_string());

        assert_eq!(confession.status, ConfessionStatus::Pending);
        assert!(confession.id.is_none());
        assert!(confession.moderation_logs.is_empty());
        assert!(confession.published_record.is_none());
    }

    #[test]
    fn test_record_moderation_appends_and_transitions() {
        let mut confession = Confession::new("test".to_string());

        confession.record_moderation(ConfessionStatus::Approved, "LLM", None);
        assert_eq!(confession.status, ConfessionStatus::Approved);
        assert_eq!(confession.moderation_logs.len(), 1);

        confession.record_moderation(
            ConfessionStatus::Rejected,
            "LLM",
            Some("changed our mind".to_string()),
        );
        assert_eq!(confession.status, ConfessionStatus::Rejected);
        assert_eq!(confession.moderation_logs.len(), 2);
        // First entry is untouched
        assert_eq!(
            confession.moderation_logs[0].decision,
            ConfessionStatus::Approved
        );
    }

    #[test]
    fn test_mark_published_keeps_single_record() {
        let mut confession = Confession::new("test".to_string());
        confession.id = Some(7);

        confession.mark_published("100".to_string(), "@channel".to_string());
        confession.mark_published("200".to_string(), "@channel".to_string());

        assert_eq!(confession.status, ConfessionStatus::Published);
        let record = confession.published_record.expect("record must exist");
        assert_eq!(record.telegram_message_id, "200");
        assert_eq!(record.confession_id, Some(7));
    }

    #[test]
    fn test_tag_normalization_dedupes() {
        let mut confession = Confession::new("test".to_string());

        confession.add_tag(Tag::new(" Life "));
        confession.add_tag(Tag::new("life"));
        confession.add_tag(Tag::new("LIFE"));

        assert_eq!(confession.tags.len(), 1);
        assert_eq!(confession.tags[0].name, "life");
    }

    #[test]
    fn test_status_round_trip() {
        for status in [
            ConfessionStatus::Pending,
            ConfessionStatus::Approved,
            ConfessionStatus::Rejected,
            ConfessionStatus::Published,
        ] {
            assert_eq!(ConfessionStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ConfessionStatus::parse("SHADOWBANNED"), None);
    }

    #[test]
    fn test_poll_option_lookup() {
        let poll = Poll {
            id: Some(1),
            question: "Best lunch?".to_string(),
            options: vec![
                PollOption {
                    id: Some(10),
                    text: "Pizza".to_string(),
                    vote_count: 2,
                },
                PollOption {
                    id: Some(11),
                    text: "Sushi".to_string(),
                    vote_count: 3,
                },
            ],
            allows_multiple_answers: false,
            kind: PollKind::Regular,
            correct_option_id: None,
            explanation: None,
            open_period_secs: None,
            poll_message_id: None,
            created_at: Utc::now(),
        };

        assert!(poll.has_option(10));
        assert!(!poll.has_option(99));
        assert_eq!(poll.total_votes(), 5);
    }
}
