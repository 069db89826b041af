// SQLite-backed confession store.
//
// The whole aggregate is written inside one transaction. Children that
// already carry ids are updated in place (so their identities survive a
// resave), new ones are inserted, and rows dropped from the aggregate are
// deleted. Two exceptions to the mirror-the-aggregate rule:
//   - moderation_logs rows are insert-only; existing entries are never
//     rewritten or removed,
//   - poll_options.vote_count is owned by add_vote and is never written
//     by an option UPDATE, so votes arriving mid-moderation survive.

use crate::core::confession::{
    Attachment, AttachmentKind, Comment, Confession, ConfessionError, ConfessionStatus,
    ConfessionStore, ModerationLog, Poll, PollKind, PollOption, PublishedRecord, Tag,
};
use crate::core::poll::PollStore;
use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite, Transaction};
use std::path::Path;

pub struct SqliteConfessionStore {
    pool: Pool<Sqlite>,
}

impl SqliteConfessionStore {
    pub async fn new(database_url: &str) -> anyhow::Result<Self> {
        // Ensure the file exists if it's a file path
        let path_str = database_url.trim_start_matches("sqlite://");
        if !database_url.contains(":memory:") && !Path::new(path_str).exists() {
            if let Some(parent) = Path::new(path_str).parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::File::create(path_str)?;
        }

        let conn_str = if database_url.starts_with("sqlite:") {
            database_url.to_string()
        } else {
            format!("sqlite://{}", database_url)
        };

        let pool = SqlitePoolOptions::new().connect(&conn_str).await?;

        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    async fn migrate(&self) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS confessions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'PENDING'
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS attachments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                confession_id INTEGER NOT NULL REFERENCES confessions(id),
                url TEXT NOT NULL,
                kind TEXT NOT NULL DEFAULT 'OTHER',
                uploaded_at TEXT NOT NULL,
                caption TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS confession_tags (
                confession_id INTEGER NOT NULL REFERENCES confessions(id),
                tag_id INTEGER NOT NULL REFERENCES tags(id),
                PRIMARY KEY (confession_id, tag_id)
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS polls (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                confession_id INTEGER NOT NULL UNIQUE REFERENCES confessions(id),
                question TEXT NOT NULL,
                allows_multiple_answers BOOLEAN NOT NULL DEFAULT 0,
                kind TEXT NOT NULL DEFAULT 'regular',
                correct_option_id INTEGER,
                explanation TEXT,
                open_period_secs INTEGER,
                poll_message_id TEXT,
                created_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS poll_options (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                poll_id INTEGER NOT NULL REFERENCES polls(id),
                text TEXT NOT NULL,
                vote_count INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS moderation_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                confession_id INTEGER NOT NULL REFERENCES confessions(id),
                decision TEXT NOT NULL,
                moderator TEXT NOT NULL,
                reason TEXT,
                timestamp TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS published_records (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                confession_id INTEGER NOT NULL UNIQUE REFERENCES confessions(id),
                telegram_message_id TEXT NOT NULL,
                channel_id TEXT NOT NULL,
                published_at TEXT NOT NULL,
                discussion_thread_id TEXT
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS comments (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                confession_id INTEGER NOT NULL REFERENCES confessions(id),
                content TEXT NOT NULL,
                created_at TEXT NOT NULL,
                reply_to INTEGER
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load_poll_options(&self, poll_id: i64) -> Result<Vec<PollOption>, ConfessionError> {
        let rows = sqlx::query(
            "SELECT id, text, vote_count FROM poll_options WHERE poll_id = ? ORDER BY id",
        )
        .bind(poll_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ConfessionError::Storage(e.to_string()))?;

        Ok(rows.iter().map(row_to_option).collect())
    }

    async fn load_poll_for_confession(
        &self,
        confession_id: i64,
    ) -> Result<Option<Poll>, ConfessionError> {
        let row = sqlx::query(
            "SELECT id, question, allows_multiple_answers, kind, correct_option_id, explanation, \
             open_period_secs, poll_message_id, created_at FROM polls WHERE confession_id = ?",
        )
        .bind(confession_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ConfessionError::Storage(e.to_string()))?;

        match row {
            Some(row) => {
                let mut poll = row_to_poll(&row);
                let poll_id = poll.id.unwrap_or_default();
                poll.options = self.load_poll_options(poll_id).await?;
                Ok(Some(poll))
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ConfessionStore for SqliteConfessionStore {
    async fn save(&self, mut confession: Confession) -> Result<Confession, ConfessionError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ConfessionError::Storage(e.to_string()))?;

        let confession_id = match confession.id {
            Some(id) => {
                let result = sqlx::query(
                    "UPDATE confessions SET content = ?, created_at = ?, status = ? WHERE id = ?",
                )
                .bind(&confession.content)
                .bind(confession.created_at)
                .bind(confession.status.as_str())
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| ConfessionError::Storage(e.to_string()))?;
                if result.rows_affected() == 0 {
                    return Err(ConfessionError::Storage(format!(
                        "cannot save confession {}: no such row",
                        id
                    )));
                }
                id
            }
            None => {
                let result = sqlx::query(
                    "INSERT INTO confessions (content, created_at, status) VALUES (?, ?, ?)",
                )
                .bind(&confession.content)
                .bind(confession.created_at)
                .bind(confession.status.as_str())
                .execute(&mut *tx)
                .await
                .map_err(|e| ConfessionError::Storage(e.to_string()))?;
                result.last_insert_rowid()
            }
        };
        confession.id = Some(confession_id);

        save_attachments(&mut tx, confession_id, &mut confession.attachments).await?;
        save_tags(&mut tx, confession_id, &mut confession.tags).await?;
        save_poll(&mut tx, confession_id, confession.poll.as_mut()).await?;
        save_moderation_logs(&mut tx, confession_id, &mut confession.moderation_logs).await?;
        save_published_record(&mut tx, confession_id, confession.published_record.as_mut()).await?;
        save_comments(&mut tx, confession_id, &mut confession.comments).await?;

        tx.commit()
            .await
            .map_err(|e| ConfessionError::Storage(e.to_string()))?;

        Ok(confession)
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Confession>, ConfessionError> {
        let row = sqlx::query("SELECT id, content, created_at, status FROM confessions WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| ConfessionError::Storage(e.to_string()))?;

        let row = match row {
            Some(row) => row,
            None => return Ok(None),
        };
        let mut confession = row_to_confession(&row)?;

        let attachment_rows = sqlx::query(
            "SELECT id, url, kind, uploaded_at, caption FROM attachments \
             WHERE confession_id = ? ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ConfessionError::Storage(e.to_string()))?;
        confession.attachments = attachment_rows.iter().map(row_to_attachment).collect();

        let tag_rows = sqlx::query(
            "SELECT t.id, t.name FROM tags t \
             JOIN confession_tags ct ON ct.tag_id = t.id \
             WHERE ct.confession_id = ? ORDER BY t.id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ConfessionError::Storage(e.to_string()))?;
        confession.tags = tag_rows
            .iter()
            .map(|row| Tag {
                id: Some(row.get("id")),
                name: row.get("name"),
            })
            .collect();

        confession.poll = self.load_poll_for_confession(id).await?;

        let log_rows = sqlx::query(
            "SELECT id, confession_id, decision, moderator, reason, timestamp \
             FROM moderation_logs WHERE confession_id = ? ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ConfessionError::Storage(e.to_string()))?;
        confession.moderation_logs = log_rows
            .iter()
            .map(row_to_moderation_log)
            .collect::<Result<Vec<_>, _>>()?;

        let record_row = sqlx::query(
            "SELECT id, confession_id, telegram_message_id, channel_id, published_at, \
             discussion_thread_id FROM published_records WHERE confession_id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ConfessionError::Storage(e.to_string()))?;
        confession.published_record = record_row.as_ref().map(row_to_published_record);

        let comment_rows = sqlx::query(
            "SELECT id, confession_id, content, created_at, reply_to FROM comments \
             WHERE confession_id = ? ORDER BY id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ConfessionError::Storage(e.to_string()))?;
        confession.comments = comment_rows.iter().map(row_to_comment).collect();

        Ok(Some(confession))
    }

    async fn list_by_status(
        &self,
        status: Option<ConfessionStatus>,
    ) -> Result<Vec<Confession>, ConfessionError> {
        let rows = match status {
            Some(status) => {
                sqlx::query("SELECT id FROM confessions WHERE status = ? ORDER BY id")
                    .bind(status.as_str())
                    .fetch_all(&self.pool)
                    .await
            }
            None => {
                sqlx::query("SELECT id FROM confessions ORDER BY id")
                    .fetch_all(&self.pool)
                    .await
            }
        }
        .map_err(|e| ConfessionError::Storage(e.to_string()))?;

        let mut confessions = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(confession) = self.get_by_id(row.get("id")).await? {
                confessions.push(confession);
            }
        }
        Ok(confessions)
    }

    async fn update_status(
        &self,
        id: i64,
        status: ConfessionStatus,
    ) -> Result<bool, ConfessionError> {
        let result = sqlx::query("UPDATE confessions SET status = ? WHERE id = ?")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| ConfessionError::Storage(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl PollStore for SqliteConfessionStore {
    async fn get_poll(&self, poll_id: i64) -> Result<Option<Poll>, ConfessionError> {
        let row = sqlx::query(
            "SELECT id, question, allows_multiple_answers, kind, correct_option_id, explanation, \
             open_period_secs, poll_message_id, created_at FROM polls WHERE id = ?",
        )
        .bind(poll_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ConfessionError::Storage(e.to_string()))?;

        match row {
            Some(row) => {
                let mut poll = row_to_poll(&row);
                poll.options = self.load_poll_options(poll_id).await?;
                Ok(Some(poll))
            }
            None => Ok(None),
        }
    }

    async fn add_vote(&self, poll_id: i64, option_id: i64) -> Result<(), ConfessionError> {
        let result = sqlx::query(
            "UPDATE poll_options SET vote_count = vote_count + 1 WHERE id = ? AND poll_id = ?",
        )
        .bind(option_id)
        .bind(poll_id)
        .execute(&self.pool)
        .await
        .map_err(|e| ConfessionError::Storage(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(ConfessionError::InvalidOption { poll_id, option_id });
        }
        Ok(())
    }
}

async fn save_attachments(
    tx: &mut Transaction<'_, Sqlite>,
    confession_id: i64,
    attachments: &mut [Attachment],
) -> Result<(), ConfessionError> {
    let mut kept = Vec::with_capacity(attachments.len());
    for attachment in attachments.iter_mut() {
        match attachment.id {
            Some(id) => {
                sqlx::query(
                    "UPDATE attachments SET url = ?, kind = ?, uploaded_at = ?, caption = ? \
                     WHERE id = ? AND confession_id = ?",
                )
                .bind(&attachment.url)
                .bind(attachment.kind.as_str())
                .bind(attachment.uploaded_at)
                .bind(&attachment.caption)
                .bind(id)
                .bind(confession_id)
                .execute(&mut **tx)
                .await
                .map_err(|e| ConfessionError::Storage(e.to_string()))?;
                kept.push(id);
            }
            None => {
                let result = sqlx::query(
                    "INSERT INTO attachments (confession_id, url, kind, uploaded_at, caption) \
                     VALUES (?, ?, ?, ?, ?)",
                )
                .bind(confession_id)
                .bind(&attachment.url)
                .bind(attachment.kind.as_str())
                .bind(attachment.uploaded_at)
                .bind(&attachment.caption)
                .execute(&mut **tx)
                .await
                .map_err(|e| ConfessionError::Storage(e.to_string()))?;
                let id = result.last_insert_rowid();
                attachment.id = Some(id);
                kept.push(id);
            }
        }
    }
    delete_missing_rows(tx, "attachments", "confession_id", confession_id, &kept).await
}

async fn save_tags(
    tx: &mut Transaction<'_, Sqlite>,
    confession_id: i64,
    tags: &mut [Tag],
) -> Result<(), ConfessionError> {
    // Links are rebuilt from the aggregate; tag rows themselves are shared
    // with other confessions and never deleted here.
    sqlx::query("DELETE FROM confession_tags WHERE confession_id = ?")
        .bind(confession_id)
        .execute(&mut **tx)
        .await
        .map_err(|e| ConfessionError::Storage(e.to_string()))?;

    for tag in tags.iter_mut() {
        let existing = sqlx::query("SELECT id FROM tags WHERE name = ?")
            .bind(&tag.name)
            .fetch_optional(&mut **tx)
            .await
            .map_err(|e| ConfessionError::Storage(e.to_string()))?;

        let tag_id = match existing {
            Some(row) => row.get::<i64, _>("id"),
            None => sqlx::query("INSERT INTO tags (name) VALUES (?)")
                .bind(&tag.name)
                .execute(&mut **tx)
                .await
                .map_err(|e| ConfessionError::Storage(e.to_string()))?
                .last_insert_rowid(),
        };
        tag.id = Some(tag_id);

        sqlx::query("INSERT OR IGNORE INTO confession_tags (confession_id, tag_id) VALUES (?, ?)")
            .bind(confession_id)
            .bind(tag_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| ConfessionError::Storage(e.to_string()))?;
    }
    Ok(())
}

async fn save_poll(
    tx: &mut Transaction<'_, Sqlite>,
    confession_id: i64,
    poll: Option<&mut Poll>,
) -> Result<(), ConfessionError> {
    let poll = match poll {
        Some(poll) => poll,
        None => {
            sqlx::query(
                "DELETE FROM poll_options WHERE poll_id IN \
                 (SELECT id FROM polls WHERE confession_id = ?)",
            )
            .bind(confession_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| ConfessionError::Storage(e.to_string()))?;
            sqlx::query("DELETE FROM polls WHERE confession_id = ?")
                .bind(confession_id)
                .execute(&mut **tx)
                .await
                .map_err(|e| ConfessionError::Storage(e.to_string()))?;
            return Ok(());
        }
    };

    let poll_id = match poll.id {
        Some(id) => {
            sqlx::query(
                "UPDATE polls SET question = ?, allows_multiple_answers = ?, kind = ?, \
                 correct_option_id = ?, explanation = ?, open_period_secs = ?, \
                 poll_message_id = ? WHERE id = ? AND confession_id = ?",
            )
            .bind(&poll.question)
            .bind(poll.allows_multiple_answers)
            .bind(poll.kind.as_str())
            .bind(poll.correct_option_id)
            .bind(&poll.explanation)
            .bind(poll.open_period_secs)
            .bind(&poll.poll_message_id)
            .bind(id)
            .bind(confession_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| ConfessionError::Storage(e.to_string()))?;
            id
        }
        None => {
            // A brand-new poll entity replaces whatever the confession had
            sqlx::query(
                "DELETE FROM poll_options WHERE poll_id IN \
                 (SELECT id FROM polls WHERE confession_id = ?)",
            )
            .bind(confession_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| ConfessionError::Storage(e.to_string()))?;
            sqlx::query("DELETE FROM polls WHERE confession_id = ?")
                .bind(confession_id)
                .execute(&mut **tx)
                .await
                .map_err(|e| ConfessionError::Storage(e.to_string()))?;

            let result = sqlx::query(
                "INSERT INTO polls (confession_id, question, allows_multiple_answers, kind, \
                 correct_option_id, explanation, open_period_secs, poll_message_id, created_at) \
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(confession_id)
            .bind(&poll.question)
            .bind(poll.allows_multiple_answers)
            .bind(poll.kind.as_str())
            .bind(poll.correct_option_id)
            .bind(&poll.explanation)
            .bind(poll.open_period_secs)
            .bind(&poll.poll_message_id)
            .bind(poll.created_at)
            .execute(&mut **tx)
            .await
            .map_err(|e| ConfessionError::Storage(e.to_string()))?;
            result.last_insert_rowid()
        }
    };
    poll.id = Some(poll_id);

    let mut kept = Vec::with_capacity(poll.options.len());
    for option in poll.options.iter_mut() {
        match option.id {
            Some(id) => {
                // Text only: vote_count belongs to add_vote
                sqlx::query("UPDATE poll_options SET text = ? WHERE id = ? AND poll_id = ?")
                    .bind(&option.text)
                    .bind(id)
                    .bind(poll_id)
                    .execute(&mut **tx)
                    .await
                    .map_err(|e| ConfessionError::Storage(e.to_string()))?;
                kept.push(id);
            }
            None => {
                let result = sqlx::query(
                    "INSERT INTO poll_options (poll_id, text, vote_count) VALUES (?, ?, ?)",
                )
                .bind(poll_id)
                .bind(&option.text)
                .bind(option.vote_count)
                .execute(&mut **tx)
                .await
                .map_err(|e| ConfessionError::Storage(e.to_string()))?;
                let id = result.last_insert_rowid();
                option.id = Some(id);
                kept.push(id);
            }
        }
    }
    delete_missing_rows(tx, "poll_options", "poll_id", poll_id, &kept).await
}

async fn save_moderation_logs(
    tx: &mut Transaction<'_, Sqlite>,
    confession_id: i64,
    logs: &mut [ModerationLog],
) -> Result<(), ConfessionError> {
    // Insert-only: entries that already have an id are left exactly as
    // they were written, and nothing is ever deleted.
    for log in logs.iter_mut() {
        if log.id.is_some() {
            continue;
        }
        log.confession_id = Some(confession_id);
        let result = sqlx::query(
            "INSERT INTO moderation_logs (confession_id, decision, moderator, reason, timestamp) \
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(confession_id)
        .bind(log.decision.as_str())
        .bind(&log.moderator)
        .bind(&log.reason)
        .bind(log.timestamp)
        .execute(&mut **tx)
        .await
        .map_err(|e| ConfessionError::Storage(e.to_string()))?;
        log.id = Some(result.last_insert_rowid());
    }
    Ok(())
}

async fn save_published_record(
    tx: &mut Transaction<'_, Sqlite>,
    confession_id: i64,
    record: Option<&mut PublishedRecord>,
) -> Result<(), ConfessionError> {
    let record = match record {
        Some(record) => record,
        None => {
            sqlx::query("DELETE FROM published_records WHERE confession_id = ?")
                .bind(confession_id)
                .execute(&mut **tx)
                .await
                .map_err(|e| ConfessionError::Storage(e.to_string()))?;
            return Ok(());
        }
    };

    record.confession_id = Some(confession_id);
    match record.id {
        Some(id) => {
            sqlx::query(
                "UPDATE published_records SET telegram_message_id = ?, channel_id = ?, \
                 published_at = ?, discussion_thread_id = ? WHERE id = ?",
            )
            .bind(&record.telegram_message_id)
            .bind(&record.channel_id)
            .bind(record.published_at)
            .bind(&record.discussion_thread_id)
            .bind(id)
            .execute(&mut **tx)
            .await
            .map_err(|e| ConfessionError::Storage(e.to_string()))?;
        }
        None => {
            sqlx::query("DELETE FROM published_records WHERE confession_id = ?")
                .bind(confession_id)
                .execute(&mut **tx)
                .await
                .map_err(|e| ConfessionError::Storage(e.to_string()))?;
            let result = sqlx::query(
                "INSERT INTO published_records (confession_id, telegram_message_id, channel_id, \
                 published_at, discussion_thread_id) VALUES (?, ?, ?, ?, ?)",
            )
            .bind(confession_id)
            .bind(&record.telegram_message_id)
            .bind(&record.channel_id)
            .bind(record.published_at)
            .bind(&record.discussion_thread_id)
            .execute(&mut **tx)
            .await
            .map_err(|e| ConfessionError::Storage(e.to_string()))?;
            record.id = Some(result.last_insert_rowid());
        }
    }
    Ok(())
}

async fn save_comments(
    tx: &mut Transaction<'_, Sqlite>,
    confession_id: i64,
    comments: &mut [Comment],
) -> Result<(), ConfessionError> {
    let mut kept = Vec::with_capacity(comments.len());
    for comment in comments.iter_mut() {
        comment.confession_id = Some(confession_id);
        match comment.id {
            Some(id) => {
                sqlx::query(
                    "UPDATE comments SET content = ?, created_at = ?, reply_to = ? \
                     WHERE id = ? AND confession_id = ?",
                )
                .bind(&comment.content)
                .bind(comment.created_at)
                .bind(comment.reply_to)
                .bind(id)
                .bind(confession_id)
                .execute(&mut **tx)
                .await
                .map_err(|e| ConfessionError::Storage(e.to_string()))?;
                kept.push(id);
            }
            None => {
                let result = sqlx::query(
                    "INSERT INTO comments (confession_id, content, created_at, reply_to) \
                     VALUES (?, ?, ?, ?)",
                )
                .bind(confession_id)
                .bind(&comment.content)
                .bind(comment.created_at)
                .bind(comment.reply_to)
                .execute(&mut **tx)
                .await
                .map_err(|e| ConfessionError::Storage(e.to_string()))?;
                let id = result.last_insert_rowid();
                comment.id = Some(id);
                kept.push(id);
            }
        }
    }
    delete_missing_rows(tx, "comments", "confession_id", confession_id, &kept).await
}

async fn delete_missing_rows(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    parent_column: &str,
    parent_id: i64,
    kept: &[i64],
) -> Result<(), ConfessionError> {
    let sql = if kept.is_empty() {
        format!("DELETE FROM {} WHERE {} = ?", table, parent_column)
    } else {
        let placeholders = vec!["?"; kept.len()].join(", ");
        format!(
            "DELETE FROM {} WHERE {} = ? AND id NOT IN ({})",
            table, parent_column, placeholders
        )
    };

    let mut query = sqlx::query(&sql).bind(parent_id);
    for id in kept {
        query = query.bind(id);
    }
    query
        .execute(&mut **tx)
        .await
        .map_err(|e| ConfessionError::Storage(e.to_string()))?;
    Ok(())
}

fn row_to_confession(row: &SqliteRow) -> Result<Confession, ConfessionError> {
    let status_text: String = row.get("status");
    let status = ConfessionStatus::parse(&status_text).ok_or_else(|| {
        ConfessionError::Storage(format!("unknown confession status '{}'", status_text))
    })?;

    Ok(Confession {
        id: Some(row.get("id")),
        content: row.get("content"),
        created_at: row.get("created_at"),
        status,
        attachments: Vec::new(),
        tags: Vec::new(),
        poll: None,
        moderation_logs: Vec::new(),
        published_record: None,
        comments: Vec::new(),
    })
}

fn row_to_attachment(row: &SqliteRow) -> Attachment {
    Attachment {
        id: Some(row.get("id")),
        url: row.get("url"),
        kind: AttachmentKind::parse(&row.get::<String, _>("kind")),
        uploaded_at: row.get("uploaded_at"),
        caption: row.get("caption"),
    }
}

fn row_to_poll(row: &SqliteRow) -> Poll {
    Poll {
        id: Some(row.get("id")),
        question: row.get("question"),
        options: Vec::new(),
        allows_multiple_answers: row.get("allows_multiple_answers"),
        kind: PollKind::parse(&row.get::<String, _>("kind")),
        correct_option_id: row.get("correct_option_id"),
        explanation: row.get("explanation"),
        open_period_secs: row.get("open_period_secs"),
        poll_message_id: row.get("poll_message_id"),
        created_at: row.get("created_at"),
    }
}

fn row_to_option(row: &SqliteRow) -> PollOption {
    PollOption {
        id: Some(row.get("id")),
        text: row.get("text"),
        vote_count: row.get::<i64, _>("vote_count") as u32,
    }
}

fn row_to_moderation_log(row: &SqliteRow) -> Result<ModerationLog, ConfessionError> {
    let decision_text: String = row.get("decision");
    let decision = ConfessionStatus::parse(&decision_text).ok_or_else(|| {
        ConfessionError::Storage(format!("unknown moderation decision '{}'", decision_text))
    })?;

    Ok(ModerationLog {
        id: Some(row.get("id")),
        confession_id: Some(row.get("confession_id")),
        decision,
        moderator: row.get("moderator"),
        reason: row.get("reason"),
        timestamp: row.get("timestamp"),
    })
}

fn row_to_published_record(row: &SqliteRow) -> PublishedRecord {
    PublishedRecord {
        id: Some(row.get("id")),
        confession_id: Some(row.get("confession_id")),
        telegram_message_id: row.get("telegram_message_id"),
        channel_id: row.get("channel_id"),
        published_at: row.get("published_at"),
        discussion_thread_id: row.get("discussion_thread_id"),
    }
}

fn row_to_comment(row: &SqliteRow) -> Comment {
    Comment {
        id: Some(row.get("id")),
        confession_id: Some(row.get("confession_id")),
        content: row.get("content"),
        created_at: row.get("created_at"),
        reply_to: row.get("reply_to"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    async fn test_store() -> (SqliteConfessionStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("confessions.db");
        let store = SqliteConfessionStore::new(path.to_str().unwrap())
            .await
            .unwrap();
        (store, dir)
    }

    fn full_confession() -> Confession {
        let mut confession = Confession::new("I still play club penguin".to_string());
        confession.attachments.push(Attachment::new(
            "https://example.com/proof.png".to_string(),
            AttachmentKind::Image,
            Some("screenshot".to_string()),
        ));
        confession.add_tag(Tag::new("games"));
        confession.add_tag(Tag::new("nostalgia"));
        confession.poll = Some(Poll {
            id: None,
            question: "Should I stop?".to_string(),
            options: vec![
                PollOption::new("Yes".to_string()),
                PollOption::new("Never".to_string()),
            ],
            allows_multiple_answers: false,
            kind: PollKind::Regular,
            correct_option_id: None,
            explanation: None,
            open_period_secs: Some(3600),
            poll_message_id: None,
            created_at: Utc::now(),
        });
        confession.comments.push(Comment {
            id: None,
            confession_id: None,
            content: "same".to_string(),
            created_at: Utc::now(),
            reply_to: None,
        });
        confession
    }

    #[tokio::test]
    async fn test_save_and_load_full_aggregate() {
        let (store, _dir) = test_store().await;

        let mut confession = full_confession();
        confession.record_moderation(ConfessionStatus::Approved, "LLM", None);
        confession.mark_published("555".to_string(), "@falt_conf".to_string());

        let saved = store.save(confession).await.unwrap();
        assert!(saved.id.is_some());
        assert!(saved.poll.as_ref().unwrap().id.is_some());
        assert!(saved.moderation_logs[0].id.is_some());

        let loaded = store.get_by_id(saved.id.unwrap()).await.unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.status, ConfessionStatus::Published);
        assert_eq!(loaded.tags.len(), 2);
        assert_eq!(loaded.attachments.len(), 1);
        assert_eq!(loaded.comments.len(), 1);
        assert_eq!(loaded.published_record.unwrap().telegram_message_id, "555");
    }

    #[tokio::test]
    async fn test_missing_id_loads_none() {
        let (store, _dir) = test_store().await;
        assert!(store.get_by_id(12345).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_resave_keeps_child_ids_and_vote_counts() {
        let (store, _dir) = test_store().await;

        let saved = store.save(full_confession()).await.unwrap();
        let confession_id = saved.id.unwrap();
        let poll_id = saved.poll.as_ref().unwrap().id.unwrap();
        let option_id = saved.poll.as_ref().unwrap().options[0].id.unwrap();

        // A stale copy loaded before any votes arrive
        let stale = store.get_by_id(confession_id).await.unwrap().unwrap();

        store.add_vote(poll_id, option_id).await.unwrap();
        store.add_vote(poll_id, option_id).await.unwrap();

        // Saving the stale copy (vote_count still 0 in memory) must not
        // roll the tally back
        let resaved = store.save(stale).await.unwrap();
        assert_eq!(resaved.poll.as_ref().unwrap().id, Some(poll_id));

        let poll = store.get_poll(poll_id).await.unwrap().unwrap();
        assert_eq!(poll.options[0].id, Some(option_id));
        assert_eq!(poll.options[0].vote_count, 2);
        assert_eq!(poll.options[1].vote_count, 0);
    }

    #[tokio::test]
    async fn test_moderation_logs_are_append_only() {
        let (store, _dir) = test_store().await;

        let saved = store.save(full_confession()).await.unwrap();
        let id = saved.id.unwrap();

        let mut loaded = store.get_by_id(id).await.unwrap().unwrap();
        loaded.record_moderation(ConfessionStatus::Rejected, "LLM", Some("nope".to_string()));
        store.save(loaded).await.unwrap();

        // Resaving without new entries changes nothing
        let unchanged = store.get_by_id(id).await.unwrap().unwrap();
        store.save(unchanged).await.unwrap();

        let mut again = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(again.moderation_logs.len(), 1);
        assert_eq!(again.moderation_logs[0].reason.as_deref(), Some("nope"));

        again.record_moderation(ConfessionStatus::Approved, "admin", None);
        store.save(again).await.unwrap();

        let final_state = store.get_by_id(id).await.unwrap().unwrap();
        assert_eq!(final_state.moderation_logs.len(), 2);
        assert_ne!(
            final_state.moderation_logs[0].id,
            final_state.moderation_logs[1].id
        );
    }

    #[tokio::test]
    async fn test_add_vote_rejects_foreign_option() {
        let (store, _dir) = test_store().await;

        let saved = store.save(full_confession()).await.unwrap();
        let poll_id = saved.poll.as_ref().unwrap().id.unwrap();

        let err = store.add_vote(poll_id, 9999).await.unwrap_err();
        assert!(matches!(err, ConfessionError::InvalidOption { .. }));

        let poll = store.get_poll(poll_id).await.unwrap().unwrap();
        assert_eq!(poll.total_votes(), 0);
    }

    #[tokio::test]
    async fn test_list_and_update_status() {
        let (store, _dir) = test_store().await;

        let first = store.save(Confession::new("one".to_string())).await.unwrap();
        store.save(Confession::new("two".to_string())).await.unwrap();

        assert!(store
            .update_status(first.id.unwrap(), ConfessionStatus::Approved)
            .await
            .unwrap());
        assert!(!store
            .update_status(999, ConfessionStatus::Approved)
            .await
            .unwrap());

        let approved = store
            .list_by_status(Some(ConfessionStatus::Approved))
            .await
            .unwrap();
        assert_eq!(approved.len(), 1);
        assert_eq!(approved[0].content, "one");

        let all = store.list_by_status(None).await.unwrap();
        assert_eq!(all.len(), 2);
        // Oldest first
        assert_eq!(all[0].content, "one");
    }

    #[tokio::test]
    async fn test_tags_are_shared_rows() {
        let (store, _dir) = test_store().await;

        let mut first = Confession::new("first".to_string());
        first.add_tag(Tag::new("life"));
        let first = store.save(first).await.unwrap();

        let mut second = Confession::new("second".to_string());
        second.add_tag(Tag::new("LIFE"));
        let second = store.save(second).await.unwrap();

        assert_eq!(first.tags[0].id, second.tags[0].id);
        assert_eq!(second.tags[0].name, "life");
    }
}
