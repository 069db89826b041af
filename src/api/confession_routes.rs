// Confession endpoints.
//
// Requests are validated against the submission bounds before they
// reach the core; responses expose the public slice of the aggregate
// (no moderation logs, published record or comments).

use crate::api::poll_routes::{PollRequest, PollResponse};
use crate::api::server::{error_response, not_found, unprocessable, ApiError, AppState};
use crate::core::confession::{
    AttachmentKind, Confession, ConfessionStatus, NewAttachment, NewConfession,
};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_CONTENT_CHARS: usize = 5000;
const MAX_URL_CHARS: usize = 255;
const MAX_CAPTION_CHARS: usize = 255;
const MAX_TAG_CHARS: usize = 50;

// ============================================================================
// REQUEST TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct CreateConfessionRequest {
    pub content: String,
    #[serde(default)]
    pub attachments: Vec<AttachmentRequest>,
    #[serde(default)]
    pub tags: Vec<TagRequest>,
    #[serde(default)]
    pub poll: Option<PollRequest>,
}

#[derive(Debug, Deserialize)]
pub struct AttachmentRequest {
    pub url: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct TagRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: ConfessionStatus,
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    // Kept as a raw string so an unknown value becomes a 422 with a
    // `detail` body instead of the extractor's plain-text 400.
    #[serde(default)]
    pub status: Option<String>,
}

impl ListQuery {
    fn status_filter(&self) -> Result<Option<ConfessionStatus>, String> {
        match self.status.as_deref() {
            None => Ok(None),
            Some(raw) => ConfessionStatus::parse(raw)
                .map(Some)
                .ok_or_else(|| format!("unknown status filter: {}", raw)),
        }
    }
}

impl CreateConfessionRequest {
    pub fn validate(&self) -> Result<(), String> {
        let content_chars = self.content.chars().count();
        if content_chars == 0 || content_chars > MAX_CONTENT_CHARS {
            return Err(format!(
                "content must be between 1 and {} characters",
                MAX_CONTENT_CHARS
            ));
        }
        for attachment in &self.attachments {
            attachment.validate()?;
        }
        for tag in &self.tags {
            let name_chars = tag.name.trim().chars().count();
            if name_chars == 0 || name_chars > MAX_TAG_CHARS {
                return Err(format!(
                    "tag name must be between 1 and {} characters",
                    MAX_TAG_CHARS
                ));
            }
        }
        if let Some(poll) = &self.poll {
            poll.validate()?;
        }
        Ok(())
    }
}

impl AttachmentRequest {
    fn validate(&self) -> Result<(), String> {
        let url_chars = self.url.chars().count();
        if url_chars == 0 || url_chars > MAX_URL_CHARS {
            return Err(format!(
                "attachment url must be between 1 and {} characters",
                MAX_URL_CHARS
            ));
        }
        if let Some(caption) = &self.caption {
            if caption.chars().count() > MAX_CAPTION_CHARS {
                return Err(format!(
                    "attachment caption must be at most {} characters",
                    MAX_CAPTION_CHARS
                ));
            }
        }
        Ok(())
    }
}

impl From<CreateConfessionRequest> for NewConfession {
    fn from(request: CreateConfessionRequest) -> Self {
        Self {
            content: request.content,
            attachments: request
                .attachments
                .into_iter()
                .map(|attachment| NewAttachment {
                    url: attachment.url,
                    kind: attachment.kind,
                    caption: attachment.caption,
                })
                .collect(),
            tags: request.tags.into_iter().map(|tag| tag.name).collect(),
            poll: request.poll.map(Into::into),
        }
    }
}

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ConfessionResponse {
    pub id: i64,
    pub content: String,
    pub created_at: DateTime<Utc>,
    pub status: ConfessionStatus,
    pub attachments: Vec<AttachmentResponse>,
    pub tags: Vec<TagResponse>,
    pub poll: Option<PollResponse>,
}

#[derive(Debug, Serialize)]
pub struct AttachmentResponse {
    pub id: i64,
    pub url: String,
    #[serde(rename = "type")]
    pub kind: AttachmentKind,
    pub uploaded_at: DateTime<Utc>,
    pub caption: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TagResponse {
    pub id: i64,
    pub name: String,
}

impl From<Confession> for ConfessionResponse {
    fn from(confession: Confession) -> Self {
        Self {
            id: confession.id.unwrap_or_default(),
            content: confession.content,
            created_at: confession.created_at,
            status: confession.status,
            attachments: confession
                .attachments
                .into_iter()
                .map(|attachment| AttachmentResponse {
                    id: attachment.id.unwrap_or_default(),
                    url: attachment.url,
                    kind: attachment.kind,
                    uploaded_at: attachment.uploaded_at,
                    caption: attachment.caption,
                })
                .collect(),
            tags: confession
                .tags
                .into_iter()
                .map(|tag| TagResponse {
                    id: tag.id.unwrap_or_default(),
                    name: tag.name,
                })
                .collect(),
            poll: confession.poll.map(Into::into),
        }
    }
}

// ============================================================================
// ROUTES
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/confessions", post(create_confession))
        .route("/confessions", get(list_confessions))
        .route("/confessions/{id}", get(get_confession))
        .route("/confessions/{id}/moderate", post(moderate_confession))
        .route("/confessions/{id}/publish", post(publish_confession))
        .route("/confessions/{id}/status", patch(update_confession_status))
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn create_confession(
    State(state): State<AppState>,
    Json(request): Json<CreateConfessionRequest>,
) -> Result<(StatusCode, Json<ConfessionResponse>), ApiError> {
    request.validate().map_err(unprocessable)?;

    tracing::info!("Creating new confession");
    let confession = state
        .confessions
        .create(request.into())
        .await
        .map_err(error_response)?;

    Ok((StatusCode::CREATED, Json(confession.into())))
}

async fn get_confession(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ConfessionResponse>, ApiError> {
    match state.confessions.get(id).await.map_err(error_response)? {
        Some(confession) => Ok(Json(confession.into())),
        None => Err(not_found(format!("Confession with ID {} not found", id))),
    }
}

async fn list_confessions(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<ConfessionResponse>>, ApiError> {
    let status = query.status_filter().map_err(unprocessable)?;
    let confessions = state
        .confessions
        .list(status)
        .await
        .map_err(error_response)?;

    Ok(Json(confessions.into_iter().map(Into::into).collect()))
}

async fn moderate_confession(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ConfessionResponse>, ApiError> {
    let approved = state.moderation.moderate(id).await.map_err(error_response)?;
    tracing::info!("Confession {} moderated, approved: {}", id, approved);

    // The decision is already persisted; answer with the fresh state
    match state.confessions.get(id).await.map_err(error_response)? {
        Some(confession) => Ok(Json(confession.into())),
        None => Err(not_found(format!(
            "Confession with ID {} not found after moderation",
            id
        ))),
    }
}

async fn publish_confession(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ConfessionResponse>, ApiError> {
    let confession = state.publishing.publish(id).await.map_err(error_response)?;
    tracing::info!("Confession {} published", id);

    Ok(Json(confession.into()))
}

async fn update_confession_status(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<ConfessionResponse>, ApiError> {
    tracing::info!("Updating confession {} status to {}", id, request.status);

    match state
        .confessions
        .update_status(id, request.status)
        .await
        .map_err(error_response)?
    {
        Some(confession) => Ok(Json(confession.into())),
        None => Err(not_found(format!("Confession with ID {} not found", id))),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_from(value: serde_json::Value) -> CreateConfessionRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_minimal_request_validates() {
        let request = request_from(json!({ "content": "I sing in the shower" }));
        assert!(request.validate().is_ok());
        assert!(request.attachments.is_empty());
        assert!(request.tags.is_empty());
        assert!(request.poll.is_none());
    }

    #[test]
    fn test_content_bounds() {
        let empty = request_from(json!({ "content": "" }));
        assert!(empty.validate().is_err());

        let too_long = request_from(json!({ "content": "a".repeat(5001) }));
        assert!(too_long.validate().is_err());

        let at_limit = request_from(json!({ "content": "a".repeat(5000) }));
        assert!(at_limit.validate().is_ok());
    }

    #[test]
    fn test_attachment_type_field_maps_to_kind() {
        let request = request_from(json!({
            "content": "with proof",
            "attachments": [
                { "url": "https://example.com/a.png", "type": "IMAGE" },
                { "url": "https://example.com/b.mp3", "type": "MUSIC", "caption": "listen" }
            ]
        }));
        assert!(request.validate().is_ok());
        assert_eq!(request.attachments[0].kind, AttachmentKind::Image);
        assert_eq!(request.attachments[1].kind, AttachmentKind::Music);
    }

    #[test]
    fn test_attachment_url_bounds() {
        let request = request_from(json!({
            "content": "x",
            "attachments": [{ "url": "u".repeat(256), "type": "OTHER" }]
        }));
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_tag_name_bounds() {
        let too_long = request_from(json!({
            "content": "x",
            "tags": [{ "name": "t".repeat(51) }]
        }));
        assert!(too_long.validate().is_err());

        let blank = request_from(json!({
            "content": "x",
            "tags": [{ "name": "   " }]
        }));
        assert!(blank.validate().is_err());
    }

    #[test]
    fn test_conversion_to_submission() {
        let request = request_from(json!({
            "content": "full house",
            "attachments": [{ "url": "https://example.com/a.png", "type": "IMAGE" }],
            "tags": [{ "name": "Life" }],
            "poll": {
                "question": "agree?",
                "options": [{ "text": "yes" }, { "text": "no" }]
            }
        }));

        let submission: NewConfession = request.into();
        assert_eq!(submission.content, "full house");
        assert_eq!(submission.tags, vec!["Life".to_string()]);
        assert_eq!(submission.attachments[0].kind, AttachmentKind::Image);
        let poll = submission.poll.unwrap();
        assert_eq!(poll.options, vec!["yes".to_string(), "no".to_string()]);
    }

    #[test]
    fn test_status_query_parses_screaming_snake() {
        let query: ListQuery = serde_json::from_value(json!({ "status": "PENDING" })).unwrap();
        assert_eq!(query.status_filter(), Ok(Some(ConfessionStatus::Pending)));

        let none: ListQuery = serde_json::from_value(json!({})).unwrap();
        assert_eq!(none.status_filter(), Ok(None));
    }

    #[test]
    fn test_unknown_status_filter_rejected() {
        let query: ListQuery = serde_json::from_value(json!({ "status": "BOGUS" })).unwrap();
        let error = query.status_filter().unwrap_err();
        assert!(error.contains("BOGUS"));
    }

    #[test]
    fn test_response_hides_moderation_history() {
        let mut confession = Confession::new("quiet".to_string());
        confession.id = Some(4);
        confession.record_moderation(ConfessionStatus::Approved, "LLM", None);

        let response: ConfessionResponse = confession.into();
        let value = serde_json::to_value(&response).unwrap();
        assert_eq!(value["id"], 4);
        assert_eq!(value["status"], "APPROVED");
        assert!(value.get("moderation_logs").is_none());
        assert!(value.get("published_record").is_none());
    }
}
