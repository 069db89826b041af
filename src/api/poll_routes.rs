// Poll endpoints.
//
// A standalone poll is persisted as a poll-only confession (empty
// content) so it walks the same moderation and publication lifecycle.
// Wire names follow the channel provider: `type` for the poll kind,
// `open_period` in seconds.

use crate::api::server::{
    error_response, not_found, unprocessable, ApiError, AppState, ErrorResponse,
};
use crate::core::confession::{NewConfession, NewPoll, Poll, PollKind};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

const MAX_QUESTION_CHARS: usize = 255;
const MAX_OPTION_CHARS: usize = 255;
const MIN_OPTIONS: usize = 2;
const MAX_OPTIONS: usize = 10;

// ============================================================================
// REQUEST TYPES
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct PollRequest {
    pub question: String,
    pub options: Vec<PollOptionRequest>,
    #[serde(default)]
    pub allows_multiple_answers: bool,
    #[serde(rename = "type", default)]
    pub kind: PollKind,
    #[serde(default)]
    pub correct_option_id: Option<i64>,
    #[serde(default)]
    pub explanation: Option<String>,
    #[serde(rename = "open_period", default)]
    pub open_period_secs: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct PollOptionRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct VoteRequest {
    pub option_id: i64,
}

impl PollRequest {
    pub fn validate(&self) -> Result<(), String> {
        let question_chars = self.question.chars().count();
        if question_chars == 0 || question_chars > MAX_QUESTION_CHARS {
            return Err(format!(
                "poll question must be between 1 and {} characters",
                MAX_QUESTION_CHARS
            ));
        }
        if self.options.len() < MIN_OPTIONS || self.options.len() > MAX_OPTIONS {
            return Err(format!(
                "a poll needs between {} and {} options",
                MIN_OPTIONS, MAX_OPTIONS
            ));
        }
        for option in &self.options {
            let text_chars = option.text.chars().count();
            if text_chars == 0 || text_chars > MAX_OPTION_CHARS {
                return Err(format!(
                    "poll option text must be between 1 and {} characters",
                    MAX_OPTION_CHARS
                ));
            }
        }
        Ok(())
    }
}

impl From<PollRequest> for NewPoll {
    fn from(request: PollRequest) -> Self {
        Self {
            question: request.question,
            options: request
                .options
                .into_iter()
                .map(|option| option.text)
                .collect(),
            allows_multiple_answers: request.allows_multiple_answers,
            kind: request.kind,
            correct_option_id: request.correct_option_id,
            explanation: request.explanation,
            open_period_secs: request.open_period_secs,
        }
    }
}

// ============================================================================
// RESPONSE TYPES
// ============================================================================

#[derive(Debug, Serialize)]
pub struct PollResponse {
    pub id: i64,
    pub question: String,
    pub options: Vec<PollOptionResponse>,
    pub allows_multiple_answers: bool,
    #[serde(rename = "type")]
    pub kind: PollKind,
    pub correct_option_id: Option<i64>,
    pub explanation: Option<String>,
    #[serde(rename = "open_period")]
    pub open_period_secs: Option<u32>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
pub struct PollOptionResponse {
    pub id: i64,
    pub text: String,
    pub vote_count: u32,
}

impl From<Poll> for PollResponse {
    fn from(poll: Poll) -> Self {
        Self {
            id: poll.id.unwrap_or_default(),
            question: poll.question,
            options: poll
                .options
                .into_iter()
                .map(|option| PollOptionResponse {
                    id: option.id.unwrap_or_default(),
                    text: option.text,
                    vote_count: option.vote_count,
                })
                .collect(),
            allows_multiple_answers: poll.allows_multiple_answers,
            kind: poll.kind,
            correct_option_id: poll.correct_option_id,
            explanation: poll.explanation,
            open_period_secs: poll.open_period_secs,
            created_at: poll.created_at,
        }
    }
}

// ============================================================================
// ROUTES
// ============================================================================

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/polls", post(create_poll))
        .route("/polls/{id}/vote", post(vote))
        .route("/polls/{id}/results", get(poll_results))
}

// ============================================================================
// HANDLERS
// ============================================================================

async fn create_poll(
    State(state): State<AppState>,
    Json(request): Json<PollRequest>,
) -> Result<(StatusCode, Json<PollResponse>), ApiError> {
    request.validate().map_err(unprocessable)?;

    tracing::info!("Creating new poll: {}", request.question);
    let submission = NewConfession {
        content: String::new(),
        attachments: Vec::new(),
        tags: Vec::new(),
        poll: Some(request.into()),
    };
    let confession = state
        .confessions
        .create(submission)
        .await
        .map_err(error_response)?;

    match confession.poll {
        Some(poll) => Ok((StatusCode::CREATED, Json(poll.into()))),
        None => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorResponse {
                detail: "Poll was not persisted".to_string(),
            }),
        )),
    }
}

async fn vote(
    State(state): State<AppState>,
    Path(poll_id): Path<i64>,
    Json(request): Json<VoteRequest>,
) -> Result<Json<PollResponse>, ApiError> {
    let poll = state
        .polls
        .vote(poll_id, request.option_id)
        .await
        .map_err(error_response)?;

    tracing::info!("Vote cast on poll {} option {}", poll_id, request.option_id);
    Ok(Json(poll.into()))
}

async fn poll_results(
    State(state): State<AppState>,
    Path(poll_id): Path<i64>,
) -> Result<Json<PollResponse>, ApiError> {
    match state.polls.results(poll_id).await.map_err(error_response)? {
        Some(poll) => Ok(Json(poll.into())),
        None => Err(not_found(format!("Poll with ID {} not found", poll_id))),
    }
}

// ============================================================================
// TESTS
// ============================================================================
