// HTTP surface over the core services.
//
// One shared state carries the four services; the feature routers in
// confession_routes / poll_routes hang off it under /api. Errors cross
// the boundary as a `detail` JSON object with the status code chosen
// from the core error variant.

use crate::api::{confession_routes, poll_routes};
use crate::core::confession::{ConfessionError, ConfessionService, ConfessionStore};
use crate::core::moderation::{ModerationProvider, ModerationService};
use crate::core::poll::{PollService, PollStore};
use crate::core::publishing::{ChannelPublisher, PublishingService};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};

pub type SharedConfessionStore = Arc<dyn ConfessionStore>;
pub type SharedPollStore = Arc<dyn PollStore>;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

// ============================================================================
// SHARED STATE
// ============================================================================

#[derive(Clone)]
pub struct AppState {
    pub confessions: Arc<ConfessionService<SharedConfessionStore>>,
    pub moderation: Arc<ModerationService<SharedConfessionStore, Box<dyn ModerationProvider>>>,
    pub publishing: Arc<PublishingService<SharedConfessionStore, Box<dyn ChannelPublisher>>>,
    pub polls: Arc<PollService<SharedPollStore>>,
}

impl AppState {
    pub fn new(
        store: SharedConfessionStore,
        poll_store: SharedPollStore,
        provider: Box<dyn ModerationProvider>,
        publisher: Box<dyn ChannelPublisher>,
    ) -> Self {
        Self {
            confessions: Arc::new(ConfessionService::new(store.clone())),
            moderation: Arc::new(ModerationService::new(store.clone(), provider)),
            publishing: Arc::new(PublishingService::new(store, publisher)),
            polls: Arc::new(PollService::new(poll_store)),
        }
    }
}

// ============================================================================
// ERROR MAPPING
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub detail: String,
}

pub fn error_response(error: ConfessionError) -> ApiError {
    let status = match &error {
        ConfessionError::NotFound(_) | ConfessionError::PollNotFound(_) => StatusCode::NOT_FOUND,
        ConfessionError::InvalidState(_) | ConfessionError::InvalidOption { .. } => {
            StatusCode::BAD_REQUEST
        }
        ConfessionError::Channel(_) => StatusCode::BAD_GATEWAY,
        ConfessionError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (
        status,
        Json(ErrorResponse {
            detail: error.to_string(),
        }),
    )
}

pub fn not_found(detail: impl Into<String>) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
}

pub fn unprocessable(detail: impl Into<String>) -> ApiError {
    (
        StatusCode::UNPROCESSABLE_ENTITY,
        Json(ErrorResponse {
            detail: detail.into(),
        }),
    )
}

// ============================================================================
// ROUTER
// ============================================================================

async fn health_handler() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .nest(
            "/api",
            confession_routes::routes().merge(poll_routes::routes()),
        )
        .layer(cors)
        .with_state(state)
}

pub async fn serve(router: Router, host: &str, port: u16) -> anyhow::Result<()> {
    let addr = format!("{}:{}", host, port);
    let listener = TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);
    axum::serve(listener, router).await?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
