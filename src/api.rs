//! HTTP API: webhook ingestion and health
//!
//! The webhook handler verifies the body signature over the exact raw
//! bytes before parsing, then fans the batch out into concurrent,
//! independent per-event tasks and acknowledges only once all of them
//! have settled. One event's failure never cancels a sibling and never
//! turns into a non-2xx acknowledgment, so the platform doesn't
//! retry-storm over transient per-event issues.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use futures::future::join_all;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

use crate::ai::AiCapability;
use crate::config::Config;
use crate::line::{LinePlatform, WebhookBatch, signature};
use crate::memory::ConversationRepo;
use crate::mention::SharedGrace;
use crate::name::NameHintResolver;
use crate::reward::RewardPool;
use crate::{Result, pipeline};

/// Shared state for API handlers
pub struct ApiState {
    /// Loaded configuration
    pub config: Config,
    /// Messaging platform client (fake in tests)
    pub platform: Arc<dyn LinePlatform>,
    /// AI backend client (fake in tests)
    pub ai: Arc<dyn AiCapability>,
    /// Conversation history store
    pub conversations: ConversationRepo,
    /// Calling-name hint cache
    pub names: NameHintResolver,
    /// Mention grace-window map
    pub grace: SharedGrace,
    /// Reward asset pool
    pub rewards: RewardPool,
}

/// Build the API router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhook", get(webhook_probe).post(webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process exits
///
/// # Errors
///
/// Returns error if the listener cannot bind.
pub async fn serve(state: Arc<ApiState>, port: u16) -> Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    tracing::info!(port, "webhook server listening");
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// `GET /health`
#[allow(clippy::unused_async)]
async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// `GET /webhook` endpoint verification probe
#[allow(clippy::unused_async)]
async fn webhook_probe() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "ok": true, "endpoint": "LINE webhook" }))
}

/// `POST /webhook`: signed event batch
async fn webhook(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let provided = headers
        .get(signature::SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if !signature::verify(&state.config.channel_secret, &body, provided) {
        tracing::warn!("webhook signature mismatch");
        return (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({ "error": "bad signature" })),
        );
    }

    let batch: WebhookBatch = match serde_json::from_slice(&body) {
        Ok(batch) => batch,
        Err(e) => {
            tracing::warn!(error = %e, "malformed webhook body");
            return (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({ "error": "malformed body" })),
            );
        }
    };

    tracing::debug!(events = batch.events.len(), "webhook batch received");

    // Concurrent fan-out; wait for all, isolate each event's failure
    let tasks = batch.events.into_iter().map(|event| {
        let state = Arc::clone(&state);
        async move {
            if let Err(e) = pipeline::process_event(&state, event).await {
                tracing::error!(error = %e, "event processing failed");
            }
        }
    });
    join_all(tasks).await;

    (StatusCode::OK, Json(serde_json::json!({ "ok": true })))
}
