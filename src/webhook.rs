use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde_json::json;
use tracing::{info, warn};

use crate::events::WebhookBody;
use crate::router::{handle_event, AppState};
use crate::signature;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/webhook", post(handle_webhook))
        .route("/health", get(health))
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Webhook entry point. The signature is checked over the exact raw bytes
/// before anything else happens; once it passes, the response is always
/// success. Event-level failures stay inside `handle_event`.
async fn handle_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let signature_header = headers
        .get("x-line-signature")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("");

    if !signature::verify(&body, signature_header, &state.config.line.channel_secret) {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "error": "invalid signature" })),
        )
            .into_response();
    }

    let parsed: WebhookBody = match serde_json::from_slice(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Undecodable webhook body: {}", e);
            return Json(json!({ "status": "ok" })).into_response();
        }
    };

    info!("Webhook delivery with {} event(s)", parsed.events.len());
    for raw in &parsed.events {
        handle_event(&state, raw).await;
    }

    Json(json!({ "status": "ok" })).into_response()
}
