//! HTTP routes for the webhook server.
//!
//! - WhatsApp (Meta Cloud API webhooks)
//! - Generic webhook for custom integrations and local testing
//! - Health and readiness probes

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use convo_common::util::{mask_participant, truncate_with_ellipsis};
use convo_core::SessionStore;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::message::{ChannelMessage, ChannelType};
use crate::whatsapp::WhatsAppChannel;

// ============================================================================
// State
// ============================================================================

/// Shared state for the webhook server.
pub struct ChannelsState {
    /// WhatsApp channel instance (if configured)
    pub whatsapp: Option<Arc<WhatsAppChannel>>,
    /// WhatsApp app secret for webhook signature verification
    pub whatsapp_app_secret: Option<Arc<str>>,
    /// Channel for forwarding incoming messages
    pub message_tx: mpsc::Sender<ChannelMessage>,
    /// Session store, probed by the readiness check
    pub store: Option<SessionStore>,
}

// ============================================================================
// Response Types
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    store: Option<String>,
}

impl HealthResponse {
    fn new(status: &str) -> Self {
        Self {
            status: status.to_string(),
            service: "convo-channels".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            store: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct WebhookResponse {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl WebhookResponse {
    fn ok() -> Self {
        Self {
            success: true,
            message: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
        }
    }
}

// ============================================================================
// Health Routes
// ============================================================================

async fn health() -> impl IntoResponse {
    Json(HealthResponse::new("healthy"))
}

async fn ready(State(state): State<Arc<ChannelsState>>) -> impl IntoResponse {
    if state.message_tx.is_closed() {
        return (StatusCode::SERVICE_UNAVAILABLE, Json(HealthResponse::new("not_ready")));
    }

    let mut response = HealthResponse::new("ready");
    if let Some(ref store) = state.store {
        // Fallback tier still serves.
        if store.is_healthy().await {
            response.store = Some("ok".into());
        } else {
            response.status = "degraded".into();
            response.store = Some("fallback_only".into());
        }
    }

    (StatusCode::OK, Json(response))
}

// ============================================================================
// WhatsApp Webhook
// ============================================================================

/// Meta webhook verification query params.
#[derive(Debug, Deserialize)]
struct WhatsAppVerifyQuery {
    #[serde(rename = "hub.mode")]
    mode: Option<String>,
    #[serde(rename = "hub.verify_token")]
    verify_token: Option<String>,
    #[serde(rename = "hub.challenge")]
    challenge: Option<String>,
}

/// Verify a WhatsApp webhook signature (X-Hub-Signature-256).
fn verify_whatsapp_signature(app_secret: &str, body: &[u8], signature_header: &str) -> bool {
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    // Format: "sha256=<hex_signature>"
    let Some(hex_sig) = signature_header.strip_prefix("sha256=") else {
        return false;
    };

    let Ok(expected) = hex::decode(hex_sig) else {
        return false;
    };

    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(app_secret.as_bytes()) else {
        return false;
    };
    mac.update(body);

    // Constant-time comparison
    mac.verify_slice(&expected).is_ok()
}

fn tokens_match(given: &str, expected: &str) -> bool {
    given.len() == expected.len()
        && given
            .as_bytes()
            .iter()
            .zip(expected.as_bytes())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b))
            == 0
}

/// GET /webhook/whatsapp
async fn whatsapp_verify(
    State(state): State<Arc<ChannelsState>>,
    Query(params): Query<WhatsAppVerifyQuery>,
) -> impl IntoResponse {
    let Some(ref whatsapp) = state.whatsapp else {
        return (StatusCode::NOT_FOUND, "WhatsApp channel not configured".to_string());
    };

    let token_matches = params
        .verify_token
        .as_deref()
        .is_some_and(|t| !whatsapp.verify_token().is_empty() && tokens_match(t, whatsapp.verify_token()));

    if params.mode.as_deref() == Some("subscribe") && token_matches {
        if let Some(challenge) = params.challenge {
            tracing::info!("WhatsApp webhook verified");
            return (StatusCode::OK, challenge);
        }
        return (StatusCode::BAD_REQUEST, "Missing hub.challenge".to_string());
    }

    tracing::warn!("WhatsApp webhook verification failed: token mismatch");
    (StatusCode::FORBIDDEN, "Forbidden".to_string())
}

/// POST /webhook/whatsapp
async fn whatsapp_webhook(
    State(state): State<Arc<ChannelsState>>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let Some(ref whatsapp) = state.whatsapp else {
        return (
            StatusCode::NOT_FOUND,
            Json(WebhookResponse::error("WhatsApp channel not configured")),
        );
    };

    if let Some(ref app_secret) = state.whatsapp_app_secret {
        let signature = headers
            .get("X-Hub-Signature-256")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("");

        if !verify_whatsapp_signature(app_secret, &body, signature) {
            tracing::warn!(
                signature = if signature.is_empty() { "missing" } else { "invalid" },
                "WhatsApp webhook signature verification failed"
            );
            return (
                StatusCode::UNAUTHORIZED,
                Json(WebhookResponse::error("Invalid signature")),
            );
        }
    }

    let Ok(payload) = serde_json::from_slice::<serde_json::Value>(&body) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(WebhookResponse::error("Invalid JSON payload")),
        );
    };

    // Status updates carry no messages; acknowledge them anyway.
    for msg in whatsapp.parse_webhook_payload(&payload) {
        tracing::info!(
            user_id = %mask_participant(&msg.user_id),
            trace_id = %msg.trace_id,
            preview = %truncate_with_ellipsis(msg.text_content().unwrap_or_default(), 50),
            "WhatsApp message received"
        );

        if let Err(e) = state.message_tx.send(msg).await {
            tracing::error!(error = %e, "Failed to forward WhatsApp message");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WebhookResponse::error(format!("Failed to forward message: {e}"))),
            );
        }
    }

    (StatusCode::OK, Json(WebhookResponse::ok()))
}

// ============================================================================
// Generic Webhook
// ============================================================================

#[derive(Debug, Deserialize)]
struct GenericWebhookPayload {
    #[serde(default)]
    channel: Option<String>,
    user_id: String,
    message: String,
    #[serde(default)]
    metadata: std::collections::HashMap<String, serde_json::Value>,
}

/// POST /webhook/generic
async fn generic_webhook(
    State(state): State<Arc<ChannelsState>>,
    Json(payload): Json<GenericWebhookPayload>,
) -> impl IntoResponse {
    if payload.user_id.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(WebhookResponse::error("user_id is required")),
        );
    }

    let channel_type = payload
        .channel
        .as_deref()
        .map_or(ChannelType::Cli, ChannelType::parse);

    let mut msg = ChannelMessage::text(payload.user_id, channel_type, payload.message);
    msg.metadata = payload
        .metadata
        .into_iter()
        .map(|(k, v)| (k, v.to_string()))
        .collect();

    if let Err(e) = state.message_tx.send(msg).await {
        tracing::error!(error = %e, "Failed to forward generic webhook message");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(WebhookResponse::error(format!("Failed to forward message: {e}"))),
        );
    }

    (StatusCode::OK, Json(WebhookResponse::ok()))
}

// ============================================================================
// Router Builder
// ============================================================================

/// Build the webhook HTTP router.
pub fn build_router(state: Arc<ChannelsState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/ready", get(ready))
        .route("/webhook/whatsapp", get(whatsapp_verify).post(whatsapp_webhook))
        .route("/webhook/generic", post(generic_webhook))
        .with_state(state)
}

/// Create the server state and the receiver for inbound messages.
pub fn create_state(
    whatsapp: Option<Arc<WhatsAppChannel>>,
    whatsapp_app_secret: Option<String>,
    store: Option<SessionStore>,
) -> (Arc<ChannelsState>, mpsc::Receiver<ChannelMessage>) {
    let (tx, rx) = mpsc::channel(100);

    let state = Arc::new(ChannelsState {
        whatsapp,
        whatsapp_app_secret: whatsapp_app_secret.map(Arc::from),
        message_tx: tx,
        store,
    });

    (state, rx)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::MessageContent;
    use axum::body::Body;
    use axum::http::Request;
    use tower::ServiceExt;

    fn create_test_state() -> (Arc<ChannelsState>, mpsc::Receiver<ChannelMessage>) {
        create_state(None, None, None)
    }

    fn whatsapp_state(secret: Option<&str>) -> (Arc<ChannelsState>, mpsc::Receiver<ChannelMessage>) {
        let channel = WhatsAppChannel::new(
            "token".into(),
            "123".into(),
            "verify-me".into(),
            vec!["*".into()],
        );
        create_state(Some(Arc::new(channel)), secret.map(String::from), None)
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
    }

    fn whatsapp_body() -> String {
        serde_json::json!({
            "entry": [{"changes": [{"value": {"messages": [{
                "from": "254712345678",
                "type": "text",
                "text": {"body": "hi"}
            }]}}]}]
        })
        .to_string()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let (state, _rx) = create_test_state();
        let app = build_router(state);

        let response = app
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_reports_store() {
        let (tx, _rx) = mpsc::channel(1);
        let state = Arc::new(ChannelsState {
            whatsapp: None,
            whatsapp_app_secret: None,
            message_tx: tx,
            store: Some(SessionStore::in_memory()),
        });

        let response = build_router(state)
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_ready_unavailable_when_processor_gone() {
        let (state, rx) = create_test_state();
        drop(rx);

        let response = build_router(state)
            .oneshot(Request::builder().uri("/ready").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_whatsapp_not_configured() {
        let (state, _rx) = create_test_state();
        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/whatsapp")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_whatsapp_verify_challenge() {
        let (state, _rx) = whatsapp_state(None);
        let app = build_router(state);

        let ok = app
            .clone()
            .oneshot(
                Request::builder()
                    .uri("/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=verify-me&hub.challenge=42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(ok.status(), StatusCode::OK);

        let denied = app
            .oneshot(
                Request::builder()
                    .uri("/webhook/whatsapp?hub.mode=subscribe&hub.verify_token=wrong&hub.challenge=42")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(denied.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_whatsapp_webhook_forwards_signed_message() {
        let (state, mut rx) = whatsapp_state(Some("secret"));
        let body = whatsapp_body();

        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/whatsapp")
                    .header("content-type", "application/json")
                    .header("X-Hub-Signature-256", sign("secret", body.as_bytes()))
                    .body(Body::from(body))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.user_id, "+254712345678");
        assert_eq!(msg.channel_type, ChannelType::WhatsApp);
    }

    #[tokio::test]
    async fn test_whatsapp_webhook_rejects_bad_signature() {
        let (state, mut rx) = whatsapp_state(Some("secret"));

        let response = build_router(state)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/whatsapp")
                    .header("X-Hub-Signature-256", "sha256=00")
                    .body(Body::from(whatsapp_body()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_generic_webhook() {
        let (state, mut rx) = create_test_state();
        let app = build_router(state);

        let payload = serde_json::json!({
            "user_id": "user123",
            "message": "Hello"
        });

        let response = app
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/webhook/generic")
                    .header("content-type", "application/json")
                    .body(Body::from(payload.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);

        let msg = rx.try_recv().unwrap();
        assert_eq!(msg.user_id, "user123");
        assert_eq!(msg.channel_type, ChannelType::Cli);
        if let MessageContent::Text { text } = msg.content {
            assert_eq!(text, "Hello");
        } else {
            panic!("Expected text message");
        }
    }

    #[test]
    fn test_signature_verification() {
        let sig = sign("secret", b"body");
        assert!(verify_whatsapp_signature("secret", b"body", &sig));
        assert!(!verify_whatsapp_signature("other", b"body", &sig));
        assert!(!verify_whatsapp_signature("secret", b"body", "md5=abc"));
    }
}
