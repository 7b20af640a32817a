//! HTTP surface for the chat gateway.
//!
//! `POST /api/text` accepts both voice-transcribed and typed messages;
//! `GET /api/health` reports service status. Upstream failures are replaced
//! with pre-written fallback sentences so provider diagnostics never reach
//! the client.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::gateway::limiter::RateLimiter;
use crate::gateway::openai::OpenAiProvider;
use crate::gateway::provider::{FallbackChain, ReplyProvider};
use crate::messages::SessionContext;
use crate::{BanterError, Result};

/// Replies substituted when every upstream attempt fails.
pub const FALLBACK_REPLIES: [&str; 5] = [
    "I'm currently experiencing technical difficulties. Please try again in a few moments.",
    "I'm temporarily unavailable. Please check back soon.",
    "Service is currently limited. Please try again later.",
    "I'm having trouble processing requests right now. Please wait a moment and try again.",
    "Temporary service interruption. Please try again shortly.",
];

const INVALID_INPUT_REPLY: &str = "Please provide a valid message.";
const RATE_LIMIT_REPLY: &str = "Too many requests. Please wait a moment before trying again.";

/// Pick a fallback sentence, rotated by the subsecond clock.
fn random_fallback_reply() -> &'static str {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    FALLBACK_REPLIES[nanos as usize % FALLBACK_REPLIES.len()]
}

/// Shared gateway state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    limiter: Arc<Mutex<RateLimiter>>,
    chain: Arc<FallbackChain>,
}

impl AppState {
    pub fn new(limiter: RateLimiter, chain: FallbackChain) -> Self {
        Self {
            limiter: Arc::new(Mutex::new(limiter)),
            chain: Arc::new(chain),
        }
    }

    /// Build state from configuration, instantiating one HTTP provider per
    /// configured model variant in declared order.
    pub fn from_config(config: &GatewayConfig) -> Result<Self> {
        config.validate()?;

        let providers: Vec<Box<dyn ReplyProvider>> = config
            .providers
            .iter()
            .map(|p| Box::new(OpenAiProvider::new(p)) as Box<dyn ReplyProvider>)
            .collect();

        Ok(Self::new(
            RateLimiter::new(config.rate_limit),
            FallbackChain::new(providers),
        ))
    }
}

/// Build the complete API router with CORS and request tracing.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/text", post(text))
        .route("/api/health", get(health))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct TextResponse {
    reply: String,
    provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<String>,
}

/// Rate-limit key for a request: the first forwarded-for hop when present,
/// else the peer address. Unauthenticated and trivially spoofable, which is
/// accepted for a courtesy limiter.
fn client_key(headers: &HeaderMap, addr: SocketAddr) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| addr.ip().to_string())
}

/// POST /api/text - answer one chat message.
async fn text(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let client = client_key(&headers, addr);
    debug!(%client, "text request received");

    if !state.limiter.lock().admit(&client) {
        warn!(%client, "rate limit exceeded");
        return (
            StatusCode::TOO_MANY_REQUESTS,
            Json(json!({ "reply": RATE_LIMIT_REPLY, "error": "rate_limit_exceeded" })),
        )
            .into_response();
    }

    let Some(message) = body.get("message").and_then(Value::as_str) else {
        return invalid_input_response();
    };

    let session_id = body
        .get("session_id")
        .and_then(Value::as_str)
        .map(str::to_string);

    let mut context = SessionContext::default();
    if let Some(prompt) = body.get("system_prompt").and_then(Value::as_str) {
        context = context.with_persona(prompt);
    }
    if let Some(language) = body.get("language").and_then(Value::as_str) {
        context = context.with_language(language);
    }

    match state.chain.reply(message, &context).await {
        Ok(reply) => {
            info!(%client, provider = %reply.provider_id, "reply sent");
            Json(TextResponse {
                reply: reply.text,
                provider: reply.provider_id,
                session_id,
            })
            .into_response()
        }
        Err(BanterError::InvalidInput(_)) => invalid_input_response(),
        Err(e) => {
            error!(%client, error = %e, "all upstream attempts failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "reply": random_fallback_reply(), "error": "internal_error" })),
            )
                .into_response()
        }
    }
}

fn invalid_input_response() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "reply": INVALID_INPUT_REPLY, "error": "invalid_input" })),
    )
        .into_response()
}

/// GET /api/health - service status report.
async fn health(State(state): State<AppState>) -> Json<Value> {
    let apis: Value = state
        .chain
        .provider_ids()
        .into_iter()
        .map(|id| (id, Value::Bool(true)))
        .collect::<serde_json::Map<_, _>>()
        .into();

    Json(json!({
        "status": "ok",
        "timestamp": Utc::now().to_rfc3339(),
        "apis": apis,
        "features": {
            "text_chat": true,
            "voice_chat": true,
        },
    }))
}
