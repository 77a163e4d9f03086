// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// HTTP surface
//
// Responsibilities:
// - Heartbeat endpoint
// - POST /v1/quiz/chat: authenticate, pre-flight credits, assemble
//   credentials, route, stream the split response back as SSE
// - JSON error bodies for everything that fails before the stream starts
// - 404 for unknown paths

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use serde::Deserialize;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::StreamExt;
use uuid::Uuid;

use crate::config::Config;
use crate::credential::{
    byok_candidate, ordered_candidates, platform_candidate, ByokKeyStore, CredentialError,
    InMemoryByokKeyStore, KeySource, KeyVault,
};
use crate::credits::{
    consume_in_background, CreditPolicy, CreditQuery, CreditSource, InMemoryCreditPolicy,
};
use crate::message::{is_first_turn, ChatMessage};
use crate::prompt::{build_system_prompt, with_system_prompt, QuizNote};
use crate::router::{
    AccessTier, ModelRouter, PublicErrorCode, RouteFailure, RouteRequest, RouterDeps,
};
use crate::session::{owned_session, InMemorySessionStore, SessionMetadataSink, SessionStore};
use crate::stream::StreamSplitter;
use crate::upstream::HttpSender;
use crate::usage::{ActionType, TracingUsageRecorder, UsageRecorder};

/// Set by the authentication layer in front of this service.
pub const USER_ID_HEADER: &str = "x-user-id";

// ---------------------------------------------------------------------------
// Request types
// ---------------------------------------------------------------------------

/// Body of `POST /v1/quiz/chat`.
#[derive(Debug, Clone, Deserialize)]
pub struct QuizChatRequest {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub note: Option<QuizNote>,
    #[serde(default)]
    pub temperature: Option<f32>,
    #[serde(default)]
    pub max_tokens: Option<u32>,
    #[serde(default)]
    pub prefer_premium: Option<bool>,
    #[serde(default)]
    pub action: Option<String>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Request-level failures detected before any routing.
#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("missing or empty user id")]
    Unauthorized,

    #[error("request body is empty")]
    EmptyBody,

    #[error("request body is not valid JSON: {0}")]
    MalformedJson(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let (status, body) = match &self {
            ProxyError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                serde_json::json!({ "error": "unauthorized" }),
            ),
            ProxyError::EmptyBody => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "invalid_request",
                    "message": "request body is empty",
                }),
            ),
            ProxyError::MalformedJson(_) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({
                    "error": "invalid_request",
                    "message": "request body is not valid JSON",
                }),
            ),
            ProxyError::InvalidRequest(reason) => (
                StatusCode::BAD_REQUEST,
                serde_json::json!({ "error": "invalid_request", "message": reason }),
            ),
        };
        (status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Shared application state
// ---------------------------------------------------------------------------

/// Shared state injected into axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub router: Arc<ModelRouter>,
    pub credits: Arc<dyn CreditPolicy>,
    pub byok_keys: Arc<dyn ByokKeyStore>,
    pub vault: Option<Arc<KeyVault>>,
    pub sessions: Arc<dyn SessionStore>,
}

impl AppState {
    /// Wire the bundled in-memory collaborators around `http`.
    pub fn in_memory(
        config: Arc<Config>,
        http: Arc<dyn HttpSender>,
    ) -> Result<Self, CredentialError> {
        let usage: Arc<dyn UsageRecorder> = Arc::new(TracingUsageRecorder);
        let vault = config
            .byok_encryption_key
            .as_deref()
            .map(KeyVault::from_base64)
            .transpose()?
            .map(Arc::new);

        Ok(Self {
            router: Arc::new(ModelRouter::new_with(RouterDeps {
                config: config.clone(),
                http,
                usage,
            })),
            credits: Arc::new(InMemoryCreditPolicy::new(&config.credits)),
            byok_keys: Arc::new(InMemoryByokKeyStore::new()),
            vault,
            sessions: Arc::new(InMemorySessionStore::new(config.sessions.ttl)),
            config,
        })
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Heartbeat endpoint: GET /v1/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, Json(serde_json::json!({ "error": "not_found" }))).into_response()
}

fn user_id(headers: &HeaderMap) -> Result<String, ProxyError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ProxyError::Unauthorized)
}

fn parse_body(body: &Bytes) -> Result<(QuizChatRequest, ActionType), ProxyError> {
    if body.is_empty() {
        return Err(ProxyError::EmptyBody);
    }
    let request: QuizChatRequest =
        serde_json::from_slice(body).map_err(|e| ProxyError::MalformedJson(e.to_string()))?;

    if request.session_id.trim().is_empty() {
        return Err(ProxyError::InvalidRequest("session_id is required".to_string()));
    }
    if request.messages.is_empty() {
        return Err(ProxyError::InvalidRequest("messages must not be empty".to_string()));
    }
    let action = match request.action.as_deref() {
        None => ActionType::default(),
        Some(a) => ActionType::parse(a)
            .ok_or_else(|| ProxyError::InvalidRequest(format!("unknown action \"{a}\"")))?,
    };
    Ok((request, action))
}

/// `POST /v1/quiz/chat`
pub async fn quiz_chat(State(state): State<AppState>, headers: HeaderMap, body: Bytes) -> Response {
    let request_id = Uuid::new_v4().to_string();

    let user_id = match user_id(&headers) {
        Ok(u) => u,
        Err(e) => return e.into_response(),
    };
    let (request, action) = match parse_body(&body) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(
                request_id = %request_id,
                user_id = %user_id,
                error = %e,
                "rejected request"
            );
            return e.into_response();
        }
    };

    let byok = byok_candidate(state.byok_keys.as_ref(), state.vault.as_deref(), &user_id).await;

    // 1) Credit pre-flight
    let query = CreditQuery {
        user_id: user_id.clone(),
        has_byok: byok.is_some(),
    };
    let check = match state.credits.check(&query).await {
        Ok(check) => check,
        Err(e) => {
            tracing::error!(
                request_id = %request_id,
                user_id = %user_id,
                error = %e,
                "credit check failed"
            );
            return RouteFailure::new(PublicErrorCode::AllModelsFailed).into_response();
        }
    };
    if !check.has_credits {
        let code = if check.source == CreditSource::PlatformBudget {
            PublicErrorCode::PlatformBudgetExhausted
        } else {
            PublicErrorCode::CreditsExhausted
        };
        tracing::info!(
            request_id = %request_id,
            user_id = %user_id,
            code = code.as_str(),
            "pre-flight denied"
        );
        return RouteFailure::new(code).into_response();
    }

    // 2) Prompt assembly
    let session = owned_session(state.sessions.as_ref(), &request.session_id, &user_id);
    let first_turn = is_first_turn(&request.messages);
    let system = build_system_prompt(
        request.note.as_ref(),
        session.as_ref().map(|s| s.analysis.as_str()),
        action,
    );

    // 3) Routing. The platform key is only offered when the caller could pay
    // for the call without their own key.
    let platform = if check.platform_allowed {
        platform_candidate(state.config.upstream.platform_key.as_deref())
    } else {
        tracing::debug!(
            request_id = %request_id,
            user_id = %user_id,
            "platform key withheld; byok only"
        );
        None
    };
    let credentials = ordered_candidates(platform, byok);
    let route_request = RouteRequest {
        request_id: request_id.clone(),
        user_id: user_id.clone(),
        access: AccessTier {
            can_use_premium: check.can_use_premium,
            prefer_premium: request.prefer_premium.unwrap_or(true),
        },
        credentials,
        messages: with_system_prompt(system, &request.messages),
        temperature: request.temperature,
        max_tokens: request.max_tokens,
        stream: true,
        action,
    };

    let success = match state.router.route(route_request).await {
        Ok(success) => success,
        Err(failure) => return failure.into_response(),
    };

    // 4) Consumption
    if first_turn && success.key_source != KeySource::Byok {
        consume_in_background(state.credits.clone(), user_id.clone());
    }

    // 5) Stream
    let sink = SessionMetadataSink::new(state.sessions.clone(), request.session_id, user_id);
    let frames = StreamSplitter::new()
        .with_sink(Arc::new(sink))
        .split(success.response.body)
        .map(Ok::<Bytes, Infallible>);

    let mut response = Response::new(Body::from_stream(frames));
    let response_headers = response.headers_mut();
    response_headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    response_headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    response_headers.insert(header::CONNECTION, HeaderValue::from_static("keep-alive"));
    if let Ok(model) = HeaderValue::from_str(&success.model) {
        response_headers.insert("x-model-used", model);
    }
    response_headers.insert(
        "x-key-source",
        HeaderValue::from_static(success.key_source.as_str()),
    );
    response
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router with the quiz endpoint and the heartbeat.
///
/// All collaborators come in through `state`; no side effects here.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/heartbeat", get(heartbeat))
        .route("/v1/quiz/chat", post(quiz_chat))
        .fallback(not_found)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests;
