// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// Key/model router
//
// Responsibilities:
// - Build the ordered (credential, model) attempt matrix for a request
// - Try each pair against the upstream chat-completion endpoint
// - Stop early on success or on a request-shape error (context length)
// - Collapse exhaustion into a coarse public failure
//
// Raw upstream payloads only ever travel in `RouteFailure::details`, which is
// logged and never serialized into an HTTP response.

use axum::http::{HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use bytes::Bytes;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::classify::{classify, ErrorKind};
use crate::config::Config;
use crate::credential::{CredentialCandidate, KeySource};
use crate::message::ChatMessage;
use crate::upstream::{HttpError, HttpRequest, HttpResponse, HttpSender};
use crate::usage::{record_in_background, ActionType, UsageEntry, UsageRecorder};

// ---------------------------------------------------------------------------
// Public error codes
// ---------------------------------------------------------------------------

/// The closed set of error codes a caller can observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PublicErrorCode {
    ContextLengthExceeded,
    InsufficientQuota,
    ByokOrUpgradeRequired,
    CreditsExhausted,
    RateLimitExceeded,
    AllModelsFailed,
    PlatformBudgetExhausted,
}

impl PublicErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            PublicErrorCode::ContextLengthExceeded => "context_length_exceeded",
            PublicErrorCode::InsufficientQuota => "insufficient_quota",
            PublicErrorCode::ByokOrUpgradeRequired => "byok_or_upgrade_required",
            PublicErrorCode::CreditsExhausted => "credits_exhausted",
            PublicErrorCode::RateLimitExceeded => "rate_limit_exceeded",
            PublicErrorCode::AllModelsFailed => "ALL_MODELS_FAILED",
            PublicErrorCode::PlatformBudgetExhausted => "platform_budget_exhausted",
        }
    }

    pub fn status(self) -> StatusCode {
        match self {
            PublicErrorCode::ContextLengthExceeded => StatusCode::BAD_REQUEST,
            PublicErrorCode::InsufficientQuota | PublicErrorCode::CreditsExhausted => {
                StatusCode::FORBIDDEN
            }
            PublicErrorCode::RateLimitExceeded => StatusCode::TOO_MANY_REQUESTS,
            PublicErrorCode::ByokOrUpgradeRequired
            | PublicErrorCode::AllModelsFailed
            | PublicErrorCode::PlatformBudgetExhausted => StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    fn default_message(self) -> &'static str {
        match self {
            PublicErrorCode::ContextLengthExceeded => {
                "The conversation is too long. Start a new quiz or shorten the note."
            }
            PublicErrorCode::InsufficientQuota => "The AI provider quota has been used up.",
            PublicErrorCode::ByokOrUpgradeRequired => {
                "No AI provider key is available. Add your own key or upgrade your plan."
            }
            PublicErrorCode::CreditsExhausted => {
                "You have used all your free quizzes. Upgrade to continue."
            }
            PublicErrorCode::RateLimitExceeded => "Too many requests. Please try again shortly.",
            PublicErrorCode::AllModelsFailed => {
                "All AI models are currently unavailable. Please try again later."
            }
            PublicErrorCode::PlatformBudgetExhausted => {
                "The service has reached its usage limit. Add your own key or try again later."
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

/// What the caller's entitlement allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccessTier {
    pub can_use_premium: bool,
    /// Try premium models first when allowed.
    pub prefer_premium: bool,
}

impl Default for AccessTier {
    fn default() -> Self {
        Self {
            can_use_premium: false,
            prefer_premium: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RouteRequest {
    /// Correlates log lines for one inbound request.
    pub request_id: String,
    pub user_id: String,
    pub access: AccessTier,
    /// Ordered: platform first, then BYOK.
    pub credentials: Vec<CredentialCandidate>,
    pub messages: Vec<ChatMessage>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub stream: bool,
    pub action: ActionType,
}

#[derive(Debug)]
pub struct RouteSuccess {
    /// The upstream response; its body has not been read.
    pub response: HttpResponse,
    pub model: String,
    pub key_source: KeySource,
    pub is_premium_model: bool,
}

#[derive(Debug, Clone)]
pub struct RouteFailure {
    pub status: StatusCode,
    pub code: PublicErrorCode,
    pub message: String,
    /// Raw upstream payload of the last attempt. Server-side only.
    pub details: Option<Value>,
}

impl RouteFailure {
    pub fn new(code: PublicErrorCode) -> Self {
        Self {
            status: code.status(),
            code,
            message: code.default_message().to_string(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Option<Value>) -> Self {
        self.details = details;
        self
    }
}

impl std::fmt::Display for RouteFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.code.as_str(), self.status)
    }
}

impl IntoResponse for RouteFailure {
    fn into_response(self) -> Response {
        let body = serde_json::json!({
            "error": self.code.as_str(),
            "message": self.message,
        });
        (self.status, Json(body)).into_response()
    }
}

// ---------------------------------------------------------------------------
// Router
// ---------------------------------------------------------------------------

pub struct RouterDeps {
    pub config: Arc<Config>,
    pub http: Arc<dyn HttpSender>,
    pub usage: Arc<dyn UsageRecorder>,
}

/// Tries (credential, model) pairs until one is accepted by the upstream.
pub struct ModelRouter {
    deps: RouterDeps,
}

/// Chat-completion request body.
#[derive(Serialize)]
struct CompletionBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

/// Outcome of one (credential, model) attempt.
enum Attempt {
    Accepted(HttpResponse),
    /// Request-shape failure; no other candidate can help.
    Fatal(Value),
    Retry(Value),
}

impl ModelRouter {
    pub fn new_with(deps: RouterDeps) -> Self {
        Self { deps }
    }

    /// Models to try, in order, for the given tier.
    pub fn models_to_try(&self, access: AccessTier, has_byok: bool) -> Vec<String> {
        let models = &self.deps.config.models;
        if has_byok || (access.can_use_premium && access.prefer_premium) {
            models
                .premium
                .iter()
                .chain(models.fallback.iter())
                .cloned()
                .collect()
        } else {
            models.fallback.clone()
        }
    }

    pub async fn route(&self, req: RouteRequest) -> Result<RouteSuccess, RouteFailure> {
        if req.credentials.is_empty() {
            tracing::warn!(
                request_id = %req.request_id,
                user_id = %req.user_id,
                "no credentials available"
            );
            return Err(RouteFailure::new(PublicErrorCode::ByokOrUpgradeRequired));
        }

        let has_byok = req.credentials.iter().any(CredentialCandidate::is_byok);
        let models = self.models_to_try(req.access, has_byok);
        let mut last_error: Option<Value> = None;

        for credential in &req.credentials {
            for model in &models {
                let is_premium_model = self.deps.config.models.is_premium(model);
                if is_premium_model && !credential.is_byok() && !req.access.can_use_premium {
                    continue;
                }

                match self.attempt(&req, credential, model).await {
                    Attempt::Accepted(response) => {
                        tracing::info!(
                            request_id = %req.request_id,
                            user_id = %req.user_id,
                            model = %model,
                            key_source = credential.source.as_str(),
                            status = response.status.as_u16(),
                            premium = is_premium_model,
                            "upstream accepted request"
                        );
                        record_in_background(
                            self.deps.usage.clone(),
                            UsageEntry {
                                user_id: req.user_id.clone(),
                                model_used: format!("{}:{}", credential.source, model),
                                action_type: req.action,
                                recorded_at: chrono::Utc::now(),
                            },
                        );
                        return Ok(RouteSuccess {
                            response,
                            model: model.clone(),
                            key_source: credential.source,
                            is_premium_model,
                        });
                    }
                    Attempt::Fatal(payload) => {
                        return Err(RouteFailure::new(PublicErrorCode::ContextLengthExceeded)
                            .with_details(Some(payload)));
                    }
                    Attempt::Retry(payload) => {
                        last_error = Some(payload);
                    }
                }
            }
        }

        let code = if req.access.can_use_premium || has_byok {
            PublicErrorCode::AllModelsFailed
        } else {
            PublicErrorCode::CreditsExhausted
        };
        let failure = RouteFailure::new(code).with_details(last_error);
        tracing::warn!(
            request_id = %req.request_id,
            user_id = %req.user_id,
            code = failure.code.as_str(),
            details = %failure.details.as_ref().map(|v| v.to_string()).unwrap_or_default(),
            "all routing candidates failed"
        );
        Err(failure)
    }

    async fn attempt(
        &self,
        req: &RouteRequest,
        credential: &CredentialCandidate,
        model: &str,
    ) -> Attempt {
        let http_req = match self.build_request(req, credential, model) {
            Ok(r) => r,
            Err(reason) => {
                tracing::warn!(
                    request_id = %req.request_id,
                    model,
                    key_source = credential.source.as_str(),
                    %reason,
                    "could not build upstream request"
                );
                return Attempt::Retry(serde_json::json!({ "error": { "message": reason } }));
            }
        };

        let response = match self.deps.http.send(http_req).await {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(
                    request_id = %req.request_id,
                    model,
                    key_source = credential.source.as_str(),
                    error = %e,
                    "upstream transport error"
                );
                return Attempt::Retry(transport_payload(&e));
            }
        };

        if response.status.is_success() {
            return Attempt::Accepted(response);
        }

        let status = response.status;
        let payload = match response.into_bytes().await {
            Ok(body) => parse_error_body(&body),
            Err(e) => transport_payload(&e),
        };
        let kind = classify(&payload);

        tracing::warn!(
            request_id = %req.request_id,
            model,
            key_source = credential.source.as_str(),
            status = status.as_u16(),
            kind = kind.map(ErrorKind::as_str).unwrap_or("unclassified"),
            "upstream rejected request"
        );

        match kind {
            Some(kind) if !kind.is_retryable() => Attempt::Fatal(payload),
            _ => Attempt::Retry(payload),
        }
    }

    fn build_request(
        &self,
        req: &RouteRequest,
        credential: &CredentialCandidate,
        model: &str,
    ) -> Result<HttpRequest, String> {
        let upstream = &self.deps.config.upstream;
        let generation = &self.deps.config.generation;

        let body = CompletionBody {
            model,
            messages: &req.messages,
            temperature: req.temperature.unwrap_or(generation.temperature),
            stream: req.stream,
            max_tokens: req.max_tokens.or(generation.max_tokens),
        };
        let body = serde_json::to_vec(&body).map_err(|e| e.to_string())?;

        let mut headers = HeaderMap::new();
        let auth = HeaderValue::from_str(&format!("Bearer {}", credential.secret()))
            .map_err(|_| "credential is not a valid header value".to_string())?;
        headers.insert(axum::http::header::AUTHORIZATION, auth);
        headers.insert(
            axum::http::header::CONTENT_TYPE,
            HeaderValue::from_static("application/json"),
        );
        if let Ok(referer) = HeaderValue::from_str(&upstream.referer) {
            headers.insert("http-referer", referer);
        }
        if let Ok(title) = HeaderValue::from_str(&upstream.title) {
            headers.insert("x-title", title);
        }

        Ok(HttpRequest {
            method: Method::POST,
            url: format!("{}/chat/completions", upstream.base_url.trim_end_matches('/')),
            headers,
            body: Bytes::from(body),
            stream: req.stream,
        })
    }
}

/// Parse an error body as JSON; non-JSON bodies are wrapped as `{"raw": text}`.
fn parse_error_body(body: &[u8]) -> Value {
    serde_json::from_slice(body).unwrap_or_else(|_| {
        serde_json::json!({ "raw": String::from_utf8_lossy(body) })
    })
}

fn transport_payload(e: &HttpError) -> Value {
    serde_json::json!({ "error": { "message": e.to_string(), "type": "transport" } })
}
