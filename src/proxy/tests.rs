// Copyright 2026 The Quizgate Project
// SPDX-License-Identifier: Apache-2.0

// HTTP surface tests: in-process requests through `build_router` with a
// scripted upstream.

use super::*;
use crate::config::{ModelCatalog, UpstreamConfig};
use crate::credits::Account;
use crate::upstream::{HttpBody, HttpError, HttpRequest, HttpResponse};
use crate::usage::InMemoryUsageLog;
use axum::http::Request;
use serde_json::Value;
use std::sync::Mutex;
use tower::ServiceExt; // for oneshot

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// Returns a fixed status and body for every request and records requests.
struct FixedSender {
    status: StatusCode,
    body: String,
    sent: Mutex<Vec<HttpRequest>>,
}

impl FixedSender {
    fn new(status: StatusCode, body: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            status,
            body: body.into(),
            sent: Mutex::new(Vec::new()),
        })
    }

    fn sse(deltas: &[&str]) -> Arc<Self> {
        let mut body = String::new();
        for d in deltas {
            let frame = serde_json::json!({"choices": [{"delta": {"content": d}}]});
            body.push_str(&format!("data: {frame}\n\n"));
        }
        body.push_str("data: [DONE]\n\n");
        Self::new(StatusCode::OK, body)
    }

    fn requests(&self) -> Vec<HttpRequest> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl HttpSender for FixedSender {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        self.sent.lock().unwrap().push(request);
        Ok(HttpResponse {
            status: self.status,
            headers: HeaderMap::new(),
            body: HttpBody::Full(Bytes::from(self.body.clone())),
        })
    }
}

struct Harness {
    app: Router,
    http: Arc<FixedSender>,
    credits: Arc<InMemoryCreditPolicy>,
    byok_keys: Arc<InMemoryByokKeyStore>,
    vault: Arc<KeyVault>,
    sessions: Arc<InMemorySessionStore>,
}

fn test_config(platform_key: Option<&str>, platform_budget: Option<u64>) -> Arc<Config> {
    let mut config = Config {
        upstream: UpstreamConfig {
            platform_key: platform_key.map(str::to_string),
            ..UpstreamConfig::default()
        },
        models: ModelCatalog {
            premium: vec!["premium/a".to_string()],
            fallback: vec!["free/b".to_string()],
        },
        ..Config::default()
    };
    config.credits.free_quizzes = 2;
    config.credits.platform_budget = platform_budget;
    Arc::new(config)
}

fn harness_with(config: Arc<Config>, http: Arc<FixedSender>) -> Harness {
    let credits = Arc::new(InMemoryCreditPolicy::new(&config.credits));
    let byok_keys = Arc::new(InMemoryByokKeyStore::new());
    let vault = Arc::new(KeyVault::new(&[7u8; 32]));
    let sessions = Arc::new(InMemorySessionStore::new(config.sessions.ttl));

    let state = AppState {
        router: Arc::new(ModelRouter::new_with(RouterDeps {
            config: config.clone(),
            http: http.clone(),
            usage: Arc::new(InMemoryUsageLog::new()),
        })),
        credits: credits.clone(),
        byok_keys: byok_keys.clone(),
        vault: Some(vault.clone()),
        sessions: sessions.clone(),
        config,
    };

    Harness {
        app: build_router(state),
        http,
        credits,
        byok_keys,
        vault,
        sessions,
    }
}

fn harness(http: Arc<FixedSender>) -> Harness {
    harness_with(test_config(Some("sk-or-platform"), None), http)
}

fn chat_request(user: Option<&str>, body: &str) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/v1/quiz/chat")
        .header("content-type", "application/json");
    if let Some(user) = user {
        builder = builder.header(USER_ID_HEADER, user);
    }
    builder.body(Body::from(body.to_owned())).unwrap()
}

fn first_turn_body(session: &str) -> String {
    serde_json::json!({
        "session_id": session,
        "note": {"title": "Photosynthesis", "content": "Plants turn light into sugar."},
        "messages": [{"role": "user", "content": "Start the quiz"}],
        "action": "quiz_start"
    })
    .to_string()
}

fn later_turn_body(session: &str) -> String {
    serde_json::json!({
        "session_id": session,
        "messages": [
            {"role": "user", "content": "Start the quiz"},
            {"role": "assistant", "content": "What do plants make?"},
            {"role": "user", "content": "Sugar"}
        ]
    })
    .to_string()
}

async fn body_string(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_string(response).await).unwrap()
}

async fn eventually(mut check: impl FnMut() -> bool) -> bool {
    for _ in 0..100 {
        if check() {
            return true;
        }
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    }
    check()
}

const ANSWER: &[&str] = &[
    "Nice start! ",
    "What gas do plants absorb?",
    "\n<<METADATA_JSON>>",
    r#"{"analysis":"recalls the basics","weaknesses":"gas exchange","conclusion":"on track"}"#,
];

// ---------------------------------------------------------------------------
// Routing basics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn heartbeat_returns_200() {
    let h = harness(FixedSender::sse(&[]));
    let req = Request::builder().uri("/v1/heartbeat").body(Body::empty()).unwrap();
    let resp = h.app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn unknown_path_returns_404() {
    let h = harness(FixedSender::sse(&[]));
    let req = Request::builder().uri("/v1/unknown").body(Body::empty()).unwrap();
    let resp = h.app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// ---------------------------------------------------------------------------
// Request validation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn missing_user_is_unauthorized() {
    let h = harness(FixedSender::sse(&[]));
    let resp = h.app.oneshot(chat_request(None, &first_turn_body("s1"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(resp).await, serde_json::json!({"error": "unauthorized"}));
    assert!(h.http.requests().is_empty());
}

#[tokio::test]
async fn blank_user_is_unauthorized() {
    let h = harness(FixedSender::sse(&[]));
    let resp = h.app.oneshot(chat_request(Some("  "), &first_turn_body("s1"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_body_returns_400() {
    let h = harness(FixedSender::sse(&[]));
    let resp = h.app.oneshot(chat_request(Some("u1"), "")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn invalid_json_returns_400() {
    let h = harness(FixedSender::sse(&[]));
    let resp = h.app.oneshot(chat_request(Some("u1"), "{not json")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "invalid_request");
}

#[tokio::test]
async fn empty_messages_returns_400() {
    let h = harness(FixedSender::sse(&[]));
    let body = r#"{"session_id":"s1","messages":[]}"#;
    let resp = h.app.oneshot(chat_request(Some("u1"), body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert!(h.http.requests().is_empty());
}

#[tokio::test]
async fn unknown_action_returns_400() {
    let h = harness(FixedSender::sse(&[]));
    let body = r#"{"session_id":"s1","messages":[{"role":"user","content":"hi"}],"action":"dance"}"#;
    let resp = h.app.oneshot(chat_request(Some("u1"), body)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// ---------------------------------------------------------------------------
// Pre-flight
// ---------------------------------------------------------------------------

#[tokio::test]
async fn exhausted_credits_stop_before_routing() {
    let h = harness(FixedSender::sse(ANSWER));
    h.credits.set_account(
        "u1",
        Account { subscribed: false, balance: 0, free_remaining: 0 },
    );

    let resp = h.app.oneshot(chat_request(Some("u1"), &first_turn_body("s1"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    assert_eq!(body_json(resp).await["error"], "credits_exhausted");
    assert!(h.http.requests().is_empty());
}

#[tokio::test]
async fn exhausted_platform_budget_returns_503() {
    let h = harness_with(test_config(Some("sk-or-platform"), Some(0)), FixedSender::sse(ANSWER));
    let resp = h.app.oneshot(chat_request(Some("u1"), &first_turn_body("s1"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["error"], "platform_budget_exhausted");
    assert!(h.http.requests().is_empty());
}

#[tokio::test]
async fn no_usable_credential_returns_byok_or_upgrade_required() {
    let h = harness_with(test_config(Some("changeme"), None), FixedSender::sse(ANSWER));
    let resp = h.app.oneshot(chat_request(Some("u1"), &first_turn_body("s1"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["error"], "byok_or_upgrade_required");
    assert!(h.http.requests().is_empty());
}

// ---------------------------------------------------------------------------
// Streaming success
// ---------------------------------------------------------------------------

#[tokio::test]
async fn successful_stream_has_sse_headers_and_shape() {
    let h = harness(FixedSender::sse(ANSWER));
    let resp = h.app.oneshot(chat_request(Some("u1"), &first_turn_body("s1"))).await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["content-type"], "text/event-stream");
    assert_eq!(resp.headers()["cache-control"], "no-cache");
    assert_eq!(resp.headers()["x-model-used"], "free/b");
    assert_eq!(resp.headers()["x-key-source"], "platform");

    let body = body_string(resp).await;
    assert!(body.ends_with("data: [DONE]\n\n"));
    assert!(body.contains("Nice start!"));
    assert!(body.contains(
        r#"{"type":"metadata","data":{"weaknesses":"gas exchange","conclusion":"on track"}}"#
    ));
    assert!(!body.contains("recalls the basics"));
    assert!(!body.contains("<<METADATA_JSON>>"));
    assert_eq!(body.matches("\"type\":\"metadata\"").count(), 1);
}

#[tokio::test]
async fn upstream_receives_quiz_system_prompt() {
    let h = harness(FixedSender::sse(ANSWER));
    let resp = h.app.oneshot(chat_request(Some("u1"), &first_turn_body("s1"))).await.unwrap();
    body_string(resp).await;

    let sent = h.http.requests();
    assert_eq!(sent.len(), 1);
    let body: Value = serde_json::from_slice(&sent[0].body).unwrap();
    assert_eq!(body["messages"][0]["role"], "system");
    let system = body["messages"][0]["content"].as_str().unwrap();
    assert!(system.contains("Photosynthesis"));
    assert!(system.contains("<<METADATA_JSON>>"));
    assert_eq!(body["messages"][1]["content"], "Start the quiz");
    assert_eq!(body["stream"], true);
}

#[tokio::test]
async fn analysis_lands_in_session_and_feeds_next_turn() {
    let h = harness(FixedSender::sse(ANSWER));
    let resp = h
        .app
        .clone()
        .oneshot(chat_request(Some("u1"), &first_turn_body("s1")))
        .await
        .unwrap();
    body_string(resp).await;

    let sessions = h.sessions.clone();
    assert!(eventually(|| sessions.get("s1").is_some()).await);
    let session = h.sessions.get("s1").unwrap();
    assert_eq!(session.user_id, "u1");
    assert_eq!(session.analysis, "recalls the basics");

    let resp = h.app.oneshot(chat_request(Some("u1"), &later_turn_body("s1"))).await.unwrap();
    body_string(resp).await;
    let sent = h.http.requests();
    let body: Value = serde_json::from_slice(&sent[1].body).unwrap();
    assert!(body["messages"][0]["content"]
        .as_str()
        .unwrap()
        .contains("recalls the basics"));
}

#[tokio::test]
async fn another_users_session_analysis_is_not_used() {
    let h = harness(FixedSender::sse(ANSWER));
    let mut foreign = crate::session::QuizSession::new("s1", "owner");
    foreign.analysis = "owner secret notes".to_string();
    h.sessions.update(foreign);

    let resp = h.app.oneshot(chat_request(Some("u1"), &later_turn_body("s1"))).await.unwrap();
    body_string(resp).await;

    let body: Value = serde_json::from_slice(&h.http.requests()[0].body).unwrap();
    assert!(!body["messages"][0]["content"]
        .as_str()
        .unwrap()
        .contains("owner secret notes"));
}

// ---------------------------------------------------------------------------
// Consumption
// ---------------------------------------------------------------------------

#[tokio::test]
async fn first_turn_consumes_exactly_one_credit() {
    let h = harness(FixedSender::sse(ANSWER));

    let resp = h
        .app
        .clone()
        .oneshot(chat_request(Some("u1"), &first_turn_body("s1")))
        .await
        .unwrap();
    body_string(resp).await;
    let credits = h.credits.clone();
    assert!(eventually(|| credits.account("u1").free_remaining == 1).await);

    let resp = h.app.oneshot(chat_request(Some("u1"), &later_turn_body("s1"))).await.unwrap();
    body_string(resp).await;
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    assert_eq!(h.credits.account("u1").free_remaining, 1);
}

#[tokio::test]
async fn byok_success_does_not_consume() {
    let h = harness_with(test_config(None, None), FixedSender::sse(ANSWER));
    h.byok_keys.insert("u1", h.vault.seal("sk-user-own").unwrap());

    let resp = h.app.oneshot(chat_request(Some("u1"), &first_turn_body("s1"))).await.unwrap();
    assert_eq!(resp.headers()["x-key-source"], "byok");
    // BYOK callers get premium models first.
    assert_eq!(resp.headers()["x-model-used"], "premium/a");
    body_string(resp).await;

    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    assert_eq!(h.credits.account("u1").free_remaining, 2);
    assert_eq!(h.http.requests()[0].headers["authorization"], "Bearer sk-user-own");
}

#[tokio::test]
async fn byok_caller_without_credits_never_reaches_platform_key() {
    let h = harness(FixedSender::sse(ANSWER));
    h.credits.set_account(
        "u1",
        Account { subscribed: false, balance: 0, free_remaining: 0 },
    );
    h.byok_keys.insert("u1", h.vault.seal("sk-user-own").unwrap());

    let resp = h.app.oneshot(chat_request(Some("u1"), &first_turn_body("s1"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.headers()["x-key-source"], "byok");
    body_string(resp).await;

    let sent = h.http.requests();
    assert!(!sent.is_empty());
    assert!(sent.iter().all(|r| r.headers["authorization"] == "Bearer sk-user-own"));
}

#[tokio::test]
async fn spent_platform_budget_leaves_failing_byok_key_alone() {
    let h = harness_with(
        test_config(Some("sk-or-platform"), Some(0)),
        FixedSender::new(StatusCode::UNAUTHORIZED, r#"{"error":{"message":"invalid key"}}"#),
    );
    h.byok_keys.insert("u1", h.vault.seal("sk-garbage").unwrap());

    let resp = h.app.oneshot(chat_request(Some("u1"), &first_turn_body("s1"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body_json(resp).await["error"], "ALL_MODELS_FAILED");

    let sent = h.http.requests();
    assert_eq!(sent.len(), 2, "premium then fallback on the caller's key only");
    assert!(sent.iter().all(|r| r.headers["authorization"] == "Bearer sk-garbage"));
}

// ---------------------------------------------------------------------------
// Routing failure
// ---------------------------------------------------------------------------

#[tokio::test]
async fn routing_failure_is_json_without_details() {
    let upstream_error = r#"{"error":{"message":"Rate limit exceeded for key sk-or-platform","code":429}}"#;
    let h = harness(FixedSender::new(StatusCode::TOO_MANY_REQUESTS, upstream_error));

    let resp = h.app.oneshot(chat_request(Some("u1"), &first_turn_body("s1"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let body = body_json(resp).await;
    assert_eq!(body["error"], "credits_exhausted");
    assert!(body.get("details").is_none());
    assert!(!body.to_string().contains("sk-or-platform"));

    // Nothing succeeded, so nothing was consumed.
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    assert_eq!(h.credits.account("u1").free_remaining, 2);
}

#[tokio::test]
async fn context_length_failure_returns_400() {
    let upstream_error = r#"{"error":{"message":"maximum context length exceeded"}}"#;
    let h = harness(FixedSender::new(StatusCode::BAD_REQUEST, upstream_error));
    let resp = h.app.oneshot(chat_request(Some("u1"), &first_turn_body("s1"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(resp).await["error"], "context_length_exceeded");
}
