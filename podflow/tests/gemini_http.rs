//! Mock HTTP server tests for `GeminiBackend::complete()`.
//!
//! Uses [`wiremock`] to emulate the `generateContent` endpoint, exercising
//! the full request/response path without hitting the real API.
//!
//! Coverage:
//! - Text response
//! - Function-call round trip through a delegate
//! - Unknown tool name
//! - 429 and 503 mapped to transient failures
//! - 400 carries its status code
//! - Malformed JSON and unreachable server mapped to fatal failures
//! - Grounded search and function declarations in the request body
//! - Tool round limit

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use podflow::backend::{CompletionRequest, GeminiBackend, GeminiConfig, Invocable, ModelBackend};
use podflow::core::ModelTier;
use podflow::errors::BackendError;
use podflow::extract::ResultExtractor;

const MODEL: &str = "test-model";
const ENDPOINT: &str = "/v1beta/models/test-model:generateContent";

fn backend(server: &MockServer) -> GeminiBackend {
    GeminiBackend::new(GeminiConfig::new("mock-key").with_base_url(server.uri()))
}

fn request(instruction: &str) -> CompletionRequest {
    CompletionRequest::new("summarize", MODEL, ModelTier::Lite, instruction)
}

fn text_body(text: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP"
        }]
    })
}

fn call_body(tool: &str, request: &str) -> serde_json::Value {
    json!({
        "candidates": [{
            "content": {
                "role": "model",
                "parts": [{ "functionCall": { "name": tool, "args": { "request": request } } }]
            }
        }]
    })
}

/// Delegate recording the requests it receives.
#[derive(Debug, Default)]
struct RecordingTool {
    requests: Mutex<Vec<String>>,
}

#[async_trait]
impl Invocable for RecordingTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Drafts search queries"
    }

    async fn invoke(&self, request: &str) -> Result<String, BackendError> {
        self.requests.lock().push(request.to_string());
        Ok("remote work hybrid share 2020".to_string())
    }
}

#[derive(Debug)]
struct FailingTool;

#[async_trait]
impl Invocable for FailingTool {
    fn name(&self) -> &str {
        "search"
    }

    fn description(&self) -> &str {
        "Always fails"
    }

    async fn invoke(&self, _request: &str) -> Result<String, BackendError> {
        Err(BackendError::transient(503, "search unavailable"))
    }
}

// ── Successful completion ──────────────────────────────────────────────

#[tokio::test]
async fn complete_text_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(header("x-goog-api-key", "mock-key"))
        .and(body_string_contains("Summarize this"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_body("| Core Themes |")))
        .expect(1)
        .mount(&server)
        .await;

    let response = backend(&server).complete(&request("Summarize this")).await.unwrap();

    assert_eq!(response.len(), 1);
    assert_eq!(response.elements()[0].author.as_deref(), Some("summarize"));
    assert_eq!(ResultExtractor::extract(&response), "| Core Themes |");
}

#[tokio::test]
async fn complete_function_call_round_trip() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(body_string_contains("functionResponse"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_body("| claim | ✅ | 0.9 |")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(body_string_contains("functionDeclarations"))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_body("search", "hybrid share")))
        .expect(1)
        .mount(&server)
        .await;

    let tool = Arc::new(RecordingTool::default());
    let req = CompletionRequest::new("fact_check", MODEL, ModelTier::Pro, "Verify claims")
        .with_delegates(vec![tool.clone()]);

    let response = backend(&server).complete(&req).await.unwrap();

    assert_eq!(tool.requests.lock().clone(), vec!["hybrid share"]);
    assert_eq!(response.len(), 3);
    let call = response.elements()[0].function_calls().next().unwrap();
    assert_eq!(call.name, "search");

    let reply = response.elements()[1].content.as_ref().unwrap();
    assert_eq!(reply.role, "user");
    let result = reply.parts[0].function_response.as_ref().unwrap();
    assert_eq!(result.response["result"], "remote work hybrid share 2020");

    assert_eq!(ResultExtractor::extract(&response), "| claim | ✅ | 0.9 |");
}

#[tokio::test]
async fn complete_unknown_tool_gets_error_response() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(body_string_contains("unknown tool"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_body("done")))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_body("wikipedia", "x")))
        .expect(1)
        .mount(&server)
        .await;

    let response = backend(&server).complete(&request("go")).await.unwrap();
    assert_eq!(ResultExtractor::extract(&response), "done");
}

#[tokio::test]
async fn complete_delegate_failure_propagates() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_body("search", "q")))
        .expect(1)
        .mount(&server)
        .await;

    let req = request("go").with_delegates(vec![Arc::new(FailingTool)]);
    let err = backend(&server).complete(&req).await.unwrap_err();
    assert_eq!(err.status_code(), Some(503));
}

#[tokio::test]
async fn complete_stops_at_tool_round_limit() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(call_body("search", "again")))
        .expect(3)
        .mount(&server)
        .await;

    let tool = Arc::new(RecordingTool::default());
    let backend = GeminiBackend::new(
        GeminiConfig::new("mock-key")
            .with_base_url(server.uri())
            .with_max_tool_rounds(2),
    );
    let response = backend
        .complete(&request("go").with_delegates(vec![tool.clone()]))
        .await
        .unwrap();

    assert_eq!(tool.requests.lock().len(), 2);
    assert_eq!(ResultExtractor::extract(&response), "");
}

// ── Request body ───────────────────────────────────────────────────────

#[tokio::test]
async fn grounded_search_is_declared() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .and(body_string_contains("googleSearch"))
        .respond_with(ResponseTemplate::new(200).set_body_json(text_body("query")))
        .expect(1)
        .mount(&server)
        .await;

    let response = backend(&server)
        .complete(&request("search").with_grounded_search(true))
        .await
        .unwrap();
    assert_eq!(ResultExtractor::extract(&response), "query");
}

#[tokio::test]
async fn empty_candidates_yield_empty_sequence() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "candidates": [] })))
        .mount(&server)
        .await;

    let response = backend(&server).complete(&request("x")).await.unwrap();
    assert!(response.is_empty());
}

// ── Error mapping ──────────────────────────────────────────────────────

async fn status_error(status: u16) -> BackendError {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(status).set_body_string("upstream says no"))
        .expect(1)
        .mount(&server)
        .await;

    backend(&server).complete(&request("x")).await.unwrap_err()
}

#[tokio::test]
async fn rate_limit_is_transient() {
    let err = status_error(429).await;
    assert!(matches!(err, BackendError::Transient { status_code: 429, .. }));
}

#[tokio::test]
async fn unavailable_is_transient() {
    let err = status_error(503).await;
    assert_eq!(err.status_code(), Some(503));
    assert!(err.to_string().contains("upstream says no"));
}

#[tokio::test]
async fn bad_request_keeps_status() {
    let err = status_error(400).await;
    assert_eq!(err.status_code(), Some(400));
}

#[tokio::test]
async fn malformed_json_is_fatal() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path(ENDPOINT))
        .respond_with(ResponseTemplate::new(200).set_body_string("not json at all"))
        .mount(&server)
        .await;

    let err = backend(&server).complete(&request("x")).await.unwrap_err();
    assert!(matches!(err, BackendError::Fatal { .. }));
}

#[tokio::test]
async fn unreachable_server_is_fatal() {
    let backend = GeminiBackend::new(GeminiConfig::new("k").with_base_url("http://127.0.0.1:1"));
    let err = backend.complete(&request("x")).await.unwrap_err();
    assert!(matches!(err, BackendError::Fatal { .. }));
    assert_eq!(err.status_code(), None);
}
