//! HTTP route tests driven through the router with `tower::ServiceExt::oneshot`

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use http_body_util::BodyExt;
use serde_json::{Value, json};
use tower::ServiceExt;

use quorum::{AppState, BackendRegistry, TaskOrchestrator, router};
use quorum_config::{Config, ServerConfig};
use quorum_engine::NamedCompleter;
use quorum_engine::test_support::{CoordinatorScript, MockCompleter};
use quorum_llm::Completer;
use quorum_memory::InMemoryStore;

const KEY: &str = "test-key";

fn named(mock: MockCompleter) -> NamedCompleter {
    let name = mock.name().to_string();
    let completer: Arc<dyn Completer> = Arc::new(mock);
    NamedCompleter::new(name, completer, Duration::from_secs(2))
}

fn app_with(script: CoordinatorScript, api_key: Option<&str>) -> Router {
    let registry = BackendRegistry::new(
        named(script.into_completer("coordinator")),
        vec![
            named(MockCompleter::replying("claude", "```rust\nfn main() {}\n```")),
            named(MockCompleter::replying("liquid", "liquid says hi")),
        ],
        Vec::new(),
    );
    let orchestrator = TaskOrchestrator::new(
        Arc::new(registry),
        Arc::new(InMemoryStore::new()),
        Config::minimal_for_testing().orchestrator,
    );
    let server = ServerConfig {
        direct_models: BTreeMap::from([("liquid-direct".to_string(), "liquid".to_string())]),
        ..ServerConfig::default()
    };
    router(AppState::new(orchestrator, server, api_key.map(str::to_string)))
}

fn app() -> Router {
    app_with(CoordinatorScript::simple_question(), Some(KEY))
}

fn chat(body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, format!("Bearer {KEY}"))
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

#[tokio::test]
async fn health_needs_no_key() {
    let response = app()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["status"], "ok");
}

#[tokio::test]
async fn wrong_or_missing_key_is_unauthorized() {
    let request = Request::builder()
        .method("POST")
        .uri("/chat/completions")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer nope")
        .body(Body::from(json!({"messages": []}).to_string()))
        .unwrap();
    let response = app().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"]["type"], "authentication_error");

    let response = app()
        .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn unset_key_accepts_every_request() {
    let app = app_with(CoordinatorScript::simple_question(), None);
    let response = app
        .oneshot(Request::get("/v1/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn models_lists_agent_and_direct_models() {
    let request = Request::get("/v1/models")
        .header(header::AUTHORIZATION, format!("Bearer {KEY}"))
        .body(Body::empty())
        .unwrap();
    let body = body_json(app().oneshot(request).await.unwrap()).await;
    let ids: Vec<&str> = body["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["agent-system", "liquid-direct"]);
}

#[tokio::test]
async fn unknown_model_is_not_found() {
    let response = app()
        .oneshot(chat(&json!({
            "model": "gpt-17",
            "messages": [{"role": "user", "content": "hi"}]
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["type"], "model_not_found");
}

#[tokio::test]
async fn missing_messages_is_unprocessable() {
    let response = app()
        .oneshot(chat(&json!({"model": "agent-system"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body_json(response).await["error"]["type"], "invalid_request_error");
}

#[tokio::test]
async fn agent_model_returns_concatenated_completion() {
    let response = app()
        .oneshot(chat(&json!({
            "model": "agent-system",
            "messages": [{"role": "user", "content": [
                {"type": "text", "text": "what is the capital"},
                {"type": "text", "text": "of France"}
            ]}]
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["object"], "chat.completion");
    assert_eq!(body["model"], "agent-system");
    let content = body["choices"][0]["message"]["content"].as_str().unwrap();
    assert!(content.starts_with("🤖 Coordinator Analysis:\nSIMPLE_QUESTION"));
    assert!(content.ends_with("🤖 Answer:\nParis\n\n"));
    assert_eq!(body["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn agent_model_streams_frames_then_done() {
    let app = app_with(CoordinatorScript::default(), Some(KEY));
    let response = app
        .oneshot(chat(&json!({
            "model": "agent-system",
            "stream": true,
            "messages": [{"role": "user", "content": "implement hello world"}]
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let text = body_text(response).await;
    assert!(text.ends_with("data: [DONE]\n\n"));

    let chunks: Vec<Value> = text
        .split("\n\n")
        .filter_map(|event| event.strip_prefix("data: "))
        .filter(|data| *data != "[DONE]")
        .map(|data| serde_json::from_str(data).unwrap())
        .collect();
    let stages: Vec<&str> = chunks.iter().map(|c| c["stage"].as_str().unwrap()).collect();
    assert_eq!(stages, ["analysis", "solution", "solution", "review", "done"]);
    let sequences: Vec<u64> = chunks.iter().map(|c| c["sequence"].as_u64().unwrap()).collect();
    assert_eq!(sequences, [0, 1, 2, 3, 4]);
    assert!(chunks.iter().all(|c| c["object"] == "chat.completion.chunk"));
    assert_eq!(chunks[4]["choices"][0]["finish_reason"], "stop");
}

#[tokio::test]
async fn direct_model_bypasses_orchestration() {
    let response = app()
        .oneshot(chat(&json!({
            "model": "liquid-direct",
            "messages": [{"role": "user", "content": "hello"}]
        })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["model"], "liquid-direct");
    assert_eq!(body["choices"][0]["message"]["content"], "liquid says hi");
}
