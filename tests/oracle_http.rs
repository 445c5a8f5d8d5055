//! OpenAI-compatible oracle against a local mock endpoint.
//!
//! Proves the retry contract: transient statuses are retried with backoff,
//! client errors fail on the first attempt.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use commute_truth::config::OracleConfig;
use commute_truth::oracle::{OpenAiOracle, Oracle};

#[derive(Clone)]
struct MockState {
    hits: Arc<AtomicUsize>,
    /// Status returned for the first `failures` calls.
    failure_status: StatusCode,
    failures: usize,
}

async fn chat_completions(
    State(state): State<MockState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> impl IntoResponse {
    let n = state.hits.fetch_add(1, Ordering::SeqCst);
    if n < state.failures {
        return (state.failure_status, Json(json!({ "error": "try later" })));
    }

    let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");
    let content = format!(
        "auth={} model={} max_tokens={}",
        auth, body["model"], body["max_tokens"]
    );
    (
        StatusCode::OK,
        Json(json!({ "choices": [{ "message": { "role": "assistant", "content": content } }] })),
    )
}

fn find_free_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}

async fn wait_for_server(port: u16) {
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/health", port);
    for _ in 0..50 {
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        if let Ok(resp) = client.get(&url).send().await {
            if resp.status().is_success() {
                return;
            }
        }
    }
    panic!("Mock server did not become ready within 5 seconds");
}

async fn start_mock(
    failure_status: StatusCode,
    failures: usize,
) -> (u16, Arc<AtomicUsize>, tokio::task::JoinHandle<()>) {
    let hits = Arc::new(AtomicUsize::new(0));
    let app = Router::new()
        .route("/v1/chat/completions", post(chat_completions))
        .route("/health", get(|| async { "ok" }))
        .with_state(MockState {
            hits: hits.clone(),
            failure_status,
            failures,
        });

    let port = find_free_port();
    let handle = tokio::spawn(async move {
        let listener = tokio::net::TcpListener::bind(("127.0.0.1", port))
            .await
            .unwrap();
        axum::serve(listener, app).await.ok();
    });
    wait_for_server(port).await;
    (port, hits, handle)
}

fn oracle_config(port: u16, max_retries: u32) -> OracleConfig {
    OracleConfig {
        provider: "openai".to_string(),
        model: Some("granite-test".to_string()),
        base_url: Some(format!("http://127.0.0.1:{}/v1", port)),
        max_new_tokens: 900,
        max_retries,
        timeout_secs: 5,
        ..OracleConfig::default()
    }
}

#[tokio::test]
async fn server_errors_are_retried() {
    let (port, hits, server) = start_mock(StatusCode::SERVICE_UNAVAILABLE, 1).await;
    let oracle = OpenAiOracle::with_api_key(&oracle_config(port, 2), "test-key".to_string()).unwrap();

    let text = oracle.complete("Bacoor to MOA").await.unwrap();

    assert_eq!(
        text,
        "auth=Bearer test-key model=\"granite-test\" max_tokens=900"
    );
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    server.abort();
}

#[tokio::test]
async fn client_errors_fail_immediately() {
    let (port, hits, server) = start_mock(StatusCode::UNAUTHORIZED, usize::MAX).await;
    let oracle = OpenAiOracle::with_api_key(&oracle_config(port, 3), "bad-key".to_string()).unwrap();

    let err = oracle.complete("Bacoor to MOA").await.unwrap_err();

    assert!(err.to_string().contains("401"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    server.abort();
}

#[tokio::test]
async fn retries_are_bounded() {
    let (port, hits, server) = start_mock(StatusCode::TOO_MANY_REQUESTS, usize::MAX).await;
    let oracle = OpenAiOracle::with_api_key(&oracle_config(port, 1), "k".to_string()).unwrap();

    let err = oracle.complete("x").await.unwrap_err();

    assert!(err.to_string().contains("429"));
    assert_eq!(hits.load(Ordering::SeqCst), 2);
    server.abort();
}
