//! HTTP contract tests against a server bound to a free local port.

mod common;

use serde_json::{json, Value};
use std::sync::Arc;

use common::{engine, three_entries, KeywordEmbedder, ScriptedGenerator, Step};
use status_rag::pipeline::QueryEngine;
use status_rag::server::run_server_with_engine;

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
    panic!("Server did not become ready within 5 seconds");
}

async fn start(engine: Arc<QueryEngine>) -> (u16, tokio::task::JoinHandle<()>) {
    let port = find_free_port();
    let bind = format!("127.0.0.1:{}", port);
    let handle = tokio::spawn(async move {
        run_server_with_engine(engine, &bind).await.ok();
    });
    wait_for_server(port).await;
    (port, handle)
}

#[tokio::test]
async fn test_nl_search_answer_and_health() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Step::Answer(
        "A reports a budget shortfall [1].",
    )]));
    let (port, handle) = start(engine(
        three_entries(),
        Arc::new(KeywordEmbedder::new()),
        generator,
    ))
    .await;
    let client = reqwest::Client::new();

    // Before the first query the index has not been built.
    let health: Value = client
        .get(format!("http://127.0.0.1:{}/health", port))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["indexReady"], false);
    assert_eq!(health["corpus"], 3);
    assert!(health.get("fingerprint").is_none());

    let resp = client
        .post(format!("http://127.0.0.1:{}/api/nl-search", port))
        .json(&json!({"query": "budget shortfall"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["answer"], "A reports a budget shortfall [1].");
    assert_eq!(body["matches"][0]["project"], "A");
    assert_eq!(body["matches"][0]["sourceNumber"], 1);
    assert_eq!(body["meta"]["absenceFlag"], "NO");
    assert_eq!(body["meta"]["mentionedCount"], 1);
    assert_eq!(body["meta"]["matchesFrom"], "citations");
    assert!(body.get("debug").is_none());

    let health: Value = client
        .get(format!("http://127.0.0.1:{}/health", port))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["indexReady"], true);
    assert_eq!(health["fingerprint"].as_str().unwrap().len(), 64);
    assert!(health["builtAt"].is_string());

    handle.abort();
}

#[tokio::test]
async fn test_short_query_returns_empty_result() {
    let (port, handle) = start(engine(
        three_entries(),
        Arc::new(KeywordEmbedder::new()),
        Arc::new(ScriptedGenerator::new(vec![])),
    ))
    .await;

    let body: Value = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/api/nl-search", port))
        .json(&json!({"query": "ab"}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body, json!({"answer": "", "matches": []}));

    handle.abort();
}

#[tokio::test]
async fn test_error_statuses() {
    let generator = Arc::new(ScriptedGenerator::new(vec![
        Step::Fail("OpenAI API error 429 Too Many Requests: quota"),
        Step::Fail("OpenAI API error 401 Unauthorized: invalid_api_key"),
        Step::Panic,
    ]));
    let (port, handle) = start(engine(
        three_entries(),
        Arc::new(KeywordEmbedder::new()),
        generator,
    ))
    .await;
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/api/nl-search", port);

    let resp = client
        .post(&url)
        .json(&json!({"query": "budget shortfall"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 429);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "RATE_LIMIT");
    assert_eq!(body["error"], "Failed to generate answer");
    assert_eq!(body["diagnostics"]["attemptCount"], 1);
    assert_eq!(body["diagnostics"]["corpus"], 3);

    let resp = client
        .post(&url)
        .json(&json!({"query": "budget shortfall"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 401);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "AUTH");

    let resp = client
        .post(&url)
        .json(&json!({"query": "budget shortfall"}))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 500);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "UNCAUGHT");

    handle.abort();
}

#[tokio::test]
async fn test_malformed_body_is_invalid_request() {
    let (port, handle) = start(engine(
        three_entries(),
        Arc::new(KeywordEmbedder::new()),
        Arc::new(ScriptedGenerator::new(vec![])),
    ))
    .await;
    let client = reqwest::Client::new();
    let url = format!("http://127.0.0.1:{}/api/nl-search", port);

    let resp = client
        .post(&url)
        .header("Content-Type", "application/json")
        .body("{not json")
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: Value = resp.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_REQUEST");

    let resp = client.post(&url).json(&json!({"q": "budget"})).send().await.unwrap();
    assert_eq!(resp.status(), 400);

    handle.abort();
}

#[tokio::test]
async fn test_debug_payload_on_request() {
    let generator = Arc::new(ScriptedGenerator::new(vec![Step::Answer("B shipped v2 [2].")]));
    let (port, handle) = start(engine(
        three_entries(),
        Arc::new(KeywordEmbedder::new()),
        generator,
    ))
    .await;

    let body: Value = reqwest::Client::new()
        .post(format!("http://127.0.0.1:{}/api/nl-search", port))
        .json(&json!({"query": "shipped release", "debug": true}))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["debug"]["mentioned"], json!([2]));
    assert_eq!(body["debug"]["queryTerms"], json!(["shipped", "release"]));
    assert_eq!(body["debug"]["attempts"][0]["attemptNumber"], 1);
    assert_eq!(body["debug"]["topScores"][0]["project"], "B");

    handle.abort();
}
