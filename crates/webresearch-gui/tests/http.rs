use std::future::IntoFuture;
use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use axum::http::{HeaderValue, header};
use axum_test::TestServer;
use serde_json::{Value, json};
use tempfile::TempDir;
use tokio::sync::Notify;
use tokio::time::{Duration, sleep, timeout};
use webresearch_core::{Config, LlmClient, ResearchAgent};
use webresearch_gui::config::AppConfig;
use webresearch_gui::routes::build_router;
use webresearch_gui::state::AppState;

/// Writes a fixed report; optionally blocks until the gate is opened.
#[derive(Default)]
struct FakeLlm {
    gate: Option<Arc<Notify>>,
}

#[async_trait]
impl LlmClient for FakeLlm {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        if let Some(gate) = &self.gate {
            gate.notified().await;
        }
        let sources = prompt.matches("\nURL: ").count();
        Ok(format!(
            "## Overview\nSynthesized from {sources} sources [1].\n\n## Details\nMore detail [2]."
        ))
    }

    fn model(&self) -> &str {
        "fake"
    }
}

fn base_config() -> AppConfig {
    AppConfig {
        listen_addr: "127.0.0.1:0".into(),
        max_concurrency: 2,
        assets_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("web/dist"),
        auth_token: None,
        otel_endpoint: None,
        research_config: None,
    }
}

fn research_config(cache_dir: &TempDir) -> Config {
    let mut config = Config::default();
    config.cache.dir = cache_dir.path().to_path_buf();
    config.search.api_key_env = "WEBRESEARCH_GUI_TEST_SEARCH_KEY_UNSET".into();
    config.search.min_delay_ms = 0;
    config.search.jitter_min_ms = 0;
    config.search.jitter_max_ms = 0;
    config
}

fn test_server(config: &AppConfig, cache_dir: &TempDir, llm: FakeLlm) -> TestServer {
    let agent = ResearchAgent::with_llm(research_config(cache_dir), Arc::new(llm))
        .expect("agent construction failed");
    let state = AppState::with_agent(config, Arc::new(agent));
    TestServer::new(build_router(state)).unwrap()
}

async fn wait_for_run(server: &TestServer, run_id: &str) -> Value {
    let status_path = format!("/api/research/{run_id}");
    timeout(Duration::from_secs(5), async {
        loop {
            let response = server.get(&status_path).await;
            assert_eq!(response.status_code(), 200);
            let payload = response.json::<Value>();
            if payload["state"] != "running" {
                return payload;
            }
            sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("run did not finish in time")
}

async fn start_run(server: &TestServer, query: &str) -> String {
    let response = server
        .post("/api/research")
        .json(&json!({ "query": query }))
        .await;
    assert_eq!(response.status_code(), 202);
    let body = response.json::<Value>();
    assert_eq!(body["state"], "running");
    assert!(body["capacity"]["max_concurrency"].is_number());
    body["run_id"]
        .as_str()
        .expect("run id missing")
        .to_string()
}

#[tokio::test]
async fn liveness_and_readiness_report_capacity() {
    let cache_dir = TempDir::new().unwrap();
    let server = test_server(&base_config(), &cache_dir, FakeLlm::default());

    let response = server.get("/health/live").await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["metrics"]["max_concurrency"], 2);

    let response = server.get("/health/ready").await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(response.json::<Value>()["metrics"]["available_permits"], 2);
}

#[tokio::test]
async fn readiness_degrades_while_all_slots_are_busy() {
    let cache_dir = TempDir::new().unwrap();
    let mut config = base_config();
    config.max_concurrency = 1;
    let gate = Arc::new(Notify::new());
    let server = test_server(
        &config,
        &cache_dir,
        FakeLlm {
            gate: Some(gate.clone()),
        },
    );

    let run_id = start_run(&server, "What is machine learning?").await;

    timeout(Duration::from_secs(5), async {
        loop {
            let response = server.get("/health/ready").await;
            if response.status_code() == 503 {
                assert_eq!(response.json::<Value>()["status"], "degraded");
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("readiness never reported the busy slot");

    gate.notify_one();
    let status = wait_for_run(&server, &run_id).await;
    assert_eq!(status["state"], "completed");

    let response = server.get("/health/ready").await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn empty_query_is_rejected() {
    let cache_dir = TempDir::new().unwrap();
    let server = test_server(&base_config(), &cache_dir, FakeLlm::default());

    let response = server
        .post("/api/research")
        .json(&json!({ "query": "   " }))
        .await;
    assert_eq!(response.status_code(), 400);
    assert_eq!(
        response.json::<Value>()["error"],
        "Please enter a research query first."
    );

    let response = server.get("/api/research").await;
    assert_eq!(response.json::<Value>()["runs"], json!([]));
}

#[tokio::test]
async fn api_requires_bearer_token_when_configured() {
    let cache_dir = TempDir::new().unwrap();
    let mut config = base_config();
    config.auth_token = Some("secret".into());
    let server = test_server(&config, &cache_dir, FakeLlm::default());

    let response = server.get("/api/research").await;
    assert_eq!(response.status_code(), 401);

    let response = server.get("/api/history").await;
    assert_eq!(response.status_code(), 401);

    let response = server
        .get("/api/research")
        .add_header(header::AUTHORIZATION, HeaderValue::from_static("Bearer secret"))
        .await;
    assert_eq!(response.status_code(), 200);
    let body = response.json::<Value>();
    assert!(body["runs"].is_array());

    // Health checks stay open for probes.
    let response = server.get("/health/live").await;
    assert_eq!(response.status_code(), 200);
}

#[tokio::test]
async fn research_run_completes_and_lands_in_history() {
    let cache_dir = TempDir::new().unwrap();
    let server = test_server(&base_config(), &cache_dir, FakeLlm::default());

    let run_id = start_run(&server, "What is machine learning?").await;
    let status = wait_for_run(&server, &run_id).await;

    assert_eq!(status["state"], "completed");
    assert_eq!(status["normalized_query"], "machine learning");
    assert_eq!(status["variants"].as_array().map(Vec::len), Some(3));
    let sources = status["sources"].as_array().expect("sources missing");
    assert_eq!(sources.len(), 3);
    assert_eq!(
        sources[0]["url"],
        "https://en.wikipedia.org/wiki/Machine_learning"
    );
    let report = status["report"].as_str().expect("report missing").to_string();
    assert!(report.contains("Synthesized from 3 sources"));

    let stream_response = server
        .get(&format!("/api/research/{run_id}/stream"))
        .await;
    assert_eq!(stream_response.status_code(), 200);
    let body = stream_response.text();
    assert!(
        body.contains("event: completed"),
        "stream did not include completed event: {body}"
    );
    assert!(
        body.contains("\"source_count\":3"),
        "stream payload missing source count: {body}"
    );

    let history = server.get("/api/history").await.json::<Value>();
    let items = history["items"].as_array().expect("history items missing");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], run_id.as_str());
    assert_eq!(items[0]["query"], "What is machine learning?");
    assert_eq!(items[0]["source_count"], 3);
    assert!(items[0]["duration"].as_str().unwrap().ends_with('s'));

    let item = server
        .get(&format!("/api/history/{run_id}"))
        .await
        .json::<Value>();
    assert_eq!(item["report"], report.as_str());
    assert_eq!(item["sources"].as_array().map(Vec::len), Some(3));

    let download = server
        .get(&format!("/api/history/{run_id}/report"))
        .await;
    assert_eq!(download.status_code(), 200);
    let content_type = download.headers().get(header::CONTENT_TYPE).unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/markdown"));
    let disposition = download.headers().get(header::CONTENT_DISPOSITION).unwrap();
    assert!(disposition.to_str().unwrap().starts_with("attachment"));
    assert_eq!(download.text(), report);
}

#[tokio::test]
async fn stream_of_running_run_starts_with_started_event() {
    let cache_dir = TempDir::new().unwrap();
    let gate = Arc::new(Notify::new());
    let server = test_server(
        &base_config(),
        &cache_dir,
        FakeLlm {
            gate: Some(gate.clone()),
        },
    );

    let run_id = start_run(&server, "What is machine learning?").await;
    let stream_path = format!("/api/research/{run_id}/stream");

    let (response, ()) = tokio::join!(server.get(&stream_path).into_future(), async {
        sleep(Duration::from_millis(200)).await;
        gate.notify_one();
    });
    assert_eq!(response.status_code(), 200);
    let body = response.text();
    let started = body
        .find("event: started")
        .unwrap_or_else(|| panic!("stream did not include started event: {body}"));
    let completed = body
        .find("event: completed")
        .unwrap_or_else(|| panic!("stream did not include completed event: {body}"));
    assert!(started < completed, "started arrived after completion: {body}");
    assert!(body.contains("\"state\":\"running\""));

    let status = wait_for_run(&server, &run_id).await;
    assert_eq!(status["state"], "completed");
}

#[tokio::test]
async fn repeated_query_is_served_from_cache() {
    let cache_dir = TempDir::new().unwrap();
    let server = test_server(&base_config(), &cache_dir, FakeLlm::default());

    let first = start_run(&server, "rust ownership").await;
    let first_status = wait_for_run(&server, &first).await;
    assert_eq!(first_status["state"], "completed");

    let second = start_run(&server, "Rust Ownership").await;
    let second_status = wait_for_run(&server, &second).await;
    assert_eq!(second_status["state"], "cached");
    assert_eq!(second_status["report"], first_status["report"]);

    let history = server.get("/api/history").await.json::<Value>();
    let items = history["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], second.as_str());

    let runs = server.get("/api/research").await.json::<Value>();
    assert_eq!(runs["runs"].as_array().map(Vec::len), Some(2));
    assert_eq!(runs["capacity"]["running_runs"], 0);
}

#[tokio::test]
async fn unknown_ids_are_not_found() {
    let cache_dir = TempDir::new().unwrap();
    let server = test_server(&base_config(), &cache_dir, FakeLlm::default());

    assert_eq!(server.get("/api/research/missing").await.status_code(), 404);
    assert_eq!(
        server.get("/api/research/missing/stream").await.status_code(),
        404
    );
    assert_eq!(server.get("/api/history/missing").await.status_code(), 404);
    assert_eq!(
        server.get("/api/history/missing/report").await.status_code(),
        404
    );
}

#[tokio::test]
async fn static_assets_fall_back_to_index() {
    let cache_dir = TempDir::new().unwrap();
    let server = test_server(&base_config(), &cache_dir, FakeLlm::default());

    let response = server.get("/").await;
    assert_eq!(response.status_code(), 200);
    assert!(response.text().contains("AI Web Research Agent"));

    let response = server.get("/history/view").await;
    assert_eq!(response.status_code(), 200);
    let content_type = response.headers().get(header::CONTENT_TYPE).unwrap();
    assert!(content_type.to_str().unwrap().starts_with("text/html"));
}
