use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use async_trait::async_trait;
use axum::{Json, Router, routing::post};
use serde_json::json;
use tempfile::TempDir;
use webresearch_core::{
    Config, LlmClient, NO_RESULTS_MESSAGE, ResearchAgent, ResearchOptions, ResearchStatus,
    WebResearchError, cache_key,
};

#[derive(Default)]
struct RecordingLlm {
    prompts: Mutex<Vec<String>>,
    fail: bool,
    blank: bool,
}

#[async_trait]
impl LlmClient for RecordingLlm {
    async fn complete(&self, prompt: &str) -> anyhow::Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.fail {
            return Err(anyhow!("upstream timeout"));
        }
        if self.blank {
            return Ok("   \n".to_string());
        }
        Ok("## Definition\nMachine learning lets systems learn from data [1][2].".to_string())
    }

    fn model(&self) -> &str {
        "recording"
    }
}

fn test_config(cache_dir: &TempDir, search_key_env: &str) -> Config {
    let mut config = Config::default();
    config.cache.dir = cache_dir.path().to_path_buf();
    config.search.api_key_env = search_key_env.to_string();
    config.search.min_delay_ms = 0;
    config.search.jitter_min_ms = 0;
    config.search.jitter_max_ms = 0;
    config
}

#[tokio::test]
async fn machine_learning_query_without_search_key_uses_fallback_and_caches() {
    let cache_dir = TempDir::new().unwrap();
    let llm = Arc::new(RecordingLlm::default());
    let agent = ResearchAgent::with_llm(
        test_config(&cache_dir, "WEBRESEARCH_FLOW_SEARCH_KEY_UNSET"),
        llm.clone(),
    )
    .unwrap();

    let outcome = agent.research("What is machine learning?").await;

    assert_eq!(outcome.status, ResearchStatus::Completed);
    assert_eq!(outcome.normalized_query, "machine learning");
    assert_eq!(outcome.variants.len(), 3);
    assert_eq!(outcome.sources.len(), 3);
    assert!(!outcome.report.is_empty());
    assert_eq!(
        outcome
            .trace_events
            .iter()
            .map(|event| event.stage.as_str())
            .collect::<Vec<_>>(),
        vec!["normalize", "search", "process", "synthesize"]
    );

    {
        let prompts = llm.prompts.lock().unwrap();
        assert_eq!(prompts.len(), 1);
        for url in [
            "https://en.wikipedia.org/wiki/Machine_learning",
            "https://www.ibm.com/topics/machine-learning",
            "https://mitsloan.mit.edu/ideas-made-to-matter/machine-learning-explained",
        ] {
            assert!(prompts[0].contains(url), "prompt is missing {url}");
        }
    }

    let cache_file = cache_dir
        .path()
        .join(format!("{}.json", cache_key("what is machine learning?")));
    assert!(cache_file.ends_with("0c9fdf1c9bd767b44887ab8491c4b9c0.json"));
    assert!(cache_file.exists());

    let second = agent.research("  WHAT IS MACHINE LEARNING?  ").await;
    assert_eq!(second.status, ResearchStatus::Cached);
    assert_eq!(second.report, outcome.report);
    assert_eq!(llm.prompts.lock().unwrap().len(), 1);

    let bypass = agent
        .research_with_options(ResearchOptions::new("What is machine learning?").without_cache())
        .await;
    assert_eq!(bypass.status, ResearchStatus::Completed);
    assert_eq!(llm.prompts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn blank_query_is_rejected_without_running_the_pipeline() {
    let cache_dir = TempDir::new().unwrap();
    let llm = Arc::new(RecordingLlm::default());
    let agent = ResearchAgent::with_llm(
        test_config(&cache_dir, "WEBRESEARCH_FLOW_SEARCH_KEY_UNSET"),
        llm.clone(),
    )
    .unwrap();

    let outcome = agent
        .research_with_options(ResearchOptions::new("   ").with_session_id("blank"))
        .await;
    assert_eq!(outcome.status, ResearchStatus::Failed);
    assert_eq!(outcome.session_id, "blank");
    assert_eq!(outcome.report, "Please enter a research query first.");
    assert!(llm.prompts.lock().unwrap().is_empty());
}

#[tokio::test]
async fn llm_failure_is_reported_and_not_cached() {
    let cache_dir = TempDir::new().unwrap();
    let llm = Arc::new(RecordingLlm {
        fail: true,
        ..RecordingLlm::default()
    });
    let agent = ResearchAgent::with_llm(
        test_config(&cache_dir, "WEBRESEARCH_FLOW_SEARCH_KEY_UNSET"),
        llm,
    )
    .unwrap();

    let outcome = agent.research("rust ownership").await;
    assert_eq!(outcome.status, ResearchStatus::Failed);
    assert!(outcome.report.starts_with("An error occurred during research: "));
    assert!(outcome.report.contains("upstream timeout"));
    assert!(outcome.report.ends_with("\n\nPlease try again with a different query."));
    assert!(!agent.cache().path_for("rust ownership").exists());
}

#[tokio::test]
async fn blank_model_output_fails_the_run_and_skips_the_cache() {
    let cache_dir = TempDir::new().unwrap();
    let llm = Arc::new(RecordingLlm {
        blank: true,
        ..RecordingLlm::default()
    });
    let agent = ResearchAgent::with_llm(
        test_config(&cache_dir, "WEBRESEARCH_FLOW_SEARCH_KEY_UNSET"),
        llm.clone(),
    )
    .unwrap();

    let outcome = agent.research("What is machine learning?").await;
    assert_eq!(outcome.status, ResearchStatus::Failed);
    assert!(outcome.report.contains("model returned an empty report"));
    assert!(!agent.cache().path_for("What is machine learning?").exists());

    let retry = agent.research("What is machine learning?").await;
    assert_eq!(retry.status, ResearchStatus::Failed);
    assert_eq!(llm.prompts.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn provider_results_without_valid_links_end_in_no_results() {
    let app = Router::new().route(
        "/search",
        post(|| async {
            Json(json!({
                "organic": [
                    {"title": "Anchor only", "link": "#", "snippet": "nothing"},
                    {"title": "No link", "snippet": "still nothing"}
                ]
            }))
        }),
    );
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    unsafe {
        std::env::set_var("WEBRESEARCH_FLOW_SEARCH_KEY_SET", "serper-test");
    }
    let cache_dir = TempDir::new().unwrap();
    let mut config = test_config(&cache_dir, "WEBRESEARCH_FLOW_SEARCH_KEY_SET");
    config.search.endpoint = format!("http://{addr}/search");
    let llm = Arc::new(RecordingLlm::default());
    let agent = ResearchAgent::with_llm(config, llm.clone()).unwrap();

    let outcome = agent.research("obscure topic").await;
    assert_eq!(outcome.status, ResearchStatus::NoResults);
    assert_eq!(outcome.report, NO_RESULTS_MESSAGE);
    assert!(outcome.sources.is_empty());
    assert!(llm.prompts.lock().unwrap().is_empty());
    assert!(!agent.cache().path_for("obscure topic").exists());
}

#[tokio::test]
async fn perform_search_rejects_empty_variants() {
    let cache_dir = TempDir::new().unwrap();
    let agent = ResearchAgent::with_llm(
        test_config(&cache_dir, "WEBRESEARCH_FLOW_SEARCH_KEY_UNSET"),
        Arc::new(RecordingLlm::default()),
    )
    .unwrap();

    let err = agent.perform_search(&[]).await.unwrap_err();
    assert!(matches!(err, WebResearchError::EmptyQuery));

    let plan = agent.analyze_query("How to deploy axum");
    assert_eq!(plan.normalized, "deploy axum tutorial");
    assert_eq!(plan.variants[1], "deploy axum tutorial definition");
}

#[test]
fn missing_llm_key_fails_agent_construction() {
    let mut config = Config::default();
    config.llm.api_key_env = "WEBRESEARCH_FLOW_LLM_KEY_UNSET".into();
    let err = match ResearchAgent::from_config(config) {
        Ok(_) => panic!("agent should require an LLM key"),
        Err(err) => err,
    };
    assert!(matches!(err, WebResearchError::MissingSecret(ref var) if var == "WEBRESEARCH_FLOW_LLM_KEY_UNSET"));
}
