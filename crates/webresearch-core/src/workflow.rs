use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Result, anyhow};
use graph_flow::{
    ExecutionStatus, FlowRunner, Graph, GraphBuilder, InMemorySessionStorage, Session,
    SessionStorage, Task,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::categories::{CategoryTable, TopicCategory};
use crate::config::Config;
use crate::content::ContentProcessor;
use crate::llm::{ChatCompletionsClient, LlmClient};
use crate::logging::{RunLogInput, RunLogger};
use crate::normalizer::{QueryNormalizer, QueryPlan};
use crate::search::{SearchClient, SearchResult};
use crate::synthesizer::ReportSynthesizer;
use crate::tasks::{NoResultsTask, NormalizeTask, ProcessTask, SearchTask, SynthesizeTask, keys};
use crate::trace::{TraceCollector, TraceEvent};
use crate::{DiskCache, WebResearchError, metrics};

pub const EMPTY_QUERY_MESSAGE: &str = "Please enter a research query first.";
pub const NO_RESULTS_MESSAGE: &str = "No search results found. Please try a different query.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Completed,
    Cached,
    NoResults,
    Failed,
}

impl ResearchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Cached => "cached",
            Self::NoResults => "no_results",
            Self::Failed => "failed",
        }
    }

    /// Completed and cached runs carry a real report.
    pub fn has_report(&self) -> bool {
        matches!(self, Self::Completed | Self::Cached)
    }
}

/// Result of one research run. `report` always holds user-facing text, even
/// when the run failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchOutcome {
    pub session_id: String,
    pub query: String,
    pub normalized_query: String,
    pub variants: Vec<String>,
    pub category: Option<String>,
    pub sources: Vec<SearchResult>,
    pub report: String,
    pub status: ResearchStatus,
    pub duration_secs: f64,
    pub trace_events: Vec<TraceEvent>,
}

/// Options for running a research session.
#[derive(Debug, Clone)]
pub struct ResearchOptions {
    pub query: String,
    pub session_id: Option<String>,
    pub use_cache: bool,
}

impl ResearchOptions {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            session_id: None,
            use_cache: true,
        }
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn without_cache(mut self) -> Self {
        self.use_cache = false;
        self
    }
}

/// The pipeline tasks wired into the research graph.
#[derive(Clone)]
struct PipelineTasks {
    normalize: Arc<NormalizeTask>,
    search: Arc<SearchTask>,
    no_results: Arc<NoResultsTask>,
    process: Arc<ProcessTask>,
    synthesize: Arc<SynthesizeTask>,
}

fn build_graph(tasks: &PipelineTasks) -> Arc<Graph> {
    let builder = GraphBuilder::new("web_research_workflow")
        .add_task(tasks.normalize.clone())
        .add_task(tasks.search.clone())
        .add_task(tasks.no_results.clone())
        .add_task(tasks.process.clone())
        .add_task(tasks.synthesize.clone())
        .add_edge(tasks.normalize.id(), tasks.search.id())
        .add_conditional_edge(
            tasks.search.id(),
            |ctx| ctx.get_sync::<bool>(keys::EMPTY).unwrap_or(true),
            tasks.no_results.id(),
            tasks.process.id(),
        )
        .add_edge(tasks.process.id(), tasks.synthesize.id())
        .set_start_task(tasks.normalize.id());

    Arc::new(builder.build())
}

fn new_session_id() -> String {
    format!("session-{}", Uuid::new_v4())
}

/// Long-lived research pipeline. Build once per process and share by `Arc`;
/// the search client's rate limiter is shared across every run.
pub struct ResearchAgent {
    normalizer: QueryNormalizer,
    categories: CategoryTable,
    search: Arc<SearchClient>,
    cache: DiskCache,
    run_log: Option<RunLogger>,
    graph: Arc<Graph>,
    start_task: String,
}

impl ResearchAgent {
    /// Build an agent backed by the configured chat-completion provider. A
    /// missing LLM key is a fatal configuration error.
    pub fn from_config(config: Config) -> Result<Self, WebResearchError> {
        let api_key = config.llm_api_key()?;
        let llm = ChatCompletionsClient::new(&config.llm, api_key)?;
        Self::with_llm(config, Arc::new(llm))
    }

    /// Build an agent around any [`LlmClient`].
    pub fn with_llm(config: Config, llm: Arc<dyn LlmClient>) -> Result<Self, WebResearchError> {
        let normalizer = QueryNormalizer::new(config.search.variant_suffixes.clone());
        let categories = CategoryTable::new(config.search.categories.clone());
        let search = Arc::new(SearchClient::new(&config.search, config.search_api_key())?);
        let cache = DiskCache::from_config(&config.cache);
        let run_log = config
            .logging
            .run_log_dir
            .clone()
            .map(|dir| RunLogger::new(dir, config.logging.retention_days));

        let tasks = PipelineTasks {
            normalize: Arc::new(NormalizeTask::new(normalizer.clone(), categories.clone())),
            search: Arc::new(SearchTask::new(search.clone(), config.search.max_results)),
            no_results: Arc::new(NoResultsTask),
            process: Arc::new(ProcessTask::new(ContentProcessor::new(config.content.char_limit))),
            synthesize: Arc::new(SynthesizeTask::new(ReportSynthesizer::new(llm.clone()))),
        };
        let graph = build_graph(&tasks);

        info!(
            provider = %config.llm.provider,
            model = %llm.model(),
            search_key = search.has_api_key(),
            cache_dir = %cache.dir().display(),
            categories = categories.len(),
            "research agent ready"
        );

        Ok(Self {
            normalizer,
            categories,
            search,
            cache,
            run_log,
            graph,
            start_task: tasks.normalize.id().to_string(),
        })
    }

    pub fn cache(&self) -> &DiskCache {
        &self.cache
    }

    pub fn analyze_query(&self, query: &str) -> QueryPlan {
        self.normalizer.plan(query, &self.categories)
    }

    /// Raw search over explicit variants, before ranking.
    pub async fn perform_search(&self, variants: &[String]) -> Result<Vec<SearchResult>, WebResearchError> {
        self.search.search(variants, None).await
    }

    pub async fn research(&self, query: &str) -> ResearchOutcome {
        self.research_with_options(ResearchOptions::new(query)).await
    }

    /// Run one research session. Never fails: every problem past
    /// configuration is reported through the outcome status and text.
    #[instrument(name = "research", skip(self, options), fields(query = %options.query))]
    pub async fn research_with_options(&self, options: ResearchOptions) -> ResearchOutcome {
        let started = Instant::now();
        let session_id = options.session_id.unwrap_or_else(new_session_id);
        let query = options.query.trim().to_string();

        let outcome = if query.is_empty() {
            let mut trace = TraceCollector::new();
            trace.record("validate", "empty query rejected");
            ResearchOutcome {
                session_id,
                query,
                normalized_query: String::new(),
                variants: Vec::new(),
                category: None,
                sources: Vec::new(),
                report: EMPTY_QUERY_MESSAGE.to_string(),
                status: ResearchStatus::Failed,
                duration_secs: started.elapsed().as_secs_f64(),
                trace_events: trace.into_events(),
            }
        } else if let Some(cached) = options
            .use_cache
            .then(|| self.cache.get(&query))
            .flatten()
        {
            let plan = self.analyze_query(&query);
            let mut trace = TraceCollector::new();
            trace.record(
                "cache",
                format!("served cached report from a {:.1}s run", cached.duration),
            );
            info!(%session_id, "serving cached report");
            ResearchOutcome {
                session_id,
                query,
                normalized_query: plan.normalized,
                variants: plan.variants,
                category: plan.category.map(|category| category.name),
                sources: Vec::new(),
                report: cached.report,
                status: ResearchStatus::Cached,
                duration_secs: started.elapsed().as_secs_f64(),
                trace_events: trace.into_events(),
            }
        } else {
            self.run_pipeline(session_id, query, started).await
        };

        metrics::record_research_run(
            outcome.status.as_str(),
            Duration::from_secs_f64(outcome.duration_secs),
        );
        self.log_run(&outcome);
        outcome
    }

    async fn run_pipeline(&self, session_id: String, query: String, started: Instant) -> ResearchOutcome {
        let snapshot = match self.execute_graph(&session_id, &query).await {
            Ok(snapshot) => snapshot,
            Err(err) => {
                warn!(%session_id, error = %err, "research graph failed");
                let mut trace = TraceCollector::new();
                trace.record("workflow", format!("graph execution failed: {err}"));
                GraphSnapshot {
                    trace_events: trace.into_events(),
                    error: Some(err.to_string()),
                    ..GraphSnapshot::default()
                }
            }
        };

        let duration = started.elapsed();
        let (status, report) = match (&snapshot.error, &snapshot.report) {
            (Some(err), _) => (ResearchStatus::Failed, failure_message(err)),
            (None, _) if snapshot.sources.is_empty() => {
                (ResearchStatus::NoResults, NO_RESULTS_MESSAGE.to_string())
            }
            (None, Some(report)) => (ResearchStatus::Completed, report.clone()),
            (None, None) => (
                ResearchStatus::Failed,
                failure_message("no report was produced"),
            ),
        };

        if status == ResearchStatus::Completed {
            if let Err(err) = self.cache.put(&query, &report, duration) {
                warn!(%session_id, error = %err, "failed to cache report");
            }
        }

        info!(
            %session_id,
            status = status.as_str(),
            sources = snapshot.sources.len(),
            duration_ms = duration.as_millis() as u64,
            "research finished"
        );

        ResearchOutcome {
            session_id,
            query,
            normalized_query: snapshot.normalized,
            variants: snapshot.variants,
            category: snapshot.category.map(|category| category.name),
            sources: snapshot.sources,
            report,
            status,
            duration_secs: duration.as_secs_f64(),
            trace_events: snapshot.trace_events,
        }
    }

    async fn execute_graph(&self, session_id: &str, query: &str) -> Result<GraphSnapshot> {
        let storage = Arc::new(InMemorySessionStorage::new());
        let runner = FlowRunner::new(self.graph.clone(), storage.clone());

        let session = Session::new_from_task(session_id.to_string(), &self.start_task);
        session.context.set(keys::QUERY, query.to_string()).await;

        storage
            .save(session)
            .await
            .map_err(|err| anyhow!("failed to persist session: {err}"))?;

        loop {
            let result = runner
                .run(session_id)
                .await
                .map_err(|err| anyhow!("graph execution failure: {err}"))?;

            match result.status {
                ExecutionStatus::Completed => break,
                ExecutionStatus::Error(message) => return Err(anyhow!(message)),
                _ => continue,
            }
        }

        let session = storage
            .get(session_id)
            .await
            .map_err(|err| anyhow!("failed to reload session: {err}"))?
            .ok_or_else(|| anyhow!("session missing after execution"))?;
        let context = &session.context;

        Ok(GraphSnapshot {
            normalized: context.get(keys::NORMALIZED).await.unwrap_or_default(),
            variants: context.get(keys::VARIANTS).await.unwrap_or_default(),
            category: context
                .get::<Option<TopicCategory>>(keys::CATEGORY)
                .await
                .flatten(),
            sources: context.get(keys::RESULTS).await.unwrap_or_default(),
            report: context.get(keys::REPORT).await,
            error: context.get(keys::REPORT_ERROR).await,
            trace_events: context.get(keys::TRACE).await.unwrap_or_default(),
        })
    }

    fn log_run(&self, outcome: &ResearchOutcome) {
        let Some(logger) = &self.run_log else {
            return;
        };
        let input = RunLogInput {
            session_id: outcome.session_id.clone(),
            query: outcome.query.clone(),
            status: outcome.status.as_str().to_string(),
            duration_secs: outcome.duration_secs,
            sources: outcome.sources.iter().map(|source| source.url.clone()).collect(),
        };
        if let Err(err) = logger.append(input) {
            warn!(session_id = %outcome.session_id, error = %err, "failed to write run log");
        }
    }
}

#[derive(Debug, Default)]
struct GraphSnapshot {
    normalized: String,
    variants: Vec<String>,
    category: Option<TopicCategory>,
    sources: Vec<SearchResult>,
    report: Option<String>,
    error: Option<String>,
    trace_events: Vec<TraceEvent>,
}

fn failure_message(error: &str) -> String {
    format!("An error occurred during research: {error}\n\nPlease try again with a different query.")
}
