use crate::config::AppConfig;
use crate::metrics;
use anyhow::{Context, Result};
use axum::response::sse::Event;
use chrono::{DateTime, Local, Utc};
use dashmap::DashMap;
use serde::Serialize;
use std::convert::Infallible;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use tokio::sync::{Semaphore, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{self as stream, Stream, StreamExt};
use tracing::{error, warn};
use uuid::Uuid;

/// Finished runs kept in the run table; older ones are dropped once a run
/// finishes. Their reports stay in the history list.
const MAX_FINISHED_RUNS: usize = 256;
use webresearch_core::{
    ConfigLoader, ResearchAgent, ResearchOptions, ResearchOutcome, ResearchStatus, SearchResult,
    TraceEvent,
};

#[derive(Clone)]
pub struct AppState {
    research: Arc<ResearchService>,
    assets_dir: Arc<PathBuf>,
    auth_token: Option<Arc<String>>,
}

impl AppState {
    /// Load the pipeline config and build the shared agent. A missing LLM key
    /// fails here, before the server binds.
    pub fn try_new(config: &AppConfig) -> Result<Self> {
        let research_config = ConfigLoader::load(config.research_config.clone())
            .context("failed to load research configuration")?;
        let agent = ResearchAgent::from_config(research_config)
            .context("failed to build research agent")?;
        Ok(Self::with_agent(config, Arc::new(agent)))
    }

    pub fn with_agent(config: &AppConfig, agent: Arc<ResearchAgent>) -> Self {
        Self {
            research: Arc::new(ResearchService::new(agent, config.max_concurrency)),
            assets_dir: Arc::new(config.assets_dir.clone()),
            auth_token: config
                .auth_token
                .as_ref()
                .map(|token| Arc::new(token.to_string())),
        }
    }

    pub fn research(&self) -> Arc<ResearchService> {
        self.research.clone()
    }

    pub fn assets_dir(&self) -> Arc<PathBuf> {
        self.assets_dir.clone()
    }

    pub fn auth_token(&self) -> Option<Arc<String>> {
        self.auth_token.clone()
    }

    pub fn metrics(&self) -> RunMetrics {
        self.research.metrics()
    }
}

/// Runs research in background tasks, bounded by a semaphore, and keeps the
/// per-process run table and report history.
#[derive(Clone)]
pub struct ResearchService {
    agent: Arc<ResearchAgent>,
    semaphore: Arc<Semaphore>,
    max_concurrency: usize,
    runs: Arc<DashMap<String, RunRecord>>,
    streams: Arc<DashMap<String, broadcast::Sender<RunEvent>>>,
    history: Arc<Mutex<Vec<ResearchHistoryItem>>>,
}

impl ResearchService {
    pub fn new(agent: Arc<ResearchAgent>, max_concurrency: usize) -> Self {
        let max_concurrency = max_concurrency.max(1);
        Self {
            agent,
            semaphore: Arc::new(Semaphore::new(max_concurrency)),
            max_concurrency,
            runs: Arc::new(DashMap::new()),
            streams: Arc::new(DashMap::new()),
            history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn start_run(&self, query: impl Into<String>) -> String {
        let query = query.into();
        let run_id = Uuid::new_v4().to_string();

        let (sender, _) = broadcast::channel(16);
        self.streams.insert(run_id.clone(), sender.clone());
        self.runs
            .insert(run_id.clone(), RunRecord::running(query.clone()));

        let service = self.clone();
        let run_id_for_task = run_id.clone();

        tokio::spawn(async move {
            let permit = match service.semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(err) => {
                    error!(run_id = %run_id_for_task, error = %err, "run aborted before start");
                    let event = RunEvent::aborted(&err);
                    service.update(&run_id_for_task, |record| {
                        record.progress = RunProgress::Aborted {
                            error: err.to_string(),
                            event: event.clone(),
                        };
                    });
                    let _ = sender.send(event);
                    service.streams.remove(&run_id_for_task);
                    return;
                }
            };

            let options = ResearchOptions::new(query).with_session_id(run_id_for_task.clone());
            let outcome = service.agent.research_with_options(options).await;
            drop(permit);

            let snapshot = service.metrics();
            match outcome.status {
                ResearchStatus::Failed => metrics::run_failed(
                    &run_id_for_task,
                    snapshot.running_runs,
                    snapshot.available_permits,
                    &outcome.report,
                ),
                status => metrics::run_finished(
                    &run_id_for_task,
                    status.as_str(),
                    outcome.sources.len(),
                    snapshot.running_runs,
                    snapshot.available_permits,
                ),
            }

            if outcome.status.has_report() {
                service.push_history(ResearchHistoryItem::from_outcome(&outcome));
            }

            let event = RunEvent::finished(&outcome);
            let outcome = Arc::new(outcome);
            service.update(&run_id_for_task, |record| {
                record.progress = RunProgress::Finished {
                    outcome: outcome.clone(),
                    event: event.clone(),
                };
            });
            let _ = sender.send(event);
            service.streams.remove(&run_id_for_task);
            prune_finished_runs(&service.runs, MAX_FINISHED_RUNS);
        });

        run_id
    }

    pub fn status(&self, run_id: &str) -> Option<RunStatus> {
        self.runs
            .get(run_id)
            .map(|record| record.value().status(run_id))
    }

    pub fn list_runs(&self) -> Vec<RunStatus> {
        let mut runs: Vec<(DateTime<Utc>, RunStatus)> = self
            .runs
            .iter()
            .map(|entry| (entry.value().started_at, entry.value().status(entry.key())))
            .collect();
        runs.sort_by_key(|(started_at, _)| *started_at);
        runs.into_iter().map(|(_, status)| status).collect()
    }

    /// Running runs replay `started` and then follow the live channel;
    /// finished runs yield their final event only.
    pub fn event_stream(&self, run_id: &str) -> Option<SseStream> {
        // Subscribe before reading the record so the final event cannot be
        // sent in between.
        let receiver = self.streams.get(run_id).map(|sender| sender.subscribe());

        let record = self.runs.get(run_id)?;
        if let Some(event) = record.value().final_event() {
            let event = event.clone().into_sse_event();
            let stream = stream::iter(vec![Result::<Event, Infallible>::Ok(event)]);
            return Some(Box::pin(stream));
        }
        let started = record.value().started_event.clone().into_sse_event();
        drop(record);

        let live = BroadcastStream::new(receiver?).filter_map(|event| match event {
            Ok(event) => Some(Result::<Event, Infallible>::Ok(event.into_sse_event())),
            Err(err) => {
                warn!(error = %err, "run event stream lagged");
                None
            }
        });
        let stream = stream::iter(vec![Result::<Event, Infallible>::Ok(started)]).chain(live);
        Some(Box::pin(stream))
    }

    /// Newest first.
    pub fn history(&self) -> Vec<HistorySummary> {
        let history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        history.iter().rev().map(HistorySummary::from).collect()
    }

    pub fn history_item(&self, id: &str) -> Option<ResearchHistoryItem> {
        let history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        history.iter().find(|item| item.id == id).cloned()
    }

    pub fn metrics(&self) -> RunMetrics {
        let running_runs = self
            .runs
            .iter()
            .filter(|entry| matches!(entry.value().progress, RunProgress::Running))
            .count();
        RunMetrics {
            max_concurrency: self.max_concurrency,
            available_permits: self.semaphore.available_permits(),
            running_runs,
            total_runs: self.runs.len(),
            active_streams: self.streams.len(),
        }
    }

    fn update(&self, run_id: &str, apply: impl FnOnce(&mut RunRecord)) {
        if let Some(mut record) = self.runs.get_mut(run_id) {
            apply(record.value_mut());
        }
    }

    fn push_history(&self, item: ResearchHistoryItem) {
        let mut history = self
            .history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        history.push(item);
    }
}

pub type SseStream = Pin<Box<dyn Stream<Item = Result<Event, Infallible>> + Send>>;

/// Drop the oldest finished runs beyond `keep`. Running runs are never removed.
fn prune_finished_runs(runs: &DashMap<String, RunRecord>, keep: usize) {
    let mut finished: Vec<(DateTime<Utc>, String)> = runs
        .iter()
        .filter(|entry| entry.value().final_event().is_some())
        .map(|entry| (entry.value().started_at, entry.key().clone()))
        .collect();
    if finished.len() <= keep {
        return;
    }
    finished.sort();
    let excess = finished.len() - keep;
    for (_, run_id) in finished.into_iter().take(excess) {
        runs.remove(&run_id);
    }
}

#[derive(Debug)]
pub struct RunRecord {
    query: String,
    started_at: DateTime<Utc>,
    started_event: RunEvent,
    progress: RunProgress,
}

#[derive(Debug)]
enum RunProgress {
    Running,
    Finished {
        outcome: Arc<ResearchOutcome>,
        event: RunEvent,
    },
    Aborted {
        error: String,
        event: RunEvent,
    },
}

impl RunRecord {
    fn running(query: String) -> Self {
        Self {
            query,
            started_at: Utc::now(),
            started_event: RunEvent::started(),
            progress: RunProgress::Running,
        }
    }

    fn final_event(&self) -> Option<&RunEvent> {
        match &self.progress {
            RunProgress::Running => None,
            RunProgress::Finished { event, .. } | RunProgress::Aborted { event, .. } => {
                Some(event)
            }
        }
    }

    fn status(&self, run_id: &str) -> RunStatus {
        let mut status = RunStatus {
            run_id: run_id.to_string(),
            query: self.query.clone(),
            started_at: self.started_at.to_rfc3339(),
            state: RunState::Running,
            normalized_query: None,
            category: None,
            variants: Vec::new(),
            sources: Vec::new(),
            report: None,
            duration_secs: None,
            trace_events: Vec::new(),
        };

        match &self.progress {
            RunProgress::Running => {}
            RunProgress::Finished { outcome, .. } => {
                status.state = outcome.status.into();
                status.normalized_query = Some(outcome.normalized_query.clone());
                status.category = outcome.category.clone();
                status.variants = outcome.variants.clone();
                status.sources = outcome.sources.clone();
                status.report = Some(outcome.report.clone());
                status.duration_secs = Some(outcome.duration_secs);
                status.trace_events = outcome.trace_events.clone();
            }
            RunProgress::Aborted { error, .. } => {
                status.state = RunState::Failed;
                status.report = Some(error.clone());
            }
        }

        status
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Running,
    Completed,
    Cached,
    NoResults,
    Failed,
}

impl From<ResearchStatus> for RunState {
    fn from(value: ResearchStatus) -> Self {
        match value {
            ResearchStatus::Completed => Self::Completed,
            ResearchStatus::Cached => Self::Cached,
            ResearchStatus::NoResults => Self::NoResults,
            ResearchStatus::Failed => Self::Failed,
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct RunStatus {
    pub run_id: String,
    pub query: String,
    pub started_at: String,
    pub state: RunState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub normalized_query: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub variants: Vec<String>,
    pub sources: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub trace_events: Vec<TraceEvent>,
}

#[derive(Clone, Copy, Debug, Serialize)]
pub struct RunMetrics {
    pub max_concurrency: usize,
    pub available_permits: usize,
    pub running_runs: usize,
    pub total_runs: usize,
    pub active_streams: usize,
}

#[derive(Clone, Debug, Serialize)]
pub struct RunEvent {
    pub kind: RunEventKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<RunState>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_secs: Option<f64>,
}

impl RunEvent {
    pub fn started() -> Self {
        Self {
            kind: RunEventKind::Started,
            message: "research started".into(),
            state: Some(RunState::Running),
            source_count: None,
            duration_secs: None,
        }
    }

    pub fn finished(outcome: &ResearchOutcome) -> Self {
        let kind = match outcome.status {
            ResearchStatus::Completed | ResearchStatus::Cached => RunEventKind::Completed,
            ResearchStatus::NoResults => RunEventKind::NoResults,
            ResearchStatus::Failed => RunEventKind::Failed,
        };
        let message = if outcome.status.has_report() {
            format!("Research completed in {:.1} seconds!", outcome.duration_secs)
        } else {
            outcome.report.clone()
        };
        Self {
            kind,
            message,
            state: Some(outcome.status.into()),
            source_count: Some(outcome.sources.len()),
            duration_secs: Some(outcome.duration_secs),
        }
    }

    pub fn aborted(error: &impl std::fmt::Display) -> Self {
        Self {
            kind: RunEventKind::Failed,
            message: format!("run aborted: {error}"),
            state: Some(RunState::Failed),
            source_count: None,
            duration_secs: None,
        }
    }

    pub fn into_sse_event(self) -> Event {
        let data = serde_json::to_string(&self).unwrap_or_else(|_| {
            serde_json::json!({
                "kind": RunEventKind::Failed,
                "message": "failed to serialize run event",
            })
            .to_string()
        });

        Event::default().event(self.kind.as_str()).data(data)
    }
}

#[derive(Clone, Copy, Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventKind {
    Started,
    Completed,
    NoResults,
    Failed,
}

impl RunEventKind {
    fn as_str(&self) -> &'static str {
        match self {
            RunEventKind::Started => "started",
            RunEventKind::Completed => "completed",
            RunEventKind::NoResults => "no_results",
            RunEventKind::Failed => "failed",
        }
    }
}

/// A finished report kept for the lifetime of the process.
#[derive(Clone, Debug, Serialize)]
pub struct ResearchHistoryItem {
    pub id: String,
    pub query: String,
    /// Local wall-clock time, `YYYY-MM-DD HH:MM`.
    pub timestamp: String,
    /// Run duration rendered as `12.3s`.
    pub duration: String,
    pub report: String,
    pub sources: Vec<String>,
}

impl ResearchHistoryItem {
    pub fn from_outcome(outcome: &ResearchOutcome) -> Self {
        Self {
            id: outcome.session_id.clone(),
            query: outcome.query.clone(),
            timestamp: Local::now().format("%Y-%m-%d %H:%M").to_string(),
            duration: format!("{:.1}s", outcome.duration_secs),
            report: outcome.report.clone(),
            sources: outcome
                .sources
                .iter()
                .map(|source| source.url.clone())
                .collect(),
        }
    }
}

#[derive(Clone, Debug, Serialize)]
pub struct HistorySummary {
    pub id: String,
    pub query: String,
    pub timestamp: String,
    pub duration: String,
    pub source_count: usize,
}

impl From<&ResearchHistoryItem> for HistorySummary {
    fn from(item: &ResearchHistoryItem) -> Self {
        Self {
            id: item.id.clone(),
            query: item.query.clone(),
            timestamp: item.timestamp.clone(),
            duration: item.duration.clone(),
            source_count: item.sources.len(),
        }
    }
}
