use std::sync::Arc;

use async_trait::async_trait;
use graph_flow::{Context, NextAction, Task, TaskResult};
use tracing::{debug, info, instrument, warn};

use crate::categories::{CategoryTable, TopicCategory};
use crate::content::{ContentProcessor, ContentRecord};
use crate::normalizer::{QueryNormalizer, QueryPlan};
use crate::ranking;
use crate::search::{SearchClient, SearchResult};
use crate::synthesizer::ReportSynthesizer;
use crate::trace::TraceEvent;

/// Context keys shared by the pipeline tasks.
pub mod keys {
    pub const QUERY: &str = "query";
    pub const NORMALIZED: &str = "query.normalized";
    pub const VARIANTS: &str = "query.variants";
    pub const CATEGORY: &str = "query.category";
    pub const RESULTS: &str = "search.results";
    pub const EMPTY: &str = "search.empty";
    pub const RECORDS: &str = "content.records";
    pub const REPORT: &str = "report.text";
    pub const REPORT_ERROR: &str = "report.error";
    pub const TRACE: &str = "trace.events";
}

async fn record_trace(context: &Context, stage: &str, message: impl Into<String>) {
    let mut events: Vec<TraceEvent> = context.get(keys::TRACE).await.unwrap_or_default();
    events.push(TraceEvent::new(stage, message));
    context.set(keys::TRACE, &events).await;
}

pub struct NormalizeTask {
    normalizer: QueryNormalizer,
    categories: CategoryTable,
}

impl NormalizeTask {
    pub fn new(normalizer: QueryNormalizer, categories: CategoryTable) -> Self {
        Self {
            normalizer,
            categories,
        }
    }
}

#[async_trait]
impl Task for NormalizeTask {
    fn id(&self) -> &str {
        "normalize"
    }

    #[instrument(name = "task.normalize", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let query: String = context.get(keys::QUERY).await.unwrap_or_default();
        let QueryPlan {
            normalized,
            variants,
            category,
        } = self.normalizer.plan(&query, &self.categories);

        info!(
            %query,
            %normalized,
            variants = variants.len(),
            category = category.as_ref().map(|c| c.name.as_str()).unwrap_or("none"),
            "query normalized"
        );

        context.set(keys::NORMALIZED, &normalized).await;
        context.set(keys::VARIANTS, &variants).await;
        context.set(keys::CATEGORY, &category).await;
        record_trace(
            &context,
            self.id(),
            format!("\"{normalized}\" expanded into {} variants", variants.len()),
        )
        .await;

        Ok(TaskResult::new(
            Some(format!("Normalized query to \"{normalized}\"")),
            NextAction::ContinueAndExecute,
        ))
    }
}

pub struct SearchTask {
    client: Arc<SearchClient>,
    max_results: usize,
}

impl SearchTask {
    pub fn new(client: Arc<SearchClient>, max_results: usize) -> Self {
        Self {
            client,
            max_results,
        }
    }
}

#[async_trait]
impl Task for SearchTask {
    fn id(&self) -> &str {
        "search"
    }

    #[instrument(name = "task.search", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let variants: Vec<String> = context.get(keys::VARIANTS).await.unwrap_or_default();
        let category = context
            .get::<Option<TopicCategory>>(keys::CATEGORY)
            .await
            .flatten();

        let raw = match self.client.search(&variants, category.as_ref()).await {
            Ok(results) => results,
            Err(err) => {
                warn!(error = %err, "search stage failed");
                Vec::new()
            }
        };
        let raw_count = raw.len();
        let ranked = ranking::rank(raw, category.as_ref(), self.max_results);

        debug!(raw_count, ranked = ranked.len(), "search results ranked");

        context.set(keys::RESULTS, &ranked).await;
        context.set_sync(keys::EMPTY, ranked.is_empty());
        record_trace(
            &context,
            self.id(),
            format!("{raw_count} results found, {} kept after ranking", ranked.len()),
        )
        .await;

        Ok(TaskResult::new(
            Some(format!("Collected {} search results", ranked.len())),
            NextAction::ContinueAndExecute,
        ))
    }
}

#[derive(Default)]
pub struct NoResultsTask;

#[async_trait]
impl Task for NoResultsTask {
    fn id(&self) -> &str {
        "no_results"
    }

    #[instrument(name = "task.no_results", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        info!("no usable search results; skipping synthesis");
        record_trace(&context, self.id(), "no usable search results").await;
        Ok(TaskResult::new(
            Some("No search results found".to_string()),
            NextAction::End,
        ))
    }
}

pub struct ProcessTask {
    processor: ContentProcessor,
}

impl ProcessTask {
    pub fn new(processor: ContentProcessor) -> Self {
        Self { processor }
    }
}

#[async_trait]
impl Task for ProcessTask {
    fn id(&self) -> &str {
        "process"
    }

    #[instrument(name = "task.process", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let query: String = context.get(keys::QUERY).await.unwrap_or_default();
        let results: Vec<SearchResult> = context.get(keys::RESULTS).await.unwrap_or_default();

        let records = self.processor.process(&results, &query);
        context.set(keys::RECORDS, &records).await;
        record_trace(
            &context,
            self.id(),
            format!("{} content records prepared", records.len()),
        )
        .await;

        Ok(TaskResult::new(
            Some(format!("Prepared {} content records", records.len())),
            NextAction::ContinueAndExecute,
        ))
    }
}

pub struct SynthesizeTask {
    synthesizer: ReportSynthesizer,
}

impl SynthesizeTask {
    pub fn new(synthesizer: ReportSynthesizer) -> Self {
        Self { synthesizer }
    }
}

#[async_trait]
impl Task for SynthesizeTask {
    fn id(&self) -> &str {
        "synthesize"
    }

    #[instrument(name = "task.synthesize", skip(self, context))]
    async fn run(&self, context: Context) -> graph_flow::Result<TaskResult> {
        let query: String = context.get(keys::QUERY).await.unwrap_or_default();
        let records: Vec<ContentRecord> = context.get(keys::RECORDS).await.unwrap_or_default();

        // Failures are recorded for the caller rather than aborting the graph.
        match self.synthesizer.synthesize(&query, &records).await {
            Ok(report) => {
                record_trace(
                    &context,
                    self.id(),
                    format!("report written by {}", self.synthesizer.model()),
                )
                .await;
                context.set(keys::REPORT, &report).await;
            }
            Err(err) => {
                warn!(error = %err, "report synthesis failed");
                record_trace(&context, self.id(), format!("synthesis failed: {err}")).await;
                context.set(keys::REPORT_ERROR, err.to_string()).await;
            }
        }

        Ok(TaskResult::new(
            Some("Synthesis finished".to_string()),
            NextAction::End,
        ))
    }
}
