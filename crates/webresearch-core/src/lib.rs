//! Web research pipeline built on top of `graph_flow`.
//!
//! A query is normalized into search variants, searched through a
//! rate-limited provider client (with canned fallbacks), ranked, turned into
//! content records and synthesized into a cited markdown report by a hosted
//! LLM. Reports are cached on disk keyed by the md5 of the query.

mod cache;
mod categories;
mod config;
mod content;
mod error;
mod fallback;
mod llm;
mod logging;
mod metrics;
mod normalizer;
mod ranking;
mod search;
mod security;
mod synthesizer;
mod tasks;
mod telemetry;
mod trace;
mod workflow;

pub use cache::{CacheEntry, DiskCache, cache_key};
pub use categories::{CategoryTable, DomainRule, TopicCategory, default_categories};
pub use config::{
    CacheConfig, Config, ConfigLoader, ContentConfig, LlmConfig, LoggingConfig, SearchConfig,
};
pub use content::{ContentProcessor, ContentRecord};
pub use error::WebResearchError;
pub use fallback::lookup as fallback_results;
pub use llm::{ChatCompletionsClient, LlmClient};
pub use logging::{RunLogInput, RunLogger};
pub use metrics::init_metrics_from_env;
pub use normalizer::{QueryNormalizer, QueryPlan};
pub use ranking::rank;
pub use search::{RateLimiter, SearchClient, SearchEngine, SearchResult};
pub use security::{SecretValue, optional_env, require_env};
pub use synthesizer::ReportSynthesizer;
pub use tasks::{NoResultsTask, NormalizeTask, ProcessTask, SearchTask, SynthesizeTask};
pub use telemetry::{TelemetryOptions, init_telemetry};
pub use trace::{TraceCollector, TraceEvent};
pub use workflow::{
    EMPTY_QUERY_MESSAGE, NO_RESULTS_MESSAGE, ResearchAgent, ResearchOptions, ResearchOutcome,
    ResearchStatus,
};
