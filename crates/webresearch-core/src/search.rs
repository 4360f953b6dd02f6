//! Search provider client with a cooperative rate limiter and canned
//! fallback results.

use std::time::{Duration, Instant};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::{debug, info, instrument, warn};

use crate::categories::TopicCategory;
use crate::config::SearchConfig;
use crate::{SecretValue, WebResearchError, fallback, metrics};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchEngine {
    Serper,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub title: String,
    pub url: String,
    pub snippet: String,
    pub engine: SearchEngine,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
}

/// Spaces outbound requests by a minimum delay plus random jitter. The jitter
/// is only added when a caller actually has to wait.
///
/// The lock is held across the sleep so concurrent callers queue up behind
/// each other instead of all waking at once.
#[derive(Debug)]
pub struct RateLimiter {
    min_delay: Duration,
    jitter_ms: (u64, u64),
    last_request: Mutex<Option<Instant>>,
}

impl RateLimiter {
    pub fn new(min_delay: Duration, jitter_min_ms: u64, jitter_max_ms: u64) -> Self {
        Self {
            min_delay,
            jitter_ms: (jitter_min_ms.min(jitter_max_ms), jitter_max_ms.max(jitter_min_ms)),
            last_request: Mutex::new(None),
        }
    }

    pub fn from_config(config: &SearchConfig) -> Self {
        Self::new(
            Duration::from_millis(config.min_delay_ms),
            config.jitter_min_ms,
            config.jitter_max_ms,
        )
    }

    /// Wait until the next request may be sent and mark it as sent. Returns
    /// the time spent waiting.
    pub async fn acquire(&self) -> Duration {
        let mut last = self.last_request.lock().await;

        let mut waited = Duration::ZERO;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_delay {
                let (low, high) = self.jitter_ms;
                let jitter = if high > low {
                    rand::thread_rng().gen_range(low..=high)
                } else {
                    low
                };
                waited = self.min_delay - elapsed + Duration::from_millis(jitter);
                debug!(wait_ms = waited.as_millis() as u64, "rate limiting search request");
                sleep(waited).await;
            }
        }

        *last = Some(Instant::now());
        waited
    }
}

#[derive(Debug, Serialize)]
struct SerperRequest<'a> {
    q: &'a str,
    num: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    gl: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tbs: Option<&'a str>,
}

#[derive(Debug, Deserialize)]
struct SerperResponse {
    #[serde(default)]
    organic: Vec<SerperOrganic>,
}

#[derive(Debug, Deserialize)]
struct SerperOrganic {
    #[serde(default = "SerperOrganic::missing_title")]
    title: String,
    #[serde(default = "SerperOrganic::missing_link")]
    link: String,
    #[serde(default = "SerperOrganic::missing_snippet")]
    snippet: String,
    #[serde(default)]
    date: Option<String>,
}

impl SerperOrganic {
    fn missing_title() -> String {
        "No title".to_string()
    }

    fn missing_link() -> String {
        "#".to_string()
    }

    fn missing_snippet() -> String {
        "No description available".to_string()
    }
}

pub struct SearchClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretValue>,
    results_per_query: usize,
    region: Option<String>,
    time_filter: Option<String>,
    limiter: RateLimiter,
}

impl SearchClient {
    pub fn new(config: &SearchConfig, api_key: Option<SecretValue>) -> Result<Self, WebResearchError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|err| WebResearchError::Search(format!("failed to build HTTP client: {err}")))?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key,
            results_per_query: config.results_per_query,
            region: config.region.clone(),
            time_filter: config.time_filter.clone(),
            limiter: RateLimiter::from_config(config),
        })
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }

    /// Search every variant in order and concatenate what comes back.
    ///
    /// Provider failures are logged and skipped. Without an API key, or when
    /// every variant comes back empty, the fallback catalogue for the first
    /// variant is returned instead.
    #[instrument(name = "search", skip(self, category), fields(variants = variants.len()))]
    pub async fn search(
        &self,
        variants: &[String],
        category: Option<&TopicCategory>,
    ) -> Result<Vec<SearchResult>, WebResearchError> {
        let Some(primary) = variants.first() else {
            return Err(WebResearchError::EmptyQuery);
        };

        let Some(api_key) = self.api_key.as_ref() else {
            info!(query = %primary, "no search API key configured; serving fallback results");
            metrics::record_search_request("fallback");
            return Ok(fallback::lookup(primary));
        };

        let region = category
            .and_then(|category| category.region.as_deref())
            .or(self.region.as_deref());
        let time_filter = category
            .and_then(|category| category.time_filter.as_deref())
            .or(self.time_filter.as_deref());

        let mut collected = Vec::new();
        for variant in variants {
            self.limiter.acquire().await;
            match self.query_provider(api_key, variant, region, time_filter).await {
                Ok(results) => {
                    debug!(variant = %variant, count = results.len(), "search variant returned");
                    metrics::record_search_request(if results.is_empty() { "empty" } else { "success" });
                    collected.extend(results);
                }
                Err(err) => {
                    warn!(variant = %variant, error = %err, "search variant failed; continuing");
                    metrics::record_search_request("error");
                }
            }
        }

        if collected.is_empty() {
            warn!(query = %primary, "search provider returned nothing; serving fallback results");
            metrics::record_search_request("fallback");
            return Ok(fallback::lookup(primary));
        }

        Ok(collected)
    }

    async fn query_provider(
        &self,
        api_key: &SecretValue,
        query: &str,
        region: Option<&str>,
        time_filter: Option<&str>,
    ) -> Result<Vec<SearchResult>, WebResearchError> {
        let payload = SerperRequest {
            q: query,
            num: self.results_per_query,
            gl: region,
            tbs: time_filter,
        };

        let response = self
            .http
            .post(&self.endpoint)
            .header("X-API-KEY", api_key.expose())
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .json(&payload)
            .send()
            .await
            .map_err(|err| WebResearchError::Search(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(WebResearchError::Search(format!("search provider HTTP {status}")));
        }

        let parsed: SerperResponse = response
            .json()
            .await
            .map_err(|err| WebResearchError::Search(format!("malformed search response: {err}")))?;

        Ok(parsed
            .organic
            .into_iter()
            .take(self.results_per_query)
            .map(|item| SearchResult {
                title: item.title,
                url: item.link,
                snippet: item.snippet,
                engine: SearchEngine::Serper,
                date: item.date,
            })
            .collect())
    }
}
