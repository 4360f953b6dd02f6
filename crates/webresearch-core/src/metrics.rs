use std::time::Duration;

use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};
use tracing::info;

struct PipelineMetrics {
    search_requests: Counter<u64>,
    cache_lookups: Counter<u64>,
    research_runs: Counter<u64>,
    research_duration_ms: Histogram<f64>,
}

static METRICS: OnceCell<PipelineMetrics> = OnceCell::new();

fn handles() -> &'static PipelineMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("webresearch.pipeline");
        PipelineMetrics {
            search_requests: meter
                .u64_counter("search_requests_total")
                .with_description("Search provider requests by outcome")
                .init(),
            cache_lookups: meter
                .u64_counter("cache_lookups_total")
                .with_description("Report cache lookups by result")
                .init(),
            research_runs: meter
                .u64_counter("research_runs_total")
                .with_description("Research runs by final status")
                .init(),
            research_duration_ms: meter
                .f64_histogram("research_duration_ms")
                .with_description("End-to-end research latency in milliseconds")
                .init(),
        }
    })
}

/// Hint to operators that OTEL metrics export can be configured externally.
pub fn init_metrics_from_env(service_name: &str) {
    if std::env::var("WEBRESEARCH_OTEL_METRICS_ENDPOINT").is_ok() {
        info!(
            target = "telemetry",
            "WEBRESEARCH_OTEL_METRICS_ENDPOINT detected for {service_name}. Configure an OTLP meter provider in your deployment to export pipeline metrics."
        );
    }
}

/// `outcome` is one of `success`, `empty`, `error` or `fallback`.
pub fn record_search_request(outcome: &'static str) {
    handles()
        .search_requests
        .add(1, &[KeyValue::new("outcome", outcome)]);
}

/// `result` is one of `hit`, `miss`, `expired` or `corrupt`.
pub fn record_cache_lookup(result: &'static str) {
    handles()
        .cache_lookups
        .add(1, &[KeyValue::new("result", result)]);
}

pub fn record_research_run(status: &'static str, duration: Duration) {
    let metrics = handles();
    let attrs = [KeyValue::new("status", status)];
    metrics.research_runs.add(1, &attrs);
    metrics
        .research_duration_ms
        .record(duration.as_secs_f64() * 1_000.0, &attrs);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_without_a_provider_is_a_noop() {
        record_search_request("success");
        record_cache_lookup("miss");
        record_research_run("completed", Duration::from_millis(1_250));
    }
}
