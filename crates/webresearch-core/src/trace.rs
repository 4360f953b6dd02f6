use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Progress marker emitted by each pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceEvent {
    pub stage: String,
    pub message: String,
    pub timestamp_ms: u128,
}

impl TraceEvent {
    pub fn new(stage: impl Into<String>, message: impl Into<String>) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();
        Self {
            stage: stage.into(),
            message: message.into(),
            timestamp_ms,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TraceCollector {
    events: Vec<TraceEvent>,
}

impl TraceCollector {
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    pub fn from_events(events: Vec<TraceEvent>) -> Self {
        Self { events }
    }

    pub fn record(&mut self, stage: impl Into<String>, message: impl Into<String>) {
        self.events.push(TraceEvent::new(stage, message));
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// One line per stage, for terminal output.
    pub fn render_lines(&self) -> String {
        self.events
            .iter()
            .enumerate()
            .map(|(index, event)| format!("{}. {}: {}", index + 1, event.stage, event.message))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collector_keeps_order_and_renders_lines() {
        let mut trace = TraceCollector::new();
        trace.record("normalize", "machine learning");
        trace.record("search", "3 results");
        assert_eq!(trace.events().len(), 2);
        assert_eq!(
            trace.render_lines(),
            "1. normalize: machine learning\n2. search: 3 results"
        );
        let restored = TraceCollector::from_events(trace.clone().into_events());
        assert_eq!(restored.events()[1].stage, "search");
    }
}
