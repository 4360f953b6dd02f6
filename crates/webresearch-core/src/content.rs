use serde::{Deserialize, Serialize};

use crate::search::SearchResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentRecord {
    pub id: String,
    pub source: String,
    pub url: String,
    pub content: String,
    pub analysis: String,
}

/// Maps search results onto the records handed to the synthesizer, one per
/// result, in order.
#[derive(Debug, Clone)]
pub struct ContentProcessor {
    char_limit: usize,
}

impl Default for ContentProcessor {
    fn default() -> Self {
        Self::new(1_500)
    }
}

impl ContentProcessor {
    pub fn new(char_limit: usize) -> Self {
        Self { char_limit }
    }

    pub fn process(&self, results: &[SearchResult], query: &str) -> Vec<ContentRecord> {
        results
            .iter()
            .enumerate()
            .map(|(index, result)| {
                let source = if result.title.trim().is_empty() {
                    format!("Source {}", index + 1)
                } else {
                    result.title.clone()
                };
                let analysis = format!("Content from {source} is relevant to '{query}'.");
                ContentRecord {
                    id: format!("web_{index}"),
                    source,
                    url: result.url.clone(),
                    content: truncate_chars(&result.snippet, self.char_limit),
                    analysis,
                }
            })
            .collect()
    }
}

fn truncate_chars(text: &str, limit: usize) -> String {
    match text.char_indices().nth(limit) {
        Some((byte_index, _)) => text[..byte_index].to_string(),
        None => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::SearchEngine;

    fn result(title: &str, snippet: &str) -> SearchResult {
        SearchResult {
            title: title.to_string(),
            url: format!("https://example.com/{}", title.len()),
            snippet: snippet.to_string(),
            engine: SearchEngine::Serper,
            date: None,
        }
    }

    #[test]
    fn one_record_per_result_with_stable_ids() {
        let processor = ContentProcessor::default();
        let records = processor.process(
            &[result("Tokio docs", "An async runtime"), result("", "untitled")],
            "tokio",
        );
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].id, "web_0");
        assert_eq!(records[0].source, "Tokio docs");
        assert_eq!(records[0].content, "An async runtime");
        assert_eq!(
            records[0].analysis,
            "Content from Tokio docs is relevant to 'tokio'."
        );
        assert_eq!(records[1].id, "web_1");
        assert_eq!(records[1].source, "Source 2");
    }

    #[test]
    fn content_is_truncated_on_char_boundaries() {
        let processor = ContentProcessor::new(3);
        let records = processor.process(&[result("t", "héllo wörld")], "q");
        assert_eq!(records[0].content, "hél");
    }
}
