//! Turns natural-language questions into keyword-style search queries.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::categories::{CategoryTable, TopicCategory};

/// Ordered rewrite rules; the first pattern that matches wins. The subject
/// stops at the first `?`, and anything after it is kept as a tail.
static REWRITE_RULES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"^what\s+is\s+(.*?)(?:\?|$)", ""),
        (r"^who\s+is\s+(.*?)(?:\?|$)", ""),
        (r"^what\s+are\s+(.*?)(?:\?|$)", ""),
        (r"^how\s+does\s+(.*?)(?:\?|$)", "function"),
        (r"^how\s+to\s+(.*?)(?:\?|$)", "tutorial"),
        (r"^when\s+was\s+(.*?)(?:\?|$)", "date history"),
        (r"^where\s+is\s+(.*?)(?:\?|$)", "location"),
    ]
    .into_iter()
    .map(|(pattern, suffix)| {
        (
            Regex::new(pattern).expect("invalid normalizer pattern"),
            suffix,
        )
    })
    .collect()
});

const QUESTION_WORDS: &[&str] = &[
    "what", "who", "when", "where", "why", "how", "is", "are", "was", "were", "will", "do", "does",
];

/// What the search stage will run for a query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub normalized: String,
    pub variants: Vec<String>,
    pub category: Option<TopicCategory>,
}

#[derive(Debug, Clone)]
pub struct QueryNormalizer {
    variant_suffixes: Vec<String>,
}

impl Default for QueryNormalizer {
    fn default() -> Self {
        Self::new(vec!["definition".to_string(), "explained".to_string()])
    }
}

impl QueryNormalizer {
    pub fn new(variant_suffixes: Vec<String>) -> Self {
        Self { variant_suffixes }
    }

    /// Strip interrogative phrasing. Never fails; input that is not a
    /// question comes back unchanged.
    pub fn normalize(&self, raw: &str) -> String {
        let lowered = raw.trim().to_lowercase();

        for (pattern, suffix) in REWRITE_RULES.iter() {
            if let Some(captures) = pattern.captures(&lowered) {
                let subject = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                let tail = captures
                    .get(0)
                    .map(|m| &lowered[m.end()..])
                    .unwrap_or("");
                let rewritten = if suffix.is_empty() {
                    format!("{subject}{tail}")
                } else {
                    format!("{subject} {suffix}{tail}")
                };
                return rewritten.split_whitespace().collect::<Vec<_>>().join(" ");
            }
        }

        let mut words = lowered.split_whitespace();
        match words.next() {
            Some(first) if QUESTION_WORDS.contains(&first) => words.collect::<Vec<_>>().join(" "),
            _ => raw.to_string(),
        }
    }

    /// Normalize, classify and expand in one go. A bare question word
    /// normalizes to nothing, in which case the raw text is searched.
    pub fn plan(&self, query: &str, categories: &CategoryTable) -> QueryPlan {
        let mut normalized = self.normalize(query);
        if normalized.trim().is_empty() {
            normalized = query.trim().to_string();
        }
        let category = categories.classify(query).cloned();
        let variants = self.expand(&normalized, category.as_ref());
        QueryPlan {
            normalized,
            variants,
            category,
        }
    }

    /// Query variants for the search stage: the normalized query first, then
    /// one per configured suffix, then the category extras. Order is kept and
    /// duplicates are dropped.
    pub fn expand(&self, normalized: &str, category: Option<&TopicCategory>) -> Vec<String> {
        let base = normalized.trim();
        if base.is_empty() {
            return Vec::new();
        }

        let extras = category
            .map(|category| category.extra_variants.as_slice())
            .unwrap_or_default();

        let mut variants: Vec<String> = Vec::with_capacity(1 + self.variant_suffixes.len() + extras.len());
        let candidates = std::iter::once(base.to_string()).chain(
            self.variant_suffixes
                .iter()
                .chain(extras.iter())
                .filter(|suffix| !suffix.trim().is_empty())
                .map(|suffix| format!("{base} {}", suffix.trim())),
        );
        for candidate in candidates {
            if !variants.contains(&candidate) {
                variants.push(candidate);
            }
        }
        variants
    }
}
