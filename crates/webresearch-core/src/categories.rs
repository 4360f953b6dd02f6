//! Topic categories: per-topic search knobs and trusted-source tables.
//!
//! A category is selected by keyword match against the user query and
//! contributes a region, a time filter, extra query variants and the domain
//! priorities used by the ranker.

use serde::{Deserialize, Serialize};
use url::Url;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomainRule {
    pub domain: String,
    pub priority: u8,
}

impl DomainRule {
    pub fn new(domain: impl Into<String>, priority: u8) -> Self {
        Self {
            domain: domain.into(),
            priority,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicCategory {
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub trusted_domains: Vec<DomainRule>,
    #[serde(default = "TopicCategory::default_priority")]
    pub default_priority: u8,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub time_filter: Option<String>,
    #[serde(default)]
    pub extra_variants: Vec<String>,
}

impl TopicCategory {
    const fn default_priority() -> u8 {
        1
    }

    /// Keywords match whole words only, so `ipl` does not fire on "multiple".
    pub fn matches(&self, query: &str) -> bool {
        let haystack = format!(" {} ", words(query));
        self.keywords.iter().any(|keyword| {
            let needle = words(keyword);
            !needle.is_empty() && haystack.contains(&format!(" {needle} "))
        })
    }

    /// Priority of a result URL; 0 is most trusted. URLs without a parsable
    /// host get the category default.
    pub fn priority_for(&self, url: &str) -> u8 {
        let Some(host) = Url::parse(url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(str::to_ascii_lowercase))
        else {
            return self.default_priority;
        };

        self.trusted_domains
            .iter()
            .find(|rule| host.contains(&rule.domain.to_ascii_lowercase()))
            .map(|rule| rule.priority)
            .unwrap_or(self.default_priority)
    }
}

fn words(text: &str) -> String {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Ordered category table; first match wins.
#[derive(Debug, Clone, Default)]
pub struct CategoryTable {
    categories: Vec<TopicCategory>,
}

impl CategoryTable {
    pub fn new(categories: Vec<TopicCategory>) -> Self {
        Self { categories }
    }

    pub fn classify(&self, query: &str) -> Option<&TopicCategory> {
        self.categories.iter().find(|category| category.matches(query))
    }

    pub fn len(&self) -> usize {
        self.categories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }
}

pub fn default_categories() -> Vec<TopicCategory> {
    vec![
        TopicCategory {
            name: "cricket".to_string(),
            keywords: ["cricket", "ipl", "bcci", "t20", "test match", "odi"]
                .into_iter()
                .map(String::from)
                .collect(),
            trusted_domains: vec![
                DomainRule::new("cricbuzz.com", 0),
                DomainRule::new("espncricinfo.com", 0),
                DomainRule::new("bcci.tv", 0),
                DomainRule::new("ndtv.com", 2),
                DomainRule::new("timesofindia.com", 2),
                DomainRule::new("hindustantimes.com", 2),
            ],
            default_priority: 1,
            region: Some("in".to_string()),
            time_filter: Some("qdr:d".to_string()),
            extra_variants: vec!["latest news".to_string()],
        },
        TopicCategory {
            name: "news".to_string(),
            keywords: vec!["news".to_string(), "latest".to_string()],
            trusted_domains: vec![
                DomainRule::new("reuters.com", 0),
                DomainRule::new("apnews.com", 0),
                DomainRule::new("bbc.com", 0),
            ],
            default_priority: 1,
            region: None,
            time_filter: Some("qdr:d".to_string()),
            extra_variants: Vec::new(),
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_picks_first_matching_category() {
        let table = CategoryTable::new(default_categories());
        let category = table.classify("Latest IPL cricket scores").expect("category");
        assert_eq!(category.name, "cricket");
        assert_eq!(table.classify("news on the markets").unwrap().name, "news");
        assert!(table.classify("rust borrow checker").is_none());
    }

    #[test]
    fn keywords_do_not_match_inside_words() {
        let table = CategoryTable::new(default_categories());
        assert!(table.classify("multiple periodic newsletters").is_none());
        assert_eq!(table.classify("India vs Australia, Test Match!").unwrap().name, "cricket");
    }

    #[test]
    fn priority_matches_host_substring() {
        let table = CategoryTable::new(default_categories());
        let cricket = table.classify("cricket").unwrap();
        assert_eq!(cricket.priority_for("https://www.espncricinfo.com/series/1"), 0);
        assert_eq!(cricket.priority_for("https://sports.ndtv.com/cricket"), 2);
        assert_eq!(cricket.priority_for("https://example.org/"), 1);
        assert_eq!(cricket.priority_for("not a url"), 1);
    }
}
