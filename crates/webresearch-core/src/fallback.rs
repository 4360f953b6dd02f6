//! Canned results served when the search provider is unavailable.

use url::form_urlencoded;

use crate::search::{SearchEngine, SearchResult};

const MACHINE_LEARNING: &[(&str, &str, &str)] = &[
    (
        "Machine Learning - Wikipedia",
        "https://en.wikipedia.org/wiki/Machine_learning",
        "Machine learning (ML) is a field of study in artificial intelligence concerned with the development and study of statistical algorithms that can learn from data and generalize to unseen data, and thus perform tasks without explicit instructions.",
    ),
    (
        "What is Machine Learning? | IBM",
        "https://www.ibm.com/topics/machine-learning",
        "Machine learning is a branch of artificial intelligence (AI) and computer science which focuses on the use of data and algorithms to imitate the way that humans learn, gradually improving its accuracy.",
    ),
    (
        "Machine Learning | MIT Sloan",
        "https://mitsloan.mit.edu/ideas-made-to-matter/machine-learning-explained",
        "Machine learning is a form of artificial intelligence that teaches computers to think in a similar way to how humans do: learning and improving upon past experiences.",
    ),
];

const ARTIFICIAL_INTELLIGENCE: &[(&str, &str, &str)] = &[
    (
        "Artificial Intelligence - Wikipedia",
        "https://en.wikipedia.org/wiki/Artificial_intelligence",
        "Artificial intelligence (AI) is the intelligence of machines or software, as opposed to the intelligence of humans or animals. It is also a field of study in computer science that develops and studies intelligent machines.",
    ),
    (
        "What is Artificial Intelligence (AI)? | IBM",
        "https://www.ibm.com/topics/artificial-intelligence",
        "Artificial intelligence is a field of science concerned with building computers and machines that can reason, learn, and act in such a way that would normally require human intelligence.",
    ),
];

/// Look up fallback results for a query. Always returns at least one entry.
pub fn lookup(query: &str) -> Vec<SearchResult> {
    let lowered = query.to_lowercase();

    let catalogue = if lowered.contains("machine learning") {
        Some(MACHINE_LEARNING)
    } else if lowered.contains("artificial intelligence")
        || lowered.split_whitespace().any(|token| token == "ai")
    {
        Some(ARTIFICIAL_INTELLIGENCE)
    } else {
        None
    };

    match catalogue {
        Some(entries) => entries
            .iter()
            .map(|(title, url, snippet)| SearchResult {
                title: (*title).to_string(),
                url: (*url).to_string(),
                snippet: (*snippet).to_string(),
                engine: SearchEngine::Fallback,
                date: None,
            })
            .collect(),
        None => vec![generic(query)],
    }
}

fn generic(query: &str) -> SearchResult {
    let encoded: String = form_urlencoded::byte_serialize(query.as_bytes()).collect();
    SearchResult {
        title: format!("Information about {query}"),
        url: format!("https://www.google.com/search?q={encoded}"),
        snippet: format!(
            "No specific information available for \"{query}\". This link will perform a general web search for this topic."
        ),
        engine: SearchEngine::Fallback,
        date: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn machine_learning_has_three_entries() {
        let results = lookup("machine learning");
        let urls: Vec<_> = results.iter().map(|r| r.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://en.wikipedia.org/wiki/Machine_learning",
                "https://www.ibm.com/topics/machine-learning",
                "https://mitsloan.mit.edu/ideas-made-to-matter/machine-learning-explained",
            ]
        );
        assert!(results.iter().all(|r| r.engine == SearchEngine::Fallback));
    }

    #[test]
    fn ai_token_matches_only_as_whole_word() {
        assert_eq!(lookup("future of AI in medicine").len(), 2);
        assert_eq!(lookup("Artificial Intelligence basics").len(), 2);
        let generic = lookup("email marketing");
        assert_eq!(generic.len(), 1);
        assert_eq!(generic[0].title, "Information about email marketing");
    }

    #[test]
    fn generic_entry_points_at_search_url() {
        let results = lookup("rust borrow checker");
        assert_eq!(
            results[0].url,
            "https://www.google.com/search?q=rust+borrow+checker"
        );
    }
}
