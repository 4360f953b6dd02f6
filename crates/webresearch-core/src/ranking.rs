use std::collections::HashSet;

use crate::categories::TopicCategory;
use crate::search::SearchResult;

/// Drop invalid links and duplicates, order by trusted-source priority when a
/// category applies, then cap at `limit`.
///
/// Deduplication is by exact URL and keeps the first occurrence. The sort is
/// stable, so results with equal priority keep their search order.
pub fn rank(
    results: Vec<SearchResult>,
    category: Option<&TopicCategory>,
    limit: usize,
) -> Vec<SearchResult> {
    let mut seen = HashSet::new();
    let mut unique: Vec<SearchResult> = results
        .into_iter()
        .filter(|result| result.url.starts_with("http"))
        .filter(|result| seen.insert(result.url.clone()))
        .collect();

    if let Some(category) = category {
        unique.sort_by_key(|result| category.priority_for(&result.url));
    }

    unique.truncate(limit);
    unique
}
