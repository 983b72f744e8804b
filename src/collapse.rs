//! Typing-burst detection
//!
//! Groups one dataset's queries into typing bursts and picks the canonical
//! query of each burst. Pure computation: no I/O, deterministic for a given
//! input order, safe to re-run on the same batch.
//!
//! A burst grows while each next query (by time) is within the window of the
//! previous one and textually related to it. Related means one lower-cased,
//! trimmed text is a prefix of the other, or their character sets overlap by
//! more than [`OVERLAP_THRESHOLD`].

use crate::models::SearchQuery;
use std::collections::HashSet;
use tracing::debug;

/// Character-set overlap a pair must strictly exceed to count as related
pub const OVERLAP_THRESHOLD: f64 = 0.80;

/// Return the rows of `queries` that must be marked duplicate, each with the
/// duplicate flag set. `window_secs` is the largest gap (inclusive) between
/// consecutive queries of a burst.
pub fn collapse_queries(queries: &[SearchQuery], window_secs: f64) -> Vec<SearchQuery> {
    if queries.len() <= 1 {
        return Vec::new();
    }

    let bursts = group_bursts(queries, window_secs);

    let mut duplicates = Vec::new();
    for burst in bursts.iter().filter(|b| b.len() > 1) {
        let canonical = canonical_index(burst);
        duplicates.extend(
            burst
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != canonical)
                .map(|(_, q)| q.as_duplicate()),
        );
    }

    debug!(
        rows = queries.len(),
        bursts = bursts.len(),
        duplicates = duplicates.len(),
        "Collapsed batch"
    );

    duplicates
}

/// Split the batch into typing bursts, oldest first.
///
/// Rows are ordered by `created_at` with a stable sort, so rows sharing a
/// timestamp keep their batch order.
pub fn group_bursts(queries: &[SearchQuery], window_secs: f64) -> Vec<Vec<&SearchQuery>> {
    let mut sorted: Vec<&SearchQuery> = queries.iter().collect();
    sorted.sort_by_key(|q| q.created_at);

    let mut bursts = Vec::new();
    let mut iter = sorted.into_iter();
    let Some(first) = iter.next() else {
        return bursts;
    };

    let mut current = vec![first];
    for query in iter {
        let prev = current[current.len() - 1];
        if seconds_between(prev, query) <= window_secs && is_related(&prev.query, &query.query) {
            current.push(query);
        } else {
            bursts.push(std::mem::replace(&mut current, vec![query]));
        }
    }
    bursts.push(current);

    bursts
}

/// Whether two query texts look like steps of the same typing sequence
pub fn is_related(a: &str, b: &str) -> bool {
    let a = a.trim().to_lowercase();
    let b = b.trim().to_lowercase();

    a.starts_with(&b) || b.starts_with(&a) || char_overlap(&a, &b) > OVERLAP_THRESHOLD
}

/// Shared distinct characters divided by the larger character-set size.
/// Zero when either text is empty.
pub fn char_overlap(a: &str, b: &str) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let set_a: HashSet<char> = a.chars().collect();
    let set_b: HashSet<char> = b.chars().collect();
    let shared = set_a.intersection(&set_b).count();

    shared as f64 / set_a.len().max(set_b.len()) as f64
}

/// Index of the longest trimmed text; the earliest wins on equal length.
fn canonical_index(burst: &[&SearchQuery]) -> usize {
    let mut longest = 0;
    let mut max_len = burst[0].trimmed().chars().count();

    for (i, query) in burst.iter().enumerate().skip(1) {
        let len = query.trimmed().chars().count();
        if len > max_len {
            max_len = len;
            longest = i;
        }
    }

    longest
}

fn seconds_between(earlier: &SearchQuery, later: &SearchQuery) -> f64 {
    (later.created_at - earlier.created_at)
        .num_microseconds()
        .map(|us| us as f64 / 1_000_000.0)
        .unwrap_or(f64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{query_at, query_at_micros};
    use uuid::Uuid;

    fn texts(rows: &[SearchQuery]) -> Vec<&str> {
        rows.iter().map(|q| q.query.as_str()).collect()
    }

    fn typed(texts: &[&str], gap_secs: i64) -> Vec<SearchQuery> {
        let dataset = Uuid::new_v4();
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| query_at(dataset, t, i as i64 * gap_secs))
            .collect()
    }

    fn cjk(range: std::ops::Range<u32>) -> String {
        range.filter_map(|c| char::from_u32(0x4E00 + c)).collect()
    }

    #[test]
    fn test_typing_sequence_keeps_final_query() {
        let queries = typed(&["a", "ap", "app", "apple"], 1);
        let duplicates = collapse_queries(&queries, 5.0);

        assert_eq!(texts(&duplicates), vec!["a", "ap", "app"]);
        assert!(duplicates.iter().all(|q| q.is_duplicate));
        assert!(!duplicates.iter().any(|q| q.query == "apple"));
    }

    #[test]
    fn test_unrelated_queries_not_collapsed() {
        let queries = typed(&["cat", "dog"], 1);
        assert!(collapse_queries(&queries, 5.0).is_empty());
    }

    #[test]
    fn test_gap_beyond_window_not_collapsed() {
        let queries = typed(&["search", "search ", "search engine"], 200);
        assert!(collapse_queries(&queries, 5.0).is_empty());
    }

    #[test]
    fn test_empty_and_single_input() {
        assert!(collapse_queries(&[], 5.0).is_empty());
        let one = typed(&["apple"], 1);
        assert!(collapse_queries(&one, 5.0).is_empty());
    }

    #[test]
    fn test_window_boundary_is_inclusive() {
        let dataset = Uuid::new_v4();
        let at_window = vec![query_at(dataset, "ap", 0), query_at(dataset, "apple", 5)];
        assert_eq!(texts(&collapse_queries(&at_window, 5.0)), vec!["ap"]);

        let past_window = vec![
            query_at_micros(dataset, "ap", 0),
            query_at_micros(dataset, "apple", 5_000_001),
        ];
        assert!(collapse_queries(&past_window, 5.0).is_empty());
    }

    #[test]
    fn test_overlap_threshold_is_strict() {
        // 4 of 5 distinct characters shared: exactly 0.80
        assert_eq!(char_overlap("abcde", "abcdf"), 0.8);
        assert!(!is_related("abcde", "abcdf"));

        // 81 of 100 distinct characters shared, neither a prefix of the other
        let a = cjk(0..100);
        let b = format!("{}{}", cjk(200..219), cjk(0..81));
        assert!((char_overlap(&a, &b) - 0.81).abs() < 1e-9);
        assert!(is_related(&a, &b));

        let dataset = Uuid::new_v4();
        let exact = vec![query_at(dataset, "abcde", 0), query_at(dataset, "abcdf", 1)];
        assert!(collapse_queries(&exact, 5.0).is_empty());

        let above = vec![query_at(dataset, &a, 0), query_at(dataset, &b, 1)];
        assert_eq!(collapse_queries(&above, 5.0).len(), 1);
    }

    #[test]
    fn test_overlap_of_empty_text_is_zero() {
        assert_eq!(char_overlap("", "abc"), 0.0);
        assert_eq!(char_overlap("abc", ""), 0.0);
        assert_eq!(char_overlap("", ""), 0.0);
    }

    #[test]
    fn test_relation_ignores_case_and_padding() {
        assert!(is_related("  Apple", "app "));
        assert!(is_related("APP", "apple"));
        assert!(!is_related("cat", "dog"));
    }

    #[test]
    fn test_correction_within_burst_collapses_by_overlap() {
        // "teh" -> "the" shares every character but is no prefix
        let queries = typed(&["teh", "the", "the cat"], 1);
        let duplicates = collapse_queries(&queries, 5.0);
        assert_eq!(texts(&duplicates), vec!["teh", "the"]);
    }

    #[test]
    fn test_first_longest_wins_ties() {
        let dataset = Uuid::new_v4();
        let queries = vec![
            query_at(dataset, "ab", 0),
            query_at(dataset, "abc", 1),
            query_at(dataset, "abd", 2),
        ];
        // "abc" and "abd" share only 2 of 3 characters
        let bursts = group_bursts(&queries, 5.0);
        assert_eq!(bursts.len(), 2);

        let queries = vec![
            query_at(dataset, "ab", 0),
            query_at(dataset, "abc", 1),
            query_at(dataset, "cba", 2),
        ];
        let duplicates = collapse_queries(&queries, 5.0);
        assert_eq!(texts(&duplicates), vec!["ab", "cba"]);
    }

    #[test]
    fn test_canonical_uses_trimmed_length() {
        let dataset = Uuid::new_v4();
        let queries = vec![
            query_at(dataset, "app      ", 0),
            query_at(dataset, "appl", 1),
        ];
        let duplicates = collapse_queries(&queries, 5.0);
        assert_eq!(texts(&duplicates), vec!["app      "]);
    }

    #[test]
    fn test_input_order_does_not_matter() {
        let mut queries = typed(&["a", "ap", "app", "apple"], 1);
        queries.reverse();

        let duplicates = collapse_queries(&queries, 5.0);
        assert_eq!(texts(&duplicates), vec!["a", "ap", "app"]);
    }

    #[test]
    fn test_equal_timestamps_keep_batch_order() {
        let dataset = Uuid::new_v4();
        let queries = vec![
            query_at(dataset, "app", 3),
            query_at(dataset, "ap", 3),
            query_at(dataset, "a", 3),
        ];
        let bursts = group_bursts(&queries, 5.0);
        assert_eq!(bursts.len(), 1);
        let order: Vec<&str> = bursts[0].iter().map(|q| q.query.as_str()).collect();
        assert_eq!(order, vec!["app", "ap", "a"]);
    }

    #[test]
    fn test_deterministic() {
        let queries = typed(&["s", "se", "sea", "cat", "ca", "dog", "doge"], 2);
        let first = collapse_queries(&queries, 5.0);
        let second = collapse_queries(&queries, 5.0);
        assert_eq!(first, second);
        assert_eq!(texts(&first), vec!["s", "se", "ca", "dog"]);
    }

    #[test]
    fn test_multiple_bursts_in_one_batch() {
        let dataset = Uuid::new_v4();
        let queries = vec![
            query_at(dataset, "r", 0),
            query_at(dataset, "ru", 1),
            query_at(dataset, "rust", 2),
            query_at(dataset, "g", 100),
            query_at(dataset, "go", 101),
            query_at(dataset, "lonely", 500),
        ];
        let bursts = group_bursts(&queries, 5.0);
        assert_eq!(bursts.len(), 3);

        let duplicates = collapse_queries(&queries, 5.0);
        assert_eq!(texts(&duplicates), vec!["r", "ru", "g"]);
    }
}
