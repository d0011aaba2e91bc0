//! Query supply: deterministic subsampling and resume filtering.

use crate::model::QueryItem;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::HashSet;

/// Returns the working subset of `items` for a sample fraction.
///
/// A fraction outside `(0, 1)` keeps every item in its original order.
/// Otherwise `round(fraction * len)` items are drawn without replacement.
/// With `Some(seed)` the draw is reproducible; `None` uses the thread rng.
pub fn sample_queries(items: &[QueryItem], fraction: f64, seed: Option<u64>) -> Vec<QueryItem> {
    if fraction.is_nan() || fraction <= 0.0 || fraction >= 1.0 {
        return items.to_vec();
    }

    let n = items.len();
    let k = ((fraction * n as f64).round() as usize).min(n);

    let indices = match seed {
        Some(seed) => {
            let mut rng = StdRng::seed_from_u64(seed);
            rand::seq::index::sample(&mut rng, n, k)
        }
        None => {
            let mut rng = rand::thread_rng();
            rand::seq::index::sample(&mut rng, n, k)
        }
    };

    indices.iter().map(|i| items[i].clone()).collect()
}

/// Canonical form of a query string as stored.
///
/// Stores may hold the input JSON-encoded (`"\"What is \\u00e9?\""`); such
/// literals are decoded. Everything else is kept byte for byte.
pub fn normalize_query_text(raw: &str) -> String {
    if raw.len() >= 2 && raw.starts_with('"') && raw.ends_with('"') {
        if let Ok(decoded) = serde_json::from_str::<String>(raw) {
            return decoded;
        }
    }
    raw.to_string()
}

/// Drops items whose query already has a record in the store.
///
/// Identity is the normalized query text; metadata is not considered.
pub fn filter_completed_queries<S: AsRef<str>>(
    items: &[QueryItem],
    existing_inputs: &[S],
) -> Vec<QueryItem> {
    let done: HashSet<String> = existing_inputs
        .iter()
        .map(|s| normalize_query_text(s.as_ref()))
        .collect();

    items
        .iter()
        .filter(|item| !done.contains(&normalize_query_text(&item.query)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_items() -> Vec<QueryItem> {
        vec![
            QueryItem::new("Qu\u{e9}ry 1"),
            QueryItem::new("Query 2"),
            QueryItem::new("Query 3"),
            QueryItem::new("Query 4"),
        ]
    }

    #[test]
    fn out_of_range_fraction_keeps_everything_in_order() {
        let items = four_items();
        for p in [0.0, -0.5, 1.0, 1.5] {
            assert_eq!(sample_queries(&items, p, Some(7)), items);
        }
    }

    #[test]
    fn half_of_four_with_seed_42_is_two_and_reproducible() {
        let items = four_items();
        let first = sample_queries(&items, 0.5, Some(42));
        assert_eq!(first.len(), 2);
        for _ in 0..10 {
            assert_eq!(sample_queries(&items, 0.5, Some(42)), first);
        }
        // no duplicates
        assert_ne!(first[0].query, first[1].query);
    }

    #[test]
    fn sampling_is_deterministic_across_seeds_and_fractions() {
        let items: Vec<QueryItem> = (0..37).map(|i| QueryItem::new(format!("q{i}"))).collect();
        for seed in [0u64, 1, 42, 9_999] {
            for p in [0.1, 0.25, 0.5, 0.9] {
                let a = sample_queries(&items, p, Some(seed));
                let b = sample_queries(&items, p, Some(seed));
                assert_eq!(a, b);
                assert_eq!(a.len(), (p * 37.0_f64).round() as usize);
            }
        }
    }

    #[test]
    fn normalize_decodes_json_literals() {
        assert_eq!(normalize_query_text("\"Qu\\u00e9ry 1\""), "Qu\u{e9}ry 1");
        assert_eq!(normalize_query_text("\"say \\\"hi\\\"\""), "say \"hi\"");
        assert_eq!(normalize_query_text("  plain  "), "  plain  ");
        // lone quote is not a literal
        assert_eq!(normalize_query_text("\""), "\"");
    }

    #[test]
    fn filter_excludes_exactly_the_completed_queries() {
        let items = four_items();
        let existing = vec!["\"Qu\\u00e9ry 1\"".to_string(), "Query 3".to_string()];
        let remaining = filter_completed_queries(&items, &existing);
        let names: Vec<&str> = remaining.iter().map(|i| i.query.as_str()).collect();
        assert_eq!(names, vec!["Query 2", "Query 4"]);
    }

    #[test]
    fn whitespace_differences_are_distinct_queries() {
        let items = vec![QueryItem::new("Query 2"), QueryItem::new(" Query 2 ")];
        let existing = vec!["Query 2".to_string()];
        let remaining = filter_completed_queries(&items, &existing);
        assert_eq!(remaining, vec![QueryItem::new(" Query 2 ")]);
    }

    #[test]
    fn filter_with_no_existing_records_keeps_all() {
        let items = four_items();
        let none: Vec<String> = vec![];
        assert_eq!(filter_completed_queries(&items, &none), items);
    }
}
