//! Local JSONL datasets.
//!
//! Each line is an object with `query` and `answer` (or `response`). Every
//! other field becomes metadata of the query item. Lines missing either
//! field are skipped.

use crate::config::DatasetConfig;
use crate::errors::ConfigError;
use crate::model::{GoldenSetEntry, QueryItem};
use anyhow::Context;
use std::collections::HashMap;

#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub name: String,
    pub query_items: Vec<QueryItem>,
    pub golden_set: Vec<GoldenSetEntry>,
}

impl Dataset {
    pub fn load(cfg: &DatasetConfig) -> anyhow::Result<Self> {
        for subset in &cfg.subsets {
            if !cfg.allowed_subsets.is_empty() && !cfg.allowed_subsets.contains(subset) {
                return Err(ConfigError(format!(
                    "subset {} doesn't exist in dataset {}; choices are {:?}",
                    subset, cfg.name, cfg.allowed_subsets
                ))
                .into());
            }
        }
        let raw = std::fs::read_to_string(&cfg.path)
            .with_context(|| format!("failed to read dataset {}", cfg.path.display()))?;
        Self::from_jsonl(&cfg.name, &raw, &cfg.subsets)
            .with_context(|| format!("dataset {} ({})", cfg.name, cfg.path.display()))
    }

    pub fn from_jsonl(name: &str, raw: &str, subsets: &[String]) -> anyhow::Result<Self> {
        let mut ds = Dataset {
            name: name.to_string(),
            ..Default::default()
        };

        for (idx, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let value: serde_json::Value = serde_json::from_str(line)
                .with_context(|| format!("line {}: invalid JSON", idx + 1))?;
            let serde_json::Value::Object(mut data) = value else {
                anyhow::bail!("line {}: expected a JSON object", idx + 1);
            };

            if !subsets.is_empty() {
                let kind = data.get("question_type").and_then(|v| v.as_str());
                if !kind.is_some_and(|k| subsets.iter().any(|s| s == k)) {
                    continue;
                }
            }

            let query = data.remove("query");
            let answer = data.remove("answer").or_else(|| data.remove("response"));
            let (Some(serde_json::Value::String(query)), Some(answer)) = (query, answer) else {
                tracing::debug!(event = "dataset.skip_line", line = idx + 1, "missing query or answer");
                continue;
            };
            let expected_response = match answer {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };

            ds.golden_set.push(GoldenSetEntry {
                query: query.clone(),
                expected_response,
            });
            ds.query_items.push(QueryItem {
                query,
                metadata: data,
            });
        }
        Ok(ds)
    }

    /// query text -> expected response
    pub fn golden_lookup(&self) -> HashMap<String, String> {
        self.golden_set
            .iter()
            .map(|g| (g.query.clone(), g.expected_response.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const LINES: &str = r#"{"query": "q1", "answer": "a1", "question_type": "simple", "domain": "finance"}
{"query": "q2", "response": "a2", "question_type": "comparison"}

{"query": "q3"}
{"query": "q4", "answer": 4, "question_type": "simple"}
"#;

    #[test]
    fn loads_items_metadata_and_golden_set() {
        let ds = Dataset::from_jsonl("crag", LINES, &[]).unwrap();
        let queries: Vec<&str> = ds.query_items.iter().map(|q| q.query.as_str()).collect();
        assert_eq!(queries, vec!["q1", "q2", "q4"]);
        assert_eq!(ds.query_items[0].metadata["domain"], "finance");
        assert!(!ds.query_items[0].metadata.contains_key("query"));
        assert_eq!(ds.golden_lookup()["q4"], "4");
        assert_eq!(ds.golden_lookup()["q2"], "a2");
    }

    #[test]
    fn subsets_filter_on_question_type() {
        let ds = Dataset::from_jsonl("crag", LINES, &["simple".to_string()]).unwrap();
        assert_eq!(ds.query_items.len(), 2);
    }

    #[test]
    fn unknown_subset_is_a_config_error() {
        let cfg = DatasetConfig {
            name: "crag".into(),
            path: "missing.jsonl".into(),
            subsets: vec!["bogus".into()],
            allowed_subsets: vec!["simple".into()],
        };
        let err = Dataset::load(&cfg).unwrap_err();
        assert!(crate::errors::is_config_error(&err));
    }

    #[test]
    fn invalid_line_is_an_error() {
        assert!(Dataset::from_jsonl("x", "{not json}\n", &[]).is_err());
    }
}
