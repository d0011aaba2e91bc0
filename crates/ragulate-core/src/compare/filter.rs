use super::merge::RecipeResults;
use crate::errors::ConfigError;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Exact-match filter over record metadata, built from `key=value` pairs.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetadataFilter {
    pairs: Vec<(String, String)>,
}

impl MetadataFilter {
    pub fn parse<S: AsRef<str>>(raw: &[S]) -> Result<Self, ConfigError> {
        let mut pairs = Vec::with_capacity(raw.len());
        for item in raw {
            let item = item.as_ref();
            let Some((key, value)) = item.split_once('=') else {
                return Err(ConfigError(format!(
                    "invalid metadata filter {:?}: expected key=value",
                    item
                )));
            };
            let key = key.trim();
            if key.is_empty() {
                return Err(ConfigError(format!(
                    "invalid metadata filter {:?}: empty key",
                    item
                )));
            }
            pairs.push((key.to_string(), value.trim().to_string()));
        }
        Ok(Self { pairs })
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// True when every pair is present with exactly that value.
    pub fn matches(&self, metadata: &Value) -> bool {
        self.pairs.iter().all(|(key, want)| {
            metadata
                .get(key)
                .is_some_and(|got| metadata_value_text(got) == *want)
        })
    }
}

/// Distinct values seen per metadata key across every recipe's records.
pub fn metadata_options(results: &[RecipeResults]) -> BTreeMap<String, BTreeSet<String>> {
    let mut options: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for r in results {
        for record in &r.records {
            for (key, value) in &record.metadata {
                if value.is_object() || value.is_array() {
                    continue;
                }
                options
                    .entry(key.clone())
                    .or_default()
                    .insert(metadata_value_text(value));
            }
        }
    }
    options
}

fn metadata_value_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
