use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single query taken from a dataset. Immutable once loaded.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryItem {
    pub query: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl QueryItem {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            metadata: serde_json::Map::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GoldenSetEntry {
    pub query: String,
    pub expected_response: String,
}

/// One judge invocation backing a metric score.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FeedbackCall {
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(default)]
    pub ret: Option<f64>,
    #[serde(default)]
    pub meta: serde_json::Value,
}

/// One row per (recipe, dataset, query) attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvaluationRecord {
    pub record_id: String,
    /// Dataset name the record belongs to.
    pub app_id: String,
    pub input: String,
    pub output: String,
    #[serde(default)]
    pub metric_scores: BTreeMap<String, Option<f64>>,
    #[serde(default)]
    pub feedback_calls: BTreeMap<String, Vec<FeedbackCall>>,
    #[serde(default)]
    pub raw_trace: serde_json::Value,
    #[serde(default)]
    pub total_tokens: Option<i64>,
    #[serde(default)]
    pub latency_seconds: Option<f64>,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    pub ts: String,
}

/// Per (record, metric) scoring job state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackStatus {
    None,
    Running,
    Done,
    Failed,
    Skipped,
}

impl FeedbackStatus {
    pub const ALL: [FeedbackStatus; 5] = [
        FeedbackStatus::None,
        FeedbackStatus::Running,
        FeedbackStatus::Done,
        FeedbackStatus::Failed,
        FeedbackStatus::Skipped,
    ];

    pub fn parse(s: &str) -> Self {
        match s {
            "none" => FeedbackStatus::None,
            "running" => FeedbackStatus::Running,
            "done" => FeedbackStatus::Done,
            "failed" => FeedbackStatus::Failed,
            "skipped" => FeedbackStatus::Skipped,
            _ => FeedbackStatus::None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackStatus::None => "none",
            FeedbackStatus::Running => "running",
            FeedbackStatus::Done => "done",
            FeedbackStatus::Failed => "failed",
            FeedbackStatus::Skipped => "skipped",
        }
    }

    /// Done, failed and skipped jobs will not change state again.
    pub fn is_resolved(&self) -> bool {
        matches!(
            self,
            FeedbackStatus::Done | FeedbackStatus::Failed | FeedbackStatus::Skipped
        )
    }
}

/// Aggregated job counts as reported by a scoring backend.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StatusCounts(pub BTreeMap<FeedbackStatus, u64>);

impl StatusCounts {
    pub fn get(&self, status: FeedbackStatus) -> u64 {
        self.0.get(&status).copied().unwrap_or(0)
    }

    pub fn set(&mut self, status: FeedbackStatus, count: u64) {
        self.0.insert(status, count);
    }

    pub fn resolved(&self) -> u64 {
        self.0
            .iter()
            .filter(|(s, _)| s.is_resolved())
            .map(|(_, n)| *n)
            .sum()
    }

    pub fn total(&self) -> u64 {
        self.0.values().sum()
    }
}

/// Answer plus call trace produced by one recipe invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RecipeOutput {
    pub answer: String,
    #[serde(default)]
    pub trace: serde_json::Value,
    #[serde(default)]
    pub total_tokens: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_str() {
        for s in FeedbackStatus::ALL {
            assert_eq!(FeedbackStatus::parse(s.as_str()), s);
        }
        assert_eq!(FeedbackStatus::parse("bogus"), FeedbackStatus::None);
    }

    #[test]
    fn resolved_counts_terminal_states_only() {
        let mut c = StatusCounts::default();
        c.set(FeedbackStatus::None, 3);
        c.set(FeedbackStatus::Running, 1);
        c.set(FeedbackStatus::Done, 5);
        c.set(FeedbackStatus::Failed, 2);
        assert_eq!(c.resolved(), 7);
        assert_eq!(c.total(), 11);
        assert_eq!(c.get(FeedbackStatus::Skipped), 0);
    }
}
