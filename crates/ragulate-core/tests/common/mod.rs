#![allow(dead_code)]

use async_trait::async_trait;
use ragulate_core::dataset::Dataset;
use ragulate_core::feedback_api::{Feedback, FeedbackInput, FeedbackOutcome};
use ragulate_core::model::{FeedbackCall, GoldenSetEntry, QueryItem, RecipeOutput, StatusCounts};
use ragulate_core::recipe::{Ingredients, Recipe};
use ragulate_core::scoring::ScoringBackend;
use ragulate_core::storage::Store;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub fn dataset(name: &str, queries: &[&str]) -> Dataset {
    Dataset {
        name: name.to_string(),
        query_items: queries.iter().map(|q| QueryItem::new(*q)).collect(),
        golden_set: queries
            .iter()
            .map(|q| GoldenSetEntry {
                query: q.to_string(),
                expected_response: format!("expected {q}"),
            })
            .collect(),
    }
}

/// Answers every query with a canned trace; fails on selected queries.
pub struct EchoRecipe {
    pub name: String,
    pub ingredients: Ingredients,
    pub fail_on: HashSet<String>,
    pub calls: AtomicUsize,
}

impl EchoRecipe {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ingredients: Ingredients::new(),
            fail_on: HashSet::new(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, query: &str) -> Self {
        self.fail_on.insert(query.to_string());
        self
    }
}

#[async_trait]
impl Recipe for EchoRecipe {
    fn name(&self) -> &str {
        &self.name
    }

    fn ingredients(&self) -> &Ingredients {
        &self.ingredients
    }

    async fn invoke(&self, query: &str) -> anyhow::Result<RecipeOutput> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_on.contains(query) {
            anyhow::bail!("boom on {query}");
        }
        Ok(RecipeOutput {
            answer: format!("answer to {query}"),
            trace: serde_json::json!({"calls": [
                {"name": "retrieve", "args": {"query": query}, "rets": {"context": [format!("context for {query}")]}}
            ]}),
            total_tokens: Some(query.len() as i64),
        })
    }
}

/// Returns scripted status counts; the last entry repeats forever.
#[derive(Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<StatusCounts>>,
    last: Mutex<StatusCounts>,
    pub starts: AtomicUsize,
    pub stops: AtomicUsize,
    pub fail_start: bool,
}

impl ScriptedBackend {
    pub fn new(script: Vec<StatusCounts>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            ..Default::default()
        }
    }

    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Default::default()
        }
    }
}

#[async_trait]
impl ScoringBackend for ScriptedBackend {
    async fn start(&self) -> anyhow::Result<()> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        if self.fail_start {
            anyhow::bail!("backend unavailable");
        }
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn status_counts(&self, _app_ids: &[String]) -> anyhow::Result<StatusCounts> {
        let next = self.script.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(c) = next {
            *last = c;
        }
        Ok(last.clone())
    }
}

/// Reports the real job counts of a store but never scores anything.
pub struct IdleStoreBackend {
    pub store: Store,
    pub stops: AtomicUsize,
}

impl IdleStoreBackend {
    pub fn new(store: Store) -> Self {
        Self {
            store,
            stops: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl ScoringBackend for IdleStoreBackend {
    async fn start(&self) -> anyhow::Result<()> {
        Ok(())
    }

    async fn stop(&self) -> anyhow::Result<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn status_counts(&self, app_ids: &[String]) -> anyhow::Result<StatusCounts> {
        self.store.get_feedback_status_counts_for(app_ids)
    }
}

/// Scores every record with a fixed value and records the ground truth.
pub struct FixedFeedback {
    pub name: &'static str,
    pub score: f64,
}

#[async_trait]
impl Feedback for FixedFeedback {
    fn name(&self) -> &'static str {
        self.name
    }

    async fn evaluate(&self, input: &FeedbackInput<'_>) -> anyhow::Result<FeedbackOutcome> {
        Ok(FeedbackOutcome::scored(
            self.score,
            vec![FeedbackCall {
                args: serde_json::json!({"prompt": input.record.input, "contexts": input.contexts}),
                ret: Some(self.score),
                meta: serde_json::json!({"ground_truth_response": input.ground_truth}),
            }],
        ))
    }
}

pub struct FailingFeedback;

#[async_trait]
impl Feedback for FailingFeedback {
    fn name(&self) -> &'static str {
        "always_fails"
    }

    async fn evaluate(&self, _input: &FeedbackInput<'_>) -> anyhow::Result<FeedbackOutcome> {
        anyhow::bail!("judge unavailable")
    }
}

pub struct SkippingFeedback;

#[async_trait]
impl Feedback for SkippingFeedback {
    fn name(&self) -> &'static str {
        "always_skips"
    }

    async fn evaluate(&self, _input: &FeedbackInput<'_>) -> anyhow::Result<FeedbackOutcome> {
        Ok(FeedbackOutcome::skipped("not applicable"))
    }
}
