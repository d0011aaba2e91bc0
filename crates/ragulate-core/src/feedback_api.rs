use crate::model::{EvaluationRecord, FeedbackCall};
use async_trait::async_trait;

/// Everything a feedback function may look at for one record.
#[derive(Debug, Clone)]
pub struct FeedbackInput<'a> {
    pub record: &'a EvaluationRecord,
    /// Retrieved contexts found in the recipe trace.
    pub contexts: Vec<String>,
    /// Expected response from the dataset golden set, if any.
    pub ground_truth: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FeedbackOutcome {
    Scored { score: f64, calls: Vec<FeedbackCall> },
    /// The metric does not apply to this record (e.g. no contexts retrieved).
    Skipped(String),
}

impl FeedbackOutcome {
    pub fn scored(score: f64, calls: Vec<FeedbackCall>) -> Self {
        FeedbackOutcome::Scored { score, calls }
    }

    pub fn skipped(reason: &str) -> Self {
        FeedbackOutcome::Skipped(reason.to_string())
    }
}

/// A quality metric computed per record by the scoring backend.
#[async_trait]
pub trait Feedback: Send + Sync {
    fn name(&self) -> &'static str;

    async fn evaluate(&self, input: &FeedbackInput<'_>) -> anyhow::Result<FeedbackOutcome>;
}
