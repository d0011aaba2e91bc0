use crate::judge::Judge;
use async_trait::async_trait;
use ragulate_core::feedback_api::{Feedback, FeedbackInput, FeedbackOutcome};
use ragulate_core::model::FeedbackCall;
use serde_json::json;

/// How well the answer's statements are supported by the retrieved contexts.
pub struct Groundedness {
    judge: Judge,
}

impl Groundedness {
    pub fn new(judge: Judge) -> Self {
        Self { judge }
    }
}

#[async_trait]
impl Feedback for Groundedness {
    fn name(&self) -> &'static str {
        "groundedness"
    }

    async fn evaluate(&self, input: &FeedbackInput<'_>) -> anyhow::Result<FeedbackOutcome> {
        if input.contexts.is_empty() {
            return Ok(FeedbackOutcome::skipped("no contexts retrieved"));
        }
        let record = input.record;
        let sources = input
            .contexts
            .iter()
            .enumerate()
            .map(|(i, c)| format!("[{}] {}", i + 1, c))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "Rate how well every statement in the STATEMENT is supported by the SOURCE. \
             10 means fully supported, 0 means not supported at all.\n\n\
             SOURCE:\n{}\n\nSTATEMENT: {}",
            sources, record.output
        );
        let verdict = self.judge.ask(&prompt).await?;
        Ok(FeedbackOutcome::scored(
            verdict.score,
            vec![FeedbackCall {
                args: json!({ "source": input.contexts, "statement": record.output }),
                ret: Some(verdict.score),
                meta: json!({ "reasons": verdict.reason }),
            }],
        ))
    }
}
