use crate::judge::Judge;
use async_trait::async_trait;
use ragulate_core::feedback_api::{Feedback, FeedbackInput, FeedbackOutcome};
use ragulate_core::model::FeedbackCall;
use serde_json::json;

/// Agreement of the answer with the dataset's expected response.
pub struct AnswerCorrectness {
    judge: Judge,
}

impl AnswerCorrectness {
    pub fn new(judge: Judge) -> Self {
        Self { judge }
    }
}

#[async_trait]
impl Feedback for AnswerCorrectness {
    fn name(&self) -> &'static str {
        "answer_correctness"
    }

    async fn evaluate(&self, input: &FeedbackInput<'_>) -> anyhow::Result<FeedbackOutcome> {
        let Some(expected) = input.ground_truth else {
            return Ok(FeedbackOutcome::skipped("no expected response in golden set"));
        };
        let record = input.record;
        let prompt = format!(
            "Rate how well the ANSWER agrees with the EXPECTED ANSWER for the QUESTION. \
             10 means it states the same facts, 0 means it contradicts or misses them.\n\n\
             QUESTION: {}\n\nEXPECTED ANSWER: {}\n\nANSWER: {}",
            record.input, expected, record.output
        );
        let verdict = self.judge.ask(&prompt).await?;
        Ok(FeedbackOutcome::scored(
            verdict.score,
            vec![FeedbackCall {
                args: json!({ "prompt": record.input, "response": record.output }),
                ret: Some(verdict.score),
                meta: json!({ "ground_truth_response": expected, "reason": verdict.reason }),
            }],
        ))
    }
}
