use crate::judge::Judge;
use async_trait::async_trait;
use ragulate_core::feedback_api::{Feedback, FeedbackInput, FeedbackOutcome};
use ragulate_core::model::FeedbackCall;
use serde_json::json;

/// Relevance of the answer to the question.
pub struct AnswerRelevance {
    judge: Judge,
}

impl AnswerRelevance {
    pub fn new(judge: Judge) -> Self {
        Self { judge }
    }
}

#[async_trait]
impl Feedback for AnswerRelevance {
    fn name(&self) -> &'static str {
        "answer_relevance"
    }

    async fn evaluate(&self, input: &FeedbackInput<'_>) -> anyhow::Result<FeedbackOutcome> {
        let record = input.record;
        let prompt = format!(
            "Rate how relevant the RESPONSE is to the PROMPT. \
             10 means it fully answers the prompt, 0 means it is unrelated.\n\n\
             PROMPT: {}\n\nRESPONSE: {}",
            record.input, record.output
        );
        let verdict = self.judge.ask(&prompt).await?;
        Ok(FeedbackOutcome::scored(
            verdict.score,
            vec![FeedbackCall {
                args: json!({ "prompt": record.input, "response": record.output }),
                ret: Some(verdict.score),
                meta: json!({ "reason": verdict.reason }),
            }],
        ))
    }
}

/// Mean relevance of each retrieved context to the question.
pub struct ContextRelevance {
    judge: Judge,
}

impl ContextRelevance {
    pub fn new(judge: Judge) -> Self {
        Self { judge }
    }
}

#[async_trait]
impl Feedback for ContextRelevance {
    fn name(&self) -> &'static str {
        "context_relevance"
    }

    async fn evaluate(&self, input: &FeedbackInput<'_>) -> anyhow::Result<FeedbackOutcome> {
        if input.contexts.is_empty() {
            return Ok(FeedbackOutcome::skipped("no contexts retrieved"));
        }
        let question = &input.record.input;
        let mut calls = Vec::with_capacity(input.contexts.len());
        for context in &input.contexts {
            let prompt = format!(
                "Rate how relevant the CONTEXT is for answering the QUESTION. \
                 10 means it contains the answer, 0 means it is unrelated.\n\n\
                 QUESTION: {}\n\nCONTEXT: {}",
                question, context
            );
            let verdict = self.judge.ask(&prompt).await?;
            calls.push(FeedbackCall {
                args: json!({ "question": question, "context": context }),
                ret: Some(verdict.score),
                meta: json!({ "reason": verdict.reason }),
            });
        }
        let mean = calls.iter().filter_map(|c| c.ret).sum::<f64>() / calls.len() as f64;
        Ok(FeedbackOutcome::scored(mean, calls))
    }
}
