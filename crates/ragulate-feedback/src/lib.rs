//! Default feedback functions, scored by an LLM judge.

use ragulate_core::feedback_api::Feedback;
use ragulate_core::providers::llm::LlmClient;
use std::sync::Arc;

mod correctness;
mod groundedness;
mod judge;
mod relevance;

pub use correctness::AnswerCorrectness;
pub use groundedness::Groundedness;
pub use judge::{parse_score, Judge, JudgeVerdict};
pub use relevance::{AnswerRelevance, ContextRelevance};

/// answer_correctness, answer_relevance, context_relevance, groundedness
pub fn default_feedbacks(client: Arc<dyn LlmClient>) -> Vec<Arc<dyn Feedback>> {
    let judge = Judge::new(client);
    vec![
        Arc::new(AnswerCorrectness::new(judge.clone())),
        Arc::new(AnswerRelevance::new(judge.clone())),
        Arc::new(ContextRelevance::new(judge.clone())),
        Arc::new(Groundedness::new(judge)),
    ]
}

pub fn feedback_names(feedbacks: &[Arc<dyn Feedback>]) -> Vec<String> {
    feedbacks.iter().map(|f| f.name().to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragulate_core::providers::llm::fake::FakeClient;

    #[test]
    fn default_set_has_four_metrics() {
        let fbs = default_feedbacks(Arc::new(FakeClient::new("fake")));
        assert_eq!(
            feedback_names(&fbs),
            vec![
                "answer_correctness",
                "answer_relevance",
                "context_relevance",
                "groundedness"
            ]
        );
    }
}
