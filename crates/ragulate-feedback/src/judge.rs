use ragulate_core::providers::llm::LlmClient;
use regex::Regex;
use std::sync::{Arc, OnceLock};

pub(crate) const SYSTEM_PROMPT: &str = "You are a strict evaluator of a question answering system. \
Respond only in this format:\n\
Criteria: <the criteria you applied>\n\
Supporting Evidence: <evidence for your score>\n\
Score: <integer from 0 to 10>";

/// Parsed reply of one judge call.
#[derive(Debug, Clone, PartialEq)]
pub struct JudgeVerdict {
    /// Normalized to `[0, 1]`.
    pub score: f64,
    /// Raw judge reply with criteria and evidence.
    pub reason: String,
}

#[derive(Clone)]
pub struct Judge {
    client: Arc<dyn LlmClient>,
}

impl Judge {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    pub async fn ask(&self, prompt: &str) -> anyhow::Result<JudgeVerdict> {
        let resp = self.client.complete(Some(SYSTEM_PROMPT), prompt).await?;
        let score = parse_score(&resp.text).ok_or_else(|| {
            anyhow::anyhow!(
                "judge reply from {}/{} has no score: {:?}",
                resp.provider,
                resp.model,
                truncate(&resp.text, 200)
            )
        })?;
        tracing::debug!(
            event = "judge.score",
            provider = %resp.provider,
            model = %resp.model,
            tokens = ?resp.total_tokens,
            score
        );
        Ok(JudgeVerdict {
            score,
            reason: resp.text,
        })
    }
}

fn score_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)score\s*:\s*([0-9]+(?:\.[0-9]+)?)").ok())
        .as_ref()
}

/// Last `Score: n` in the reply, on a 0-10 scale, mapped to `[0, 1]`.
pub fn parse_score(text: &str) -> Option<f64> {
    let raw: f64 = score_re()?
        .captures_iter(text)
        .last()?
        .get(1)?
        .as_str()
        .parse()
        .ok()?;
    Some(raw.clamp(0.0, 10.0) / 10.0)
}

fn truncate(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragulate_core::providers::llm::fake::FakeClient;

    #[test]
    fn parses_last_score_and_normalizes() {
        assert_eq!(parse_score("Criteria: x\nSupporting Evidence: y\nScore: 7"), Some(0.7));
        assert_eq!(parse_score("score: 3\n...\nScore: 10"), Some(1.0));
        assert_eq!(parse_score("Score: 12"), Some(1.0));
        assert_eq!(parse_score("Score: 8.5"), Some(0.85));
        assert_eq!(parse_score("no number here"), None);
    }

    #[tokio::test]
    async fn unparseable_reply_is_an_error() {
        let judge = Judge::new(Arc::new(FakeClient::new("fake").with_response("I refuse")));
        assert!(judge.ask("q").await.is_err());

        let judge = Judge::new(Arc::new(FakeClient::new("fake")));
        let v = judge.ask("q").await.unwrap();
        assert_eq!(v.score, 1.0);
        assert!(v.reason.starts_with("Criteria:"));
    }
}
