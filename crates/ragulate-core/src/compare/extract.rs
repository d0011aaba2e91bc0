//! Typed extraction of qualitative detail from traces and judge calls.
//!
//! Every extractor returns `None` or an empty list on missing or malformed
//! data; none of them can fail.

use crate::model::FeedbackCall;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const REASON_KEYS: [&str; 2] = ["Criteria", "Supporting Evidence"];

/// Splits `Criteria: ... Supporting Evidence: ...` style judge text into
/// its sections. Keys are searched in order; absent keys are left out.
pub fn split_into_dict(text: &str, keys: &[&str]) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let mut remaining = text;

    for (i, key) in keys.iter().enumerate() {
        let marker = format!("{}:", key);
        let Some(start) = remaining.find(&marker) else {
            continue;
        };
        let end = match keys.get(i + 1) {
            Some(next) => remaining
                .find(&format!("{}:", next))
                .filter(|pos| *pos >= start + marker.len())
                .unwrap_or(remaining.len()),
            None => remaining.len(),
        };
        let value = remaining[start + marker.len()..end].trim();
        out.insert(key.to_string(), value.to_string());
        remaining = &remaining[end..];
    }
    out
}

/// Retrieved contexts: the `rets.context` list of the first trace call that
/// has one.
pub fn extract_contexts(trace: &Value) -> Vec<String> {
    let Some(calls) = trace.get("calls").and_then(|c| c.as_array()) else {
        return Vec::new();
    };
    for call in calls {
        if let Some(ctx) = call.get("rets").and_then(|r| r.get("context")) {
            return match ctx {
                Value::Array(items) => items.iter().map(value_to_text).collect(),
                Value::Null => Vec::new(),
                other => vec![value_to_text(other)],
            };
        }
    }
    Vec::new()
}

/// Expected response recorded by the answer correctness judge.
pub fn extract_ground_truth(calls: Option<&[FeedbackCall]>) -> Option<String> {
    calls?
        .first()?
        .meta
        .get("ground_truth_response")?
        .as_str()
        .map(str::to_string)
}

/// Criteria and supporting evidence of the first judge call.
pub fn extract_reason(calls: Option<&[FeedbackCall]>) -> Option<BTreeMap<String, String>> {
    let reason = calls?.first()?.meta.get("reason")?.as_str()?;
    Some(split_into_dict(reason, &REASON_KEYS))
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextReason {
    pub context: Option<String>,
    pub score: Option<f64>,
    pub reason: BTreeMap<String, String>,
}

/// One entry per context judged for context relevance.
pub fn extract_context_relevance_reasons(calls: Option<&[FeedbackCall]>) -> Option<Vec<ContextReason>> {
    let reasons: Vec<ContextReason> = calls?
        .iter()
        .map(|call| ContextReason {
            context: call.args.get("context").map(value_to_text),
            score: call.ret,
            reason: call
                .meta
                .get("reason")
                .and_then(|r| r.as_str())
                .map(|r| split_into_dict(r, &REASON_KEYS))
                .unwrap_or_default(),
        })
        .collect();
    (!reasons.is_empty()).then_some(reasons)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroundednessReasons {
    pub contexts: Vec<String>,
    pub reasons: Option<String>,
}

pub fn extract_groundedness_reasons(calls: Option<&[FeedbackCall]>) -> Option<GroundednessReasons> {
    let call = calls?.first()?;
    let contexts = match call.args.get("source") {
        Some(Value::Array(items)) => items.iter().map(value_to_text).collect(),
        Some(Value::String(s)) => vec![s.clone()],
        _ => Vec::new(),
    };
    Some(GroundednessReasons {
        contexts,
        reasons: call
            .meta
            .get("reasons")
            .and_then(|r| r.as_str())
            .map(str::to_string),
    })
}

fn value_to_text(v: &Value) -> String {
    match v {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
