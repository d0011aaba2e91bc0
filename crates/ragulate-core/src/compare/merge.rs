use super::extract::{
    extract_context_relevance_reasons, extract_contexts, extract_ground_truth,
    extract_groundedness_reasons, extract_reason,
};
use super::filter::MetadataFilter;
use super::table::ComparisonTable;
use crate::model::EvaluationRecord;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

const TOKENS: &str = "total_tokens";

/// All records of one recipe for one dataset, with the metric names known
/// to its store.
#[derive(Debug, Clone, Default)]
pub struct RecipeResults {
    pub recipe: String,
    pub records: Vec<EvaluationRecord>,
    pub metric_names: Vec<String>,
}

impl RecipeResults {
    pub fn new(recipe: impl Into<String>, records: Vec<EvaluationRecord>, metric_names: Vec<String>) -> Self {
        Self {
            recipe: recipe.into(),
            records,
            metric_names,
        }
    }
}

/// Metric names present in every recipe, in the first recipe's order.
pub fn common_metrics(results: &[RecipeResults]) -> Vec<String> {
    let Some((first, rest)) = results.split_first() else {
        return Vec::new();
    };
    let sets: Vec<HashSet<&str>> = rest
        .iter()
        .map(|r| r.metric_names.iter().map(String::as_str).collect())
        .collect();
    let mut seen = HashSet::new();
    first
        .metric_names
        .iter()
        .filter(|m| sets.iter().all(|s| s.contains(m.as_str())))
        .filter(|m| seen.insert(m.as_str()))
        .cloned()
        .collect()
}

/// Merges per-recipe results into one row per distinct input.
///
/// Returns the table and the numeric columns that are compared across
/// recipes (common metrics plus `total_tokens`). With exactly two recipes
/// each of those gets a `<name>__diff` column holding `first - second`.
pub fn combine_and_calculate_diff(
    results: &[RecipeResults],
    filter: Option<&MetadataFilter>,
) -> anyhow::Result<(ComparisonTable, Vec<String>)> {
    if results.is_empty() {
        anyhow::bail!("nothing to compare: no recipes given");
    }
    let mut names = HashSet::new();
    for r in results {
        if !names.insert(r.recipe.as_str()) {
            anyhow::bail!("recipe {} given more than once", r.recipe);
        }
    }

    let metrics = common_metrics(results);
    let mut diff_columns = metrics.clone();
    diff_columns.push(TOKENS.to_string());

    let per_recipe: Vec<RecipeColumns> = results.iter().map(RecipeColumns::build).collect();

    let inputs: BTreeSet<&str> = per_recipe
        .iter()
        .flat_map(|r| r.rows.keys().map(String::as_str))
        .collect();

    let mut rows: Vec<BTreeMap<String, Value>> = Vec::with_capacity(inputs.len());
    for input in inputs {
        let mut row = BTreeMap::new();
        row.insert("input".to_string(), Value::String(input.to_string()));

        // shared columns come from the first recipe that has a value
        let ground_truth = per_recipe
            .iter()
            .filter_map(|r| r.rows.get(input))
            .find_map(|c| c.ground_truth.clone());
        row.insert(
            "ground_truth".to_string(),
            ground_truth.map(Value::String).unwrap_or(Value::Null),
        );
        let metadata = per_recipe
            .iter()
            .filter_map(|r| r.rows.get(input))
            .map(|c| c.metadata.clone())
            .next()
            .unwrap_or(Value::Null);
        row.insert("metadata".to_string(), metadata);

        for r in &per_recipe {
            let cells = r.rows.get(input);
            for col in &r.columns {
                let v = cells
                    .and_then(|c| c.values.get(col))
                    .cloned()
                    .unwrap_or(Value::Null);
                row.insert(format!("{}_{}", col, r.recipe), v);
            }
        }
        rows.push(row);
    }

    if let Some(filter) = filter.filter(|f| !f.is_empty()) {
        rows.retain(|row| row.get("metadata").is_some_and(|m| filter.matches(m)));
    }

    if let [a, b] = results {
        for col in &diff_columns {
            let left = format!("{}_{}", col, a.recipe);
            let right = format!("{}_{}", col, b.recipe);
            for row in &mut rows {
                let d = diff_values(row.get(&left), row.get(&right));
                row.insert(format!("{}__diff", col), d);
            }
        }
    }

    // column order: input, ground_truth, outputs in recipe order, rest sorted
    let outputs: Vec<String> = results.iter().map(|r| format!("output_{}", r.recipe)).collect();
    let mut rest: BTreeSet<String> = per_recipe
        .iter()
        .flat_map(|r| r.columns.iter().map(move |c| format!("{}_{}", c, r.recipe)))
        .filter(|c| !outputs.contains(c))
        .collect();
    rest.insert("metadata".to_string());
    if results.len() == 2 {
        rest.extend(diff_columns.iter().map(|c| format!("{}__diff", c)));
    }

    let mut columns = vec!["input".to_string(), "ground_truth".to_string()];
    columns.extend(outputs);
    columns.extend(rest);

    let rows = rows
        .into_iter()
        .map(|mut row| {
            columns
                .iter()
                .map(|c| row.remove(c).unwrap_or(Value::Null))
                .collect()
        })
        .collect();

    Ok((ComparisonTable { columns, rows }, diff_columns))
}

/// Per-recipe columns (unsuffixed) and cell values keyed by input.
struct RecipeColumns {
    recipe: String,
    columns: Vec<String>,
    rows: HashMap<String, RowCells>,
}

struct RowCells {
    ground_truth: Option<String>,
    metadata: Value,
    values: HashMap<String, Value>,
}

impl RecipeColumns {
    fn build(results: &RecipeResults) -> Self {
        let mut columns = vec![
            "output".to_string(),
            TOKENS.to_string(),
            "latency_seconds".to_string(),
            "contexts".to_string(),
        ];
        for m in &results.metric_names {
            if !columns.contains(m) {
                columns.push(m.clone());
            }
            if let Some(reason_col) = reason_column(m) {
                columns.push(reason_col.to_string());
            }
        }

        // latest record per input wins
        let mut latest: HashMap<&str, &EvaluationRecord> = HashMap::new();
        for rec in &results.records {
            match latest.get(rec.input.as_str()) {
                Some(prev) if prev.ts > rec.ts => {}
                _ => {
                    latest.insert(rec.input.as_str(), rec);
                }
            }
        }

        let rows = latest
            .into_iter()
            .map(|(input, rec)| (input.to_string(), cells_for(rec, &results.metric_names)))
            .collect();

        Self {
            recipe: results.recipe.clone(),
            columns,
            rows,
        }
    }
}

fn reason_column(metric: &str) -> Option<&'static str> {
    match metric {
        "answer_relevance" => Some("answer_relevance_reason"),
        "context_relevance" => Some("context_relevance_reasons"),
        "groundedness" => Some("groundedness_reasons"),
        _ => None,
    }
}

fn cells_for(rec: &EvaluationRecord, metric_names: &[String]) -> RowCells {
    let calls = |name: &str| rec.feedback_calls.get(name).map(Vec::as_slice);

    let mut values = HashMap::new();
    values.insert("output".to_string(), Value::String(rec.output.clone()));
    values.insert(
        TOKENS.to_string(),
        rec.total_tokens.map(Value::from).unwrap_or(Value::Null),
    );
    values.insert("latency_seconds".to_string(), float_value(rec.latency_seconds));
    values.insert(
        "contexts".to_string(),
        Value::from(extract_contexts(&rec.raw_trace)),
    );

    for m in metric_names {
        let score = rec.metric_scores.get(m).copied().flatten();
        values.insert(m.clone(), float_value(score));
        let detail = match m.as_str() {
            "answer_relevance" => to_json(extract_reason(calls(m))),
            "context_relevance" => to_json(extract_context_relevance_reasons(calls(m))),
            "groundedness" => to_json(extract_groundedness_reasons(calls(m))),
            _ => continue,
        };
        if let Some(col) = reason_column(m) {
            values.insert(col.to_string(), detail);
        }
    }

    RowCells {
        ground_truth: extract_ground_truth(calls("answer_correctness")),
        metadata: Value::Object(rec.metadata.clone()),
        values,
    }
}

fn to_json<T: serde::Serialize>(v: Option<T>) -> Value {
    v.and_then(|v| serde_json::to_value(v).ok())
        .unwrap_or(Value::Null)
}

fn float_value(v: Option<f64>) -> Value {
    v.and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or(Value::Null)
}

/// `a - b`, integer when both sides are integers, null if either is missing.
fn diff_values(a: Option<&Value>, b: Option<&Value>) -> Value {
    let (Some(a), Some(b)) = (a, b) else {
        return Value::Null;
    };
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Value::from(x.saturating_sub(y));
    }
    match (a.as_f64(), b.as_f64()) {
        (Some(x), Some(y)) => float_value(Some(x - y)),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(input: &str, ts: &str, scores: &[(&str, Option<f64>)]) -> EvaluationRecord {
        EvaluationRecord {
            record_id: format!("record_{input}_{ts}"),
            app_id: "ds".into(),
            input: input.into(),
            output: format!("answer to {input}"),
            metric_scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
            total_tokens: Some(10),
            ts: ts.into(),
            ..Default::default()
        }
    }

    #[test]
    fn common_metrics_is_an_intersection() {
        let a = RecipeResults::new("a", vec![], vec!["x".into(), "y".into(), "z".into()]);
        let b = RecipeResults::new("b", vec![], vec!["z".into(), "x".into()]);
        assert_eq!(common_metrics(&[a, b]), vec!["x", "z"]);
    }

    #[test]
    fn duplicate_inputs_keep_latest_record() {
        let r = RecipeResults::new(
            "a",
            vec![
                record("q", "2024-01-02T00:00:00Z", &[("m", Some(0.9))]),
                record("q", "2024-01-01T00:00:00Z", &[("m", Some(0.1))]),
            ],
            vec!["m".into()],
        );
        let (table, _) = combine_and_calculate_diff(&[r], None).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(table.get(0, "m_a"), Some(&json!(0.9)));
    }

    #[test]
    fn same_recipe_twice_is_rejected() {
        let a = RecipeResults::new("a", vec![], vec![]);
        assert!(combine_and_calculate_diff(&[a.clone(), a], None).is_err());
        assert!(combine_and_calculate_diff(&[], None).is_err());
    }

    #[test]
    fn diff_is_integer_for_tokens_and_null_propagating() {
        assert_eq!(diff_values(Some(&json!(12)), Some(&json!(5))), json!(7));
        assert_eq!(diff_values(Some(&json!(1)), Some(&Value::Null)), Value::Null);
        assert_eq!(diff_values(None, Some(&json!(1.0))), Value::Null);
        let d = diff_values(Some(&json!(0.8)), Some(&json!(0.6))).as_f64().unwrap();
        assert!((d - 0.2).abs() < 1e-9);
    }
}
