use ragulate_core::compare::{
    combine_and_calculate_diff, load_recipe_results, metadata_options, MetadataFilter, RecipeResults,
};
use ragulate_core::model::{EvaluationRecord, FeedbackCall};
use ragulate_core::storage::store::new_record_id;
use ragulate_core::storage::Store;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tempfile::tempdir;

fn record(input: &str, scores: &[(&str, Option<f64>)], tokens: Option<i64>) -> EvaluationRecord {
    let mut feedback_calls = BTreeMap::new();
    feedback_calls.insert(
        "answer_correctness".to_string(),
        vec![FeedbackCall {
            args: json!({}),
            ret: Some(1.0),
            meta: json!({"ground_truth_response": format!("truth of {input}")}),
        }],
    );
    EvaluationRecord {
        record_id: new_record_id("ds", input),
        app_id: "ds".into(),
        input: input.into(),
        output: format!("out {input}"),
        metric_scores: scores.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        feedback_calls,
        total_tokens: tokens,
        metadata: json!({"domain": if input == "q1" { "finance" } else { "music" }})
            .as_object()
            .cloned()
            .unwrap(),
        ts: "2024-01-01T00:00:00Z".into(),
        ..Default::default()
    }
}

fn names(ns: &[&str]) -> Vec<String> {
    ns.iter().map(|s| s.to_string()).collect()
}

#[test]
fn test_two_recipe_diff_and_outer_join() -> anyhow::Result<()> {
    let a = RecipeResults::new(
        "a",
        vec![
            record("q1", &[("correctness", Some(0.8))], Some(100)),
            record("q2", &[("correctness", Some(0.5))], Some(50)),
        ],
        names(&["correctness"]),
    );
    let b = RecipeResults::new(
        "b",
        vec![record("q1", &[("correctness", Some(0.6))], Some(70))],
        names(&["correctness"]),
    );

    let (table, numeric) = combine_and_calculate_diff(&[a, b], None)?;
    assert_eq!(numeric, names(&["correctness", "total_tokens"]));
    assert_eq!(table.len(), 2);

    let q1 = table.row_for_input("q1").unwrap();
    let diff = table.get(q1, "correctness__diff").unwrap().as_f64().unwrap();
    assert!((diff - 0.2).abs() < 1e-9);
    assert_eq!(table.get(q1, "total_tokens__diff"), Some(&json!(30)));
    assert_eq!(table.get(q1, "ground_truth"), Some(&json!("truth of q1")));

    // query missing from b: b's columns are null, diffs are null
    let q2 = table.row_for_input("q2").unwrap();
    assert_eq!(table.get(q2, "output_b"), Some(&Value::Null));
    assert_eq!(table.get(q2, "correctness_b"), Some(&Value::Null));
    assert_eq!(table.get(q2, "correctness__diff"), Some(&Value::Null));
    assert_eq!(table.get(q2, "output_a"), Some(&json!("out q2")));

    assert_eq!(&table.columns[..4], &["input", "ground_truth", "output_a", "output_b"]);
    let rest = &table.columns[4..];
    let mut sorted = rest.to_vec();
    sorted.sort();
    assert_eq!(rest, &sorted[..]);
    assert!(table.columns.contains(&"metadata".to_string()));
    assert!(table.rows.iter().all(|r| r.len() == table.columns.len()));
    Ok(())
}

#[test]
fn test_metric_set_is_the_intersection() -> anyhow::Result<()> {
    let a = RecipeResults::new(
        "a",
        vec![record("q1", &[("x", Some(0.1)), ("y", Some(0.2))], None)],
        names(&["x", "y"]),
    );
    let b = RecipeResults::new(
        "b",
        vec![record("q1", &[("y", Some(0.4)), ("z", Some(0.3))], None)],
        names(&["y", "z"]),
    );
    let (table, numeric) = combine_and_calculate_diff(&[a, b], None)?;
    assert_eq!(numeric, names(&["y", "total_tokens"]));
    assert!(table.has_column("y__diff"));
    assert!(!table.has_column("x__diff"));
    assert!(!table.has_column("z__diff"));
    // per-recipe detail is kept
    assert!(table.has_column("x_a"));
    assert!(table.has_column("z_b"));
    assert_eq!(table.get(0, "total_tokens__diff"), Some(&Value::Null));
    Ok(())
}

#[test]
fn test_no_diff_columns_unless_exactly_two_recipes() -> anyhow::Result<()> {
    let mk = |name: &str, v: f64| {
        RecipeResults::new(name, vec![record("q1", &[("m", Some(v))], Some(1))], names(&["m"]))
    };
    for recipes in [vec![mk("a", 0.1)], vec![mk("a", 0.1), mk("b", 0.2), mk("c", 0.3)]] {
        let (table, numeric) = combine_and_calculate_diff(&recipes, None)?;
        assert_eq!(numeric, names(&["m", "total_tokens"]));
        assert!(table.columns.iter().all(|c| !c.ends_with("__diff")), "{:?}", table.columns);
        assert_eq!(table.len(), 1);
    }
    Ok(())
}

#[test]
fn test_every_query_appears_exactly_once() -> anyhow::Result<()> {
    let a = RecipeResults::new(
        "a",
        vec![record("q1", &[], None), record("q2", &[], None)],
        vec![],
    );
    let b = RecipeResults::new(
        "b",
        vec![record("q2", &[], None), record("q3", &[], None)],
        vec![],
    );
    let c = RecipeResults::new("c", vec![record("q4", &[], None)], vec![]);
    let (table, _) = combine_and_calculate_diff(&[a, b, c], None)?;
    let inputs: Vec<&str> = table
        .column_values("input")
        .into_iter()
        .filter_map(|v| v.as_str())
        .collect();
    assert_eq!(inputs, vec!["q1", "q2", "q3", "q4"]);
    Ok(())
}

#[test]
fn test_zero_record_recipe_contributes_null_columns() -> anyhow::Result<()> {
    let a = RecipeResults::new(
        "a",
        vec![record("q1", &[("m", Some(0.9))], Some(5))],
        names(&["m"]),
    );
    let empty = RecipeResults::new("b", vec![], names(&["m"]));
    let (table, numeric) = combine_and_calculate_diff(&[a, empty], None)?;
    assert_eq!(numeric, names(&["m", "total_tokens"]));
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(0, "m_b"), Some(&Value::Null));
    assert_eq!(table.get(0, "output_b"), Some(&Value::Null));
    assert_eq!(table.get(0, "m__diff"), Some(&Value::Null));
    Ok(())
}

#[test]
fn test_metadata_filter_and_options() -> anyhow::Result<()> {
    let a = RecipeResults::new(
        "a",
        vec![record("q1", &[], None), record("q2", &[], None)],
        vec![],
    );
    let b = RecipeResults::new("b", vec![record("q1", &[], None)], vec![]);

    let options = metadata_options(&[a.clone(), b.clone()]);
    assert_eq!(
        options["domain"].iter().cloned().collect::<Vec<_>>(),
        vec!["finance".to_string(), "music".to_string()]
    );

    let filter = MetadataFilter::parse(&["domain=finance"])?;
    let (table, _) = combine_and_calculate_diff(&[a.clone(), b.clone()], Some(&filter))?;
    assert_eq!(table.len(), 1);
    assert_eq!(table.get(0, "input"), Some(&json!("q1")));

    let filter = MetadataFilter::parse(&["missing_key=x"])?;
    let (table, _) = combine_and_calculate_diff(&[a, b], Some(&filter))?;
    assert!(table.is_empty());
    Ok(())
}

#[test]
fn test_reason_columns_are_extracted_and_tolerate_garbage() -> anyhow::Result<()> {
    let mut good = record("q1", &[("answer_relevance", Some(0.7))], None);
    good.feedback_calls.insert(
        "answer_relevance".into(),
        vec![FeedbackCall {
            args: json!({}),
            ret: Some(0.7),
            meta: json!({"reason": "Criteria: relevant\nSupporting Evidence: cites docs"}),
        }],
    );
    good.raw_trace = json!({"calls": [{"rets": {"context": ["c1"]}}]});
    let mut bad = record("q2", &[("answer_relevance", None)], None);
    bad.feedback_calls.insert(
        "answer_relevance".into(),
        vec![FeedbackCall {
            args: json!("??"),
            ret: None,
            meta: json!(42),
        }],
    );
    bad.raw_trace = json!("not a trace");

    let r = RecipeResults::new("a", vec![good, bad], names(&["answer_relevance"]));
    let (table, _) = combine_and_calculate_diff(&[r], None)?;
    let q1 = table.row_for_input("q1").unwrap();
    assert_eq!(
        table.get(q1, "answer_relevance_reason_a"),
        Some(&json!({"Criteria": "relevant", "Supporting Evidence": "cites docs"}))
    );
    assert_eq!(table.get(q1, "contexts_a"), Some(&json!(["c1"])));
    let q2 = table.row_for_input("q2").unwrap();
    assert_eq!(table.get(q2, "answer_relevance_reason_a"), Some(&Value::Null));
    assert_eq!(table.get(q2, "contexts_a"), Some(&json!([])));
    Ok(())
}

#[test]
fn test_load_from_stores() -> anyhow::Result<()> {
    let dir = tempdir()?;
    let metric_names = names(&["m"]);
    for (recipe, inputs) in [("a", vec!["q1", "q2"]), ("b", vec!["q2"])] {
        let store = Store::for_recipe(dir.path(), recipe)?;
        store.register_app("ds", &metric_names, &json!({}))?;
        for input in inputs {
            store.insert_record(&record(input, &[], None), &metric_names)?;
        }
    }

    let a = load_recipe_results(dir.path(), "a", "ds")?;
    let b = load_recipe_results(dir.path(), "b", "ds")?;
    assert_eq!(a.records.len(), 2);
    assert_eq!(b.metric_names, metric_names);

    let (table, _) = combine_and_calculate_diff(&[a, b], None)?;
    assert_eq!(table.len(), 2);
    assert!(load_recipe_results(dir.path(), "missing", "ds").is_err());
    Ok(())
}
