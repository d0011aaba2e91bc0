use crate::model::EvaluationRecord;
use crate::storage::Store;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Self-describing dump of one recipe's results on one dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportDocument {
    pub recipe: String,
    pub dataset: String,
    pub exported_at: String,
    /// Run metadata registered for the dataset, if any.
    #[serde(default)]
    pub run: Option<serde_json::Value>,
    pub feedback_names: Vec<String>,
    pub records: Vec<EvaluationRecord>,
}

/// `<recipe>_<dataset>_results.json`
pub fn export_file_name(recipe: &str, dataset: &str) -> String {
    format!("{}_{}_results.json", recipe, dataset)
}

pub fn build_export(store: &Store, recipe: &str, dataset: &str) -> anyhow::Result<ExportDocument> {
    let (records, feedback_names) = store.get_records(dataset)?;
    Ok(ExportDocument {
        recipe: recipe.to_string(),
        dataset: dataset.to_string(),
        exported_at: crate::storage::store::now_rfc3339(),
        run: store.app_metadata(dataset)?,
        feedback_names,
        records,
    })
}

/// Writes the export document into `out_dir` and returns its path.
pub fn export_results(store: &Store, recipe: &str, dataset: &str, out_dir: &Path) -> anyhow::Result<PathBuf> {
    let doc = build_export(store, recipe, dataset)?;
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let path = out_dir.join(export_file_name(recipe, dataset));
    let body = serde_json::to_string_pretty(&doc)?;
    std::fs::write(&path, body).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(
        event = "export.write",
        recipe,
        dataset,
        records = doc.records.len(),
        path = %path.display()
    );
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::store::new_record_id;

    #[test]
    fn writes_named_document_with_run_metadata() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let store = Store::memory()?;
        store.init_schema()?;
        let names = vec!["groundedness".to_string()];
        store.register_app("ds", &names, &serde_json::json!({"recipe_name": "r1"}))?;
        store.insert_record(
            &EvaluationRecord {
                record_id: new_record_id("ds", "q"),
                app_id: "ds".into(),
                input: "q".into(),
                output: "a".into(),
                ts: "2024-01-01T00:00:00Z".into(),
                ..Default::default()
            },
            &names,
        )?;

        let path = export_results(&store, "r1", "ds", dir.path())?;
        assert_eq!(path.file_name().unwrap(), "r1_ds_results.json");
        let doc: ExportDocument = serde_json::from_str(&std::fs::read_to_string(&path)?)?;
        assert_eq!(doc.records.len(), 1);
        assert_eq!(doc.feedback_names, names);
        assert_eq!(doc.run.unwrap()["recipe_name"], "r1");
        assert_eq!(doc.records[0].metric_scores["groundedness"], None);
        Ok(())
    }
}
