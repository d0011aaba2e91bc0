use crate::compare::stats::MetricStats;
use crate::compare::ComparisonTable;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub mod console;
pub mod markdown;

/// Comparison output as written by `ragulate compare --format json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComparisonReport {
    pub dataset: String,
    pub recipes: Vec<String>,
    pub numeric_columns: Vec<String>,
    pub table: ComparisonTable,
    #[serde(default)]
    pub statistics: Vec<MetricStats>,
}

pub fn render_json(report: &ComparisonReport) -> anyhow::Result<String> {
    Ok(serde_json::to_string_pretty(report)?)
}

pub fn write_json(report: &ComparisonReport, out: &Path) -> anyhow::Result<()> {
    std::fs::write(out, render_json(report)?)
        .with_context(|| format!("failed to write {}", out.display()))?;
    Ok(())
}
