use crate::compare::ComparisonTable;
use serde_json::Value;
use std::path::Path;

const MAX_CELL: usize = 80;

/// Markdown table with the query, ground truth, outputs and numeric columns.
/// Detail columns (reasons, contexts) are left to the JSON output.
pub fn render_markdown(table: &ComparisonTable, recipes: &[String], numeric_columns: &[String]) -> String {
    let keep: Vec<usize> = table
        .columns
        .iter()
        .enumerate()
        .filter(|(_, c)| is_summary_column(c, recipes, numeric_columns))
        .map(|(i, _)| i)
        .collect();

    let mut md = String::new();
    md.push('|');
    for &i in &keep {
        md.push_str(&format!(" {} |", escape(&table.columns[i])));
    }
    md.push_str("\n|");
    for _ in &keep {
        md.push_str(" --- |");
    }
    md.push('\n');

    for row in &table.rows {
        md.push('|');
        for &i in &keep {
            let cell = row.get(i).map(format_cell).unwrap_or_default();
            md.push_str(&format!(" {} |", escape(&cell)));
        }
        md.push('\n');
    }
    md
}

pub fn write_markdown(
    table: &ComparisonTable,
    recipes: &[String],
    numeric_columns: &[String],
    out: &Path,
) -> anyhow::Result<()> {
    std::fs::write(out, render_markdown(table, recipes, numeric_columns))?;
    Ok(())
}

fn is_summary_column(column: &str, recipes: &[String], numeric_columns: &[String]) -> bool {
    if column == "input" || column == "ground_truth" {
        return true;
    }
    let per_recipe = ["output"].iter().map(|s| s.to_string()).chain(numeric_columns.iter().cloned());
    for base in per_recipe {
        if column == format!("{}__diff", base) {
            return true;
        }
        if recipes.iter().any(|r| column == format!("{}_{}", base, r)) {
            return true;
        }
    }
    false
}

fn format_cell(v: &Value) -> String {
    let s = match v {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if !n.is_i64() && !n.is_u64() => format!("{:.3}", f),
            _ => n.to_string(),
        },
        other => other.to_string(),
    };
    truncate(&s, MAX_CELL)
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max).collect();
    out.push('…');
    out
}

fn escape(s: &str) -> String {
    s.replace('|', "\\|").replace(['\n', '\r'], " ")
}
