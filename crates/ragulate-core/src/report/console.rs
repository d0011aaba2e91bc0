use crate::compare::stats::MetricStats;
use crate::compare::ComparisonTable;
use crate::engine::RunSummary;
use crate::model::{FeedbackStatus, StatusCounts};

pub fn print_run_summary(s: &RunSummary) {
    eprintln!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    eprintln!("Recipe: {}", s.recipe);
    eprintln!(
        "Queries: {} total, {} already done, {} submitted, {} failed",
        s.totals.total_queries, s.totals.finished_queries, s.submitted_queries, s.failed_queries
    );
    eprintln!(
        "Evaluations: {}/{} finished ({})",
        s.finished_feedback_jobs,
        s.totals.total_feedback_jobs,
        status_line(&s.counts)
    );
    if s.cancelled {
        eprintln!("⚠️  Run interrupted; rerun the same command to resume.");
    }
    for p in &s.exported {
        eprintln!("Wrote {}", p.display());
    }
}

pub fn print_status_counts(recipe: &str, counts: &StatusCounts) {
    eprintln!("{}: {}", recipe, status_line(counts));
}

/// `done=.. running=.. waiting=.. failed=.. skipped=..`
pub fn status_line(counts: &StatusCounts) -> String {
    format!(
        "done={} running={} waiting={} failed={} skipped={}",
        counts.get(FeedbackStatus::Done),
        counts.get(FeedbackStatus::Running),
        counts.get(FeedbackStatus::None),
        counts.get(FeedbackStatus::Failed),
        counts.get(FeedbackStatus::Skipped),
    )
}

/// Mean of every numeric column per recipe, and of the diff columns.
pub fn print_comparison_summary(table: &ComparisonTable, recipes: &[String], numeric_columns: &[String]) {
    eprintln!("\nCompared {} queries across {} recipes", table.len(), recipes.len());
    for col in numeric_columns {
        let mut parts = Vec::new();
        for r in recipes {
            let name = format!("{}_{}", col, r);
            parts.push(format!("{}={}", r, fmt_mean(column_mean(table, &name))));
        }
        let diff = format!("{}__diff", col);
        if table.has_column(&diff) {
            parts.push(format!("diff={}", fmt_mean(column_mean(table, &diff))));
        }
        eprintln!("  {:<20} {}", col, parts.join("  "));
    }
}

pub fn print_statistics(stats: &[MetricStats]) {
    if stats.is_empty() {
        return;
    }
    eprintln!(
        "\n  {:<20} {:<20} {:>4} {:>6} {:>6} {:>6} {:>6} {:>6} {:>6}",
        "recipe", "metric", "n", "low", "q1", "median", "mean", "q3", "high"
    );
    for s in stats {
        eprintln!(
            "  {:<20} {:<20} {:>4} {:>6.3} {:>6.3} {:>6.3} {:>6.3} {:>6.3} {:>6.3}",
            s.recipe, s.metric, s.n, s.low, s.q1, s.median, s.mean, s.q3, s.high
        );
    }
}

fn column_mean(table: &ComparisonTable, column: &str) -> Option<f64> {
    let vs: Vec<f64> = table
        .column_values(column)
        .into_iter()
        .filter_map(|v| v.as_f64())
        .collect();
    if vs.is_empty() {
        None
    } else {
        Some(vs.iter().sum::<f64>() / vs.len() as f64)
    }
}

fn fmt_mean(v: Option<f64>) -> String {
    v.map(|m| format!("{:.3}", m)).unwrap_or_else(|| "-".into())
}
