use super::merge::RecipeResults;
use serde::{Deserialize, Serialize};

/// Distribution of one metric for one recipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricStats {
    pub recipe: String,
    pub metric: String,
    pub n: usize,
    pub high: f64,
    pub low: f64,
    pub median: f64,
    pub mean: f64,
    pub q1: f64,
    pub q3: f64,
}

/// Per recipe and metric statistics over valid scores (finite, >= 0).
/// Metrics without any valid score are left out.
pub fn calculate_statistics(results: &[RecipeResults], metrics: &[String]) -> Vec<MetricStats> {
    let mut out = Vec::new();
    for r in results {
        for metric in metrics {
            let mut vs: Vec<f64> = r
                .records
                .iter()
                .filter_map(|rec| rec.metric_scores.get(metric).copied().flatten())
                .filter(|v| v.is_finite() && *v >= 0.0)
                .collect();
            if vs.is_empty() {
                continue;
            }
            vs.sort_by(|a, b| a.total_cmp(b));

            let n = vs.len();
            out.push(MetricStats {
                recipe: r.recipe.clone(),
                metric: metric.clone(),
                n,
                high: vs[n - 1],
                low: vs[0],
                median: quantile(&vs, 0.5),
                mean: vs.iter().sum::<f64>() / n as f64,
                q1: quantile(&vs, 0.25),
                q3: quantile(&vs, 0.75),
            });
        }
    }
    out
}

/// Linear interpolation between closest ranks; `sorted` must be non-empty.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    let frac = pos - lo as f64;
    sorted[lo] + (sorted[hi] - sorted[lo]) * frac
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::EvaluationRecord;

    fn results(scores: &[Option<f64>]) -> RecipeResults {
        let records = scores
            .iter()
            .enumerate()
            .map(|(i, s)| EvaluationRecord {
                input: format!("q{i}"),
                metric_scores: [("m".to_string(), *s)].into_iter().collect(),
                ..Default::default()
            })
            .collect();
        RecipeResults::new("r", records, vec!["m".into()])
    }

    #[test]
    fn quartiles_interpolate_linearly() {
        let vs = [1.0, 2.0, 3.0, 4.0];
        assert_eq!(quantile(&vs, 0.5), 2.5);
        assert_eq!(quantile(&vs, 0.25), 1.75);
        assert_eq!(quantile(&vs, 0.75), 3.25);
        assert_eq!(quantile(&[7.0], 0.25), 7.0);
    }

    #[test]
    fn invalid_and_missing_scores_are_ignored() {
        let r = results(&[Some(0.2), None, Some(-1.0), Some(0.6), Some(f64::NAN), Some(1.0)]);
        let stats = calculate_statistics(&[r], &["m".to_string(), "absent".to_string()]);
        assert_eq!(stats.len(), 1);
        let s = &stats[0];
        assert_eq!(s.n, 3);
        assert_eq!(s.low, 0.2);
        assert_eq!(s.high, 1.0);
        assert_eq!(s.median, 0.6);
        assert!((s.mean - 0.6).abs() < 1e-9);
    }
}
