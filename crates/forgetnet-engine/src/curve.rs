//! Forgetting-curve summaries over recorded sweep history.

use forgetnet_common::PruningRecord;
use serde::{Deserialize, Serialize};

/// One point on a forgetting curve: how much was pruned vs. how the
/// remembered tasks scored.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub pruning_rate: f64,
    pub value: f32,
}

/// The performance-vs-pruning-rate curve of one policy's sweep, summarized
/// over the remembered tasks only.
///
/// Two aggregations are kept side by side: the mean over remembered tasks
/// (overall retention) and the minimum (worst-case retention). Area under
/// either curve is the scalar used to compare policies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForgettingCurve {
    policy: String,
    mean_points: Vec<CurvePoint>,
    min_points: Vec<CurvePoint>,
}

impl ForgettingCurve {
    /// Summarize one policy's records, excluding the forgotten tasks
    /// (1-based ids) from the performance aggregates. Records are taken in
    /// the order given; a sweep produces them with ascending pruning rate.
    pub fn from_records<'a, I>(policy: &str, records: I, forget_tasks: &[usize]) -> Self
    where
        I: IntoIterator<Item = &'a PruningRecord>,
    {
        let mut mean_points = Vec::new();
        let mut min_points = Vec::new();
        for rec in records {
            mean_points.push(CurvePoint {
                pruning_rate: rec.pruning_rate,
                value: rec.mean_excluding(forget_tasks),
            });
            min_points.push(CurvePoint {
                pruning_rate: rec.pruning_rate,
                value: rec.min_excluding(forget_tasks),
            });
        }
        Self { policy: policy.to_owned(), mean_points, min_points }
    }

    pub fn policy(&self) -> &str {
        &self.policy
    }

    pub fn mean_points(&self) -> &[CurvePoint] {
        &self.mean_points
    }

    pub fn min_points(&self) -> &[CurvePoint] {
        &self.min_points
    }

    /// Area under the mean-retention curve, counting only points whose
    /// value stays above `floor`.
    pub fn auc_mean(&self, floor: f32) -> f64 {
        trapezoid_auc(&self.mean_points, floor)
    }

    /// Area under the worst-case-retention curve above `floor`.
    pub fn auc_min(&self, floor: f32) -> f64 {
        trapezoid_auc(&self.min_points, floor)
    }

    /// Plain-text table of the curve, one step per line.
    pub fn summary(&self) -> String {
        let mut out = format!("policy {}\n", self.policy);
        for (mean, min) in self.mean_points.iter().zip(&self.min_points) {
            out.push_str(&format!(
                "rate {:.6}  mean {:.4}  min {:.4}\n",
                mean.pruning_rate, mean.value, min.value
            ));
        }
        out
    }
}

/// Trapezoidal area under the curve, restricted to points whose value is
/// strictly above `floor`. Fewer than two surviving points yield 0.
fn trapezoid_auc(points: &[CurvePoint], floor: f32) -> f64 {
    let kept: Vec<&CurvePoint> = points.iter().filter(|p| p.value > floor).collect();
    if kept.len() < 2 {
        return 0.0;
    }
    kept.windows(2)
        .map(|w| {
            let dx = w[1].pruning_rate - w[0].pruning_rate;
            dx * f64::from(w[0].value + w[1].value) / 2.0
        })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(policy: &str, step: usize, rate: f64, perf: Vec<f32>) -> PruningRecord {
        PruningRecord { policy: policy.into(), step, pruning_rate: rate, performance: perf }
    }

    #[test]
    fn curve_excludes_forgotten_tasks_from_aggregates() {
        let records = vec![
            rec("MEAN", 0, 0.0, vec![0.9, 0.2, 0.8]),
            rec("MEAN", 1, 0.5, vec![0.7, 0.1, 0.5]),
        ];
        let curve = ForgettingCurve::from_records("MEAN", &records, &[2]);
        let means: Vec<f32> = curve.mean_points().iter().map(|p| p.value).collect();
        assert!((means[0] - 0.85).abs() < 1e-6);
        assert!((means[1] - 0.6).abs() < 1e-6);
        let mins: Vec<f32> = curve.min_points().iter().map(|p| p.value).collect();
        assert!((mins[0] - 0.8).abs() < 1e-6);
        assert!((mins[1] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn auc_is_the_trapezoid_sum() {
        let records = vec![
            rec("MAX", 0, 0.0, vec![1.0]),
            rec("MAX", 1, 0.5, vec![0.8]),
            rec("MAX", 2, 1.0, vec![0.4]),
        ];
        let curve = ForgettingCurve::from_records("MAX", &records, &[]);
        // 0.5*(1.0+0.8)/2 + 0.5*(0.8+0.4)/2
        assert!((curve.auc_mean(0.0) - 0.75).abs() < 1e-9);
    }

    #[test]
    fn auc_drops_points_at_or_below_the_floor() {
        let records = vec![
            rec("MAX", 0, 0.0, vec![1.0]),
            rec("MAX", 1, 0.5, vec![0.8]),
            rec("MAX", 2, 1.0, vec![0.1]),
        ];
        let curve = ForgettingCurve::from_records("MAX", &records, &[]);
        // Only the first two points survive a 0.5 floor.
        assert!((curve.auc_mean(0.5) - 0.45).abs() < 1e-9);
        // One surviving point is not a curve.
        assert_eq!(curve.auc_mean(0.9), 0.0);
    }

    #[test]
    fn summary_names_the_policy() {
        let records = vec![rec("CONST", 0, 0.0, vec![0.5])];
        let curve = ForgettingCurve::from_records("CONST", &records, &[]);
        assert!(curve.summary().starts_with("policy CONST"));
    }
}
