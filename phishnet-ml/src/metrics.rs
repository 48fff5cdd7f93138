//! Evaluation metrics computed from a prediction/label pair.

use crate::artifacts::{ClassificationMetric, MetricRecord, RegressionMetric};
use crate::config::TaskKind;

/// Binary classification metrics with positive label `1`.
///
/// Undefined ratios (no predicted or no actual positives) are reported as 0.
pub fn classification_metric(y_true: &[f64], y_pred: &[f64]) -> ClassificationMetric {
    let (mut tp, mut fp, mut fn_) = (0usize, 0usize, 0usize);
    for (&t, &p) in y_true.iter().zip(y_pred) {
        let actual = is_positive(t);
        let predicted = is_positive(p);
        match (actual, predicted) {
            (true, true) => tp += 1,
            (false, true) => fp += 1,
            (true, false) => fn_ += 1,
            (false, false) => {}
        }
    }

    let precision = ratio(tp, tp + fp);
    let recall = ratio(tp, tp + fn_);
    let f1 = if precision + recall > 0.0 {
        2.0 * precision * recall / (precision + recall)
    } else {
        0.0
    };

    ClassificationMetric {
        f1_score: f1,
        precision_score: precision,
        recall_score: recall,
    }
}

/// Regression metrics. R² is 0 when the targets have no variance.
pub fn regression_metric(y_true: &[f64], y_pred: &[f64]) -> RegressionMetric {
    let n = y_true.len().min(y_pred.len());
    if n == 0 {
        return RegressionMetric {
            rmse: 0.0,
            mae: 0.0,
            r2_score: 0.0,
        };
    }

    let mean = y_true[..n].iter().sum::<f64>() / n as f64;
    let mut ss_res = 0.0;
    let mut ss_tot = 0.0;
    let mut abs = 0.0;
    for (&t, &p) in y_true.iter().zip(y_pred) {
        let err = t - p;
        ss_res += err * err;
        abs += err.abs();
        ss_tot += (t - mean) * (t - mean);
    }

    let r2 = if ss_tot > 0.0 {
        1.0 - ss_res / ss_tot
    } else if ss_res == 0.0 {
        1.0
    } else {
        0.0
    };

    RegressionMetric {
        rmse: (ss_res / n as f64).sqrt(),
        mae: abs / n as f64,
        r2_score: r2,
    }
}

/// The metric record for a task.
pub fn metric_for(task: TaskKind, y_true: &[f64], y_pred: &[f64]) -> MetricRecord {
    match task {
        TaskKind::Classification => MetricRecord::Classification(classification_metric(y_true, y_pred)),
        TaskKind::Regression => MetricRecord::Regression(regression_metric(y_true, y_pred)),
    }
}

/// The selection score for a task.
pub fn score(task: TaskKind, y_true: &[f64], y_pred: &[f64]) -> f64 {
    metric_for(task, y_true, y_pred).score()
}

fn is_positive(label: f64) -> bool {
    (label - 1.0).abs() < 0.5
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 { 0.0 } else { num as f64 / den as f64 }
}
