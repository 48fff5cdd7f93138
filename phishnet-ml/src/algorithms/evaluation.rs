//! Cross-validation folds and results.

use serde::{Deserialize, Serialize};

/// Cross-validation configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CrossValidation {
    pub n_folds: usize,
    /// Keep each class's proportion in every fold (classification only).
    pub stratified: bool,
}

impl Default for CrossValidation {
    fn default() -> Self {
        Self {
            n_folds: 3,
            stratified: true,
        }
    }
}

/// One train/validation partition of the row indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fold {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
}

impl CrossValidation {
    /// Deterministic, unshuffled folds. Stratified folds cut each class's rows
    /// into contiguous chunks; plain folds cut the row range itself.
    pub fn folds(&self, labels: &[f64]) -> Vec<Fold> {
        let n = labels.len();
        let k = self.n_folds.clamp(2, n.max(2));
        let mut assignment = vec![0usize; n];

        if self.stratified {
            let mut classes: Vec<f64> = labels.to_vec();
            classes.sort_by(f64::total_cmp);
            classes.dedup();
            for class in classes {
                let members: Vec<usize> = (0..n).filter(|&i| labels[i] == class).collect();
                for (fold, chunk) in chunk_bounds(members.len(), k).into_iter().enumerate() {
                    for &i in &members[chunk.0..chunk.1] {
                        assignment[i] = fold;
                    }
                }
            }
        } else {
            for (fold, (start, end)) in chunk_bounds(n, k).into_iter().enumerate() {
                assignment[start..end].iter_mut().for_each(|a| *a = fold);
            }
        }

        (0..k)
            .map(|fold| Fold {
                train: (0..n).filter(|&i| assignment[i] != fold).collect(),
                validation: (0..n).filter(|&i| assignment[i] == fold).collect(),
            })
            .filter(|f| !f.train.is_empty() && !f.validation.is_empty())
            .collect()
    }
}

/// Split `0..n` into `k` contiguous chunks; the first `n % k` are one longer.
fn chunk_bounds(n: usize, k: usize) -> Vec<(usize, usize)> {
    let base = n / k;
    let extra = n % k;
    let mut start = 0;
    (0..k)
        .map(|fold| {
            let len = base + usize::from(fold < extra);
            let bounds = (start, start + len);
            start += len;
            bounds
        })
        .collect()
}

/// Cross-validation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidationResult {
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
    pub std_score: f64,
    pub metric_name: String,
}

impl CrossValidationResult {
    pub fn from_scores(scores: Vec<f64>, metric_name: &str) -> Self {
        let count = scores.len().max(1) as f64;
        let mean = scores.iter().sum::<f64>() / count;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / count;
        Self {
            fold_scores: scores,
            mean_score: mean,
            std_score: variance.sqrt(),
            metric_name: metric_name.to_string(),
        }
    }
}
