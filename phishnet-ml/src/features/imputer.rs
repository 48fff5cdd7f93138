//! k-nearest-neighbour imputation of missing (NaN) feature values.

use crate::error::MlError;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// KNN imputer with uniform weights and NaN-aware Euclidean distance.
///
/// Each missing cell is replaced by the mean of that feature over the
/// `n_neighbors` closest training rows that have the feature present. When no
/// such row exists the training column mean is used.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KnnImputer {
    pub n_neighbors: usize,
    /// Training rows; `None` marks a missing value.
    reference: Vec<Vec<Option<f64>>>,
    column_means: Vec<f64>,
}

impl KnnImputer {
    pub fn new(n_neighbors: usize) -> Self {
        Self {
            n_neighbors: n_neighbors.max(1),
            reference: Vec::new(),
            column_means: Vec::new(),
        }
    }

    pub fn is_fitted(&self) -> bool {
        !self.column_means.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.column_means.len()
    }

    /// Memorise the training rows and per-column means.
    pub fn fit(&mut self, x: &Array2<f64>) -> Result<(), MlError> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(MlError::invalid_input("cannot fit imputer on an empty matrix"));
        }
        self.reference = x
            .rows()
            .into_iter()
            .map(|row| row.iter().map(|&v| (!v.is_nan()).then_some(v)).collect())
            .collect();
        self.column_means = x
            .columns()
            .into_iter()
            .map(|col| {
                let present: Vec<f64> = col.iter().copied().filter(|v| !v.is_nan()).collect();
                if present.is_empty() {
                    0.0
                } else {
                    present.iter().sum::<f64>() / present.len() as f64
                }
            })
            .collect();
        Ok(())
    }

    /// Return a copy of `x` with every NaN replaced.
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>, MlError> {
        if !self.is_fitted() {
            return Err(MlError::model("imputer used before fit"));
        }
        if x.ncols() != self.n_features() {
            return Err(MlError::invalid_input(format!(
                "imputer fitted on {} features, got {}",
                self.n_features(),
                x.ncols()
            )));
        }

        let mut out = x.clone();
        for (i, row) in x.rows().into_iter().enumerate() {
            if !row.iter().any(|v| v.is_nan()) {
                continue;
            }
            let distances: Vec<Option<f64>> = self
                .reference
                .iter()
                .map(|reference| nan_euclidean(row, reference))
                .collect();

            for j in (0..row.len()).filter(|&j| row[j].is_nan()) {
                out[[i, j]] = self.impute_cell(j, &distances);
            }
        }
        Ok(out)
    }

    pub fn fit_transform(&mut self, x: &Array2<f64>) -> Result<Array2<f64>, MlError> {
        self.fit(x)?;
        self.transform(x)
    }

    fn impute_cell(&self, column: usize, distances: &[Option<f64>]) -> f64 {
        let mut donors: Vec<(f64, f64)> = self
            .reference
            .iter()
            .zip(distances)
            .filter_map(|(reference, dist)| Some((dist.as_ref().copied()?, reference[column]?)))
            .collect();
        if donors.is_empty() {
            return self.column_means[column];
        }
        donors.sort_by(|a, b| a.0.total_cmp(&b.0));
        let k = self.n_neighbors.min(donors.len());
        donors[..k].iter().map(|(_, v)| v).sum::<f64>() / k as f64
    }
}

/// `sqrt(n_total / n_present * Σ (a - b)²)` over coordinates present in both
/// rows; `None` when no coordinate is shared.
fn nan_euclidean(row: ArrayView1<'_, f64>, reference: &[Option<f64>]) -> Option<f64> {
    let mut sum = 0.0;
    let mut present = 0usize;
    for (&a, b) in row.iter().zip(reference) {
        if let (false, Some(b)) = (a.is_nan(), b) {
            sum += (a - b) * (a - b);
            present += 1;
        }
    }
    if present == 0 {
        return None;
    }
    Some((row.len() as f64 / present as f64 * sum).sqrt())
}
