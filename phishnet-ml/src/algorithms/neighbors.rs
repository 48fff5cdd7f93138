//! k-nearest-neighbour classifier and regressor (brute force, Euclidean).

use crate::algorithms::Estimator;
use crate::algorithms::tree::{class_position, sorted_classes};
use crate::error::MlError;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NeighborsTask {
    Classify,
    Regress,
}

/// Memorised training set. Classification takes the majority label of the
/// `k` nearest rows (ties to the smallest label); regression takes their mean.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KNeighbors {
    task: NeighborsTask,
    n_neighbors: usize,
    n_features: usize,
    /// Row-major copy of the training matrix.
    points: Vec<f64>,
    targets: Vec<f64>,
    classes: Vec<f64>,
}

impl KNeighbors {
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        n_neighbors: usize,
        task: NeighborsTask,
    ) -> Result<Self, MlError> {
        if n_neighbors == 0 {
            return Err(MlError::invalid_input("n_neighbors must be >= 1"));
        }
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(MlError::invalid_input("k-neighbours needs matching non-empty inputs"));
        }
        let classes = match task {
            NeighborsTask::Classify => sorted_classes(y),
            NeighborsTask::Regress => Vec::new(),
        };
        Ok(Self {
            task,
            n_neighbors,
            n_features: x.ncols(),
            points: x.iter().copied().collect(),
            targets: y.to_vec(),
            classes,
        })
    }

    fn predict_row(&self, row: &[f64]) -> f64 {
        let mut distances: Vec<(f64, usize)> = self
            .points
            .chunks_exact(self.n_features.max(1))
            .enumerate()
            .map(|(i, point)| {
                let d: f64 = point.iter().zip(row).map(|(a, b)| (a - b) * (a - b)).sum();
                (d, i)
            })
            .collect();
        let k = self.n_neighbors.min(distances.len());
        let by_distance = |a: &(f64, usize), b: &(f64, usize)| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1));
        if k < distances.len() {
            distances.select_nth_unstable_by(k - 1, by_distance);
        }
        let nearest = &mut distances[..k];
        nearest.sort_by(by_distance);

        match self.task {
            NeighborsTask::Regress => {
                nearest.iter().map(|(_, i)| self.targets[*i]).sum::<f64>() / k as f64
            }
            NeighborsTask::Classify => {
                let mut votes = vec![0usize; self.classes.len()];
                for (_, i) in nearest.iter() {
                    votes[class_position(&self.classes, self.targets[*i])] += 1;
                }
                let mut best = 0;
                for (c, &v) in votes.iter().enumerate() {
                    if v > votes[best] {
                        best = c;
                    }
                }
                self.classes.get(best).copied().unwrap_or_default()
            }
        }
    }
}

impl Estimator for KNeighbors {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let rows: Vec<Vec<f64>> = x.rows().into_iter().map(|r| r.to_vec()).collect();
        let predictions: Vec<f64> = rows.par_iter().map(|row| self.predict_row(row)).collect();
        Array1::from_vec(predictions)
    }
}
