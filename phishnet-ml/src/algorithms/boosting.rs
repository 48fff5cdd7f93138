//! AdaBoost (SAMME) over decision stumps.

use crate::algorithms::Estimator;
use crate::algorithms::tree::{Criterion, DecisionTree, TreeParams, class_position, sorted_classes};
use crate::error::MlError;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdaBoostParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdaBoost {
    classes: Vec<f64>,
    stumps: Vec<DecisionTree>,
    estimator_weights: Vec<f64>,
}

impl AdaBoost {
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        params: AdaBoostParams,
        seed: u64,
    ) -> Result<Self, MlError> {
        if params.n_estimators == 0 || params.learning_rate <= 0.0 {
            return Err(MlError::invalid_input(
                "AdaBoost needs n_estimators >= 1 and learning_rate > 0",
            ));
        }
        let n = y.len();
        let classes = sorted_classes(y);
        let k = classes.len().max(2) as f64;
        let mut rng = StdRng::seed_from_u64(seed);
        let mut stump_params = TreeParams::new(Criterion::Gini);
        stump_params.max_depth = Some(1);

        let mut weights = vec![1.0 / n as f64; n];
        let mut stumps = Vec::new();
        let mut estimator_weights = Vec::new();

        for round in 0..params.n_estimators {
            let stump = DecisionTree::fit_weighted(x, y, &weights, stump_params, &mut rng)?;
            let pred = stump.predict(x);
            let missed: Vec<bool> = pred.iter().zip(y.iter()).map(|(p, t)| p != t).collect();
            let total: f64 = weights.iter().sum();
            let error: f64 = weights
                .iter()
                .zip(&missed)
                .filter(|(_, m)| **m)
                .map(|(w, _)| w)
                .sum::<f64>()
                / total;

            if error <= 0.0 {
                stumps.push(stump);
                estimator_weights.push(1.0);
                break;
            }
            if error >= 1.0 - 1.0 / k {
                debug!(round, error, "AdaBoost stopped: stump no better than chance");
                if stumps.is_empty() {
                    stumps.push(stump);
                    estimator_weights.push(1.0);
                }
                break;
            }

            let alpha = params.learning_rate * (((1.0 - error) / error).ln() + (k - 1.0).ln());
            for (w, &m) in weights.iter_mut().zip(&missed) {
                if m {
                    *w *= alpha.exp();
                }
            }
            let total: f64 = weights.iter().sum();
            weights.iter_mut().for_each(|w| *w /= total);

            stumps.push(stump);
            estimator_weights.push(alpha);
        }

        Ok(Self {
            classes,
            stumps,
            estimator_weights,
        })
    }

    pub fn n_stumps(&self) -> usize {
        self.stumps.len()
    }
}

impl Estimator for AdaBoost {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                let mut scores = vec![0.0; self.classes.len()];
                for (stump, alpha) in self.stumps.iter().zip(&self.estimator_weights) {
                    scores[class_position(&self.classes, stump.predict_row(row))] += alpha;
                }
                let mut best = 0;
                for (c, &s) in scores.iter().enumerate() {
                    if s > scores[best] {
                        best = c;
                    }
                }
                self.classes.get(best).copied().unwrap_or_default()
            })
            .collect()
    }
}
