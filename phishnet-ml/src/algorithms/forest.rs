//! Random forest classifier: bootstrap-sampled trees with per-split feature
//! sub-sampling, combined by majority vote.

use crate::algorithms::Estimator;
use crate::algorithms::tree::{
    Criterion, DecisionTree, MaxFeatures, TreeParams, bootstrap_weights, class_position,
    feature_subset_size, sorted_classes,
};
use crate::error::MlError;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_estimators: usize,
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub max_features: MaxFeatures,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    classes: Vec<f64>,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        params: ForestParams,
        seed: u64,
    ) -> Result<Self, MlError> {
        if params.n_estimators == 0 {
            return Err(MlError::invalid_input("n_estimators must be >= 1"));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        let tree_seeds: Vec<u64> = (0..params.n_estimators).map(|_| rng.r#gen()).collect();
        let tree_params = TreeParams {
            criterion: params.criterion,
            max_depth: params.max_depth,
            min_samples_split: 2,
            max_features: feature_subset_size(x.ncols(), params.max_features),
        };

        let trees = tree_seeds
            .into_par_iter()
            .map(|tree_seed| {
                let mut rng = StdRng::seed_from_u64(tree_seed);
                let weights = bootstrap_weights(y.len(), &mut rng);
                DecisionTree::fit_weighted(x, y, &weights, tree_params, &mut rng)
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            classes: sorted_classes(y),
            trees,
        })
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }
}

impl Estimator for RandomForest {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.rows()
            .into_iter()
            .map(|row| {
                let mut votes = vec![0usize; self.classes.len()];
                for tree in &self.trees {
                    votes[class_position(&self.classes, tree.predict_row(row))] += 1;
                }
                // Ties go to the smallest label.
                let mut best = 0;
                for (c, &v) in votes.iter().enumerate() {
                    if v > votes[best] {
                        best = c;
                    }
                }
                self.classes.get(best).copied().unwrap_or_default()
            })
            .collect()
    }
}
