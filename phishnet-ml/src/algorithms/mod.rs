//! Algorithm implementations, candidate grids and cross-validation.

pub mod boosting;
pub mod classical;
pub mod evaluation;
pub mod forest;
pub mod linear;
pub mod neighbors;
pub mod tree;

pub use classical::{CandidateFamily, ClassicalAlgorithm, candidate_families};
pub use evaluation::{CrossValidation, CrossValidationResult};

use ndarray::{Array1, ArrayView2};
use serde::{Deserialize, Serialize};

/// Anything that maps a feature matrix to one prediction per row.
pub trait Estimator {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64>;
}

/// A fitted model of any supported family. Serialisable as a whole so the
/// composed predictor round-trips through its file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "model", rename_all = "snake_case")]
pub enum FittedModel {
    RandomForest(forest::RandomForest),
    DecisionTree(tree::DecisionTree),
    AdaBoost(boosting::AdaBoost),
    LogisticRegression(linear::LogisticRegression),
    KNeighbors(neighbors::KNeighbors),
    ElasticNet(linear::ElasticNet),
}

impl Estimator for FittedModel {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        match self {
            Self::RandomForest(m) => m.predict(x),
            Self::DecisionTree(m) => m.predict(x),
            Self::AdaBoost(m) => m.predict(x),
            Self::LogisticRegression(m) => m.predict(x),
            Self::KNeighbors(m) => m.predict(x),
            Self::ElasticNet(m) => m.predict(x),
        }
    }
}
