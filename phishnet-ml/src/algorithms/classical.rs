//! Classical ML algorithm definitions and their candidate grids.

use crate::algorithms::FittedModel;
use crate::algorithms::boosting::{AdaBoost, AdaBoostParams};
use crate::algorithms::forest::{ForestParams, RandomForest};
use crate::algorithms::linear::{
    ElasticNet, ElasticNetParams, LogisticParams, LogisticRegression, Penalty,
};
use crate::algorithms::neighbors::{KNeighbors, NeighborsTask};
use crate::algorithms::tree::{Criterion, DecisionTree, MaxFeatures, TreeParams};
use crate::config::TaskKind;
use crate::error::MlError;
use ndarray::{ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// One fully-parameterised algorithm configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum ClassicalAlgorithm {
    RandomForest {
        n_estimators: usize,
        criterion: Criterion,
        max_depth: Option<usize>,
        max_features: MaxFeatures,
    },
    DecisionTree {
        criterion: Criterion,
        max_depth: Option<usize>,
    },
    AdaBoost {
        n_estimators: usize,
        learning_rate: f64,
    },
    LogisticRegression {
        c: f64,
        penalty: Penalty,
    },
    Knn {
        n_neighbors: usize,
    },
    ElasticNet {
        alpha: f64,
        l1_ratio: f64,
    },
    DecisionTreeRegressor {
        max_depth: Option<usize>,
    },
    KnnRegressor {
        n_neighbors: usize,
    },
}

impl ClassicalAlgorithm {
    /// Human-readable family name, shared by every grid point of a family.
    pub fn family(&self) -> &'static str {
        match self {
            Self::RandomForest { .. } => "Random Forest",
            Self::DecisionTree { .. } => "Decision Tree",
            Self::AdaBoost { .. } => "AdaBoost",
            Self::LogisticRegression { .. } => "Logistic Regression",
            Self::Knn { .. } => "K-Neighbors Classifier",
            Self::ElasticNet { .. } => "ElasticNet",
            Self::DecisionTreeRegressor { .. } => "Decision Tree Regressor",
            Self::KnnRegressor { .. } => "K-Neighbors Regressor",
        }
    }

    /// Fit this configuration. `seed` drives every random choice.
    pub fn fit(
        &self,
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        seed: u64,
    ) -> Result<FittedModel, MlError> {
        let mut rng = StdRng::seed_from_u64(seed);
        let model = match *self {
            Self::RandomForest {
                n_estimators,
                criterion,
                max_depth,
                max_features,
            } => FittedModel::RandomForest(RandomForest::fit(
                x,
                y,
                ForestParams {
                    n_estimators,
                    criterion,
                    max_depth,
                    max_features,
                },
                seed,
            )?),
            Self::DecisionTree {
                criterion,
                max_depth,
            } => {
                let mut params = TreeParams::new(criterion);
                params.max_depth = max_depth;
                FittedModel::DecisionTree(DecisionTree::fit(x, y, params, &mut rng)?)
            }
            Self::AdaBoost {
                n_estimators,
                learning_rate,
            } => FittedModel::AdaBoost(AdaBoost::fit(
                x,
                y,
                AdaBoostParams {
                    n_estimators,
                    learning_rate,
                },
                seed,
            )?),
            Self::LogisticRegression { c, penalty } => {
                let params = LogisticParams {
                    c,
                    penalty,
                    ..LogisticParams::default()
                };
                FittedModel::LogisticRegression(LogisticRegression::fit(x, y, params)?)
            }
            Self::Knn { n_neighbors } => FittedModel::KNeighbors(KNeighbors::fit(
                x,
                y,
                n_neighbors,
                NeighborsTask::Classify,
            )?),
            Self::ElasticNet { alpha, l1_ratio } => FittedModel::ElasticNet(ElasticNet::fit(
                x,
                y,
                ElasticNetParams::new(alpha, l1_ratio),
            )?),
            Self::DecisionTreeRegressor { max_depth } => {
                let mut params = TreeParams::new(Criterion::SquaredError);
                params.max_depth = max_depth;
                FittedModel::DecisionTree(DecisionTree::fit(x, y, params, &mut rng)?)
            }
            Self::KnnRegressor { n_neighbors } => FittedModel::KNeighbors(KNeighbors::fit(
                x,
                y,
                n_neighbors,
                NeighborsTask::Regress,
            )?),
        };
        Ok(model)
    }
}

/// A family and the grid of configurations searched for it.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateFamily {
    pub name: &'static str,
    pub grid: Vec<ClassicalAlgorithm>,
}

/// Candidate families in selection order (earlier wins ties).
pub fn candidate_families(task: TaskKind) -> Vec<CandidateFamily> {
    match task {
        TaskKind::Classification => vec![
            family(
                [8, 16, 32, 64, 128]
                    .into_iter()
                    .map(|n_estimators| ClassicalAlgorithm::RandomForest {
                        n_estimators,
                        criterion: Criterion::Gini,
                        max_depth: None,
                        max_features: MaxFeatures::Sqrt,
                    })
                    .collect(),
            ),
            family(
                [Criterion::Gini, Criterion::Entropy]
                    .into_iter()
                    .map(|criterion| ClassicalAlgorithm::DecisionTree {
                        criterion,
                        max_depth: None,
                    })
                    .collect(),
            ),
            family(
                [0.1, 0.01, 0.001]
                    .into_iter()
                    .flat_map(|learning_rate| {
                        [8, 16, 32, 64, 128].into_iter().map(move |n_estimators| {
                            ClassicalAlgorithm::AdaBoost {
                                n_estimators,
                                learning_rate,
                            }
                        })
                    })
                    .collect(),
            ),
            family(
                [Penalty::L2, Penalty::L1]
                    .into_iter()
                    .flat_map(|penalty| {
                        [0.1, 1.0, 10.0]
                            .into_iter()
                            .map(move |c| ClassicalAlgorithm::LogisticRegression { c, penalty })
                    })
                    .collect(),
            ),
            family(
                [3, 5, 7]
                    .into_iter()
                    .map(|n_neighbors| ClassicalAlgorithm::Knn { n_neighbors })
                    .collect(),
            ),
        ],
        TaskKind::Regression => vec![
            family(
                [0.1, 0.5, 1.0]
                    .into_iter()
                    .flat_map(|alpha| {
                        [0.1, 0.5, 0.9]
                            .into_iter()
                            .map(move |l1_ratio| ClassicalAlgorithm::ElasticNet { alpha, l1_ratio })
                    })
                    .collect(),
            ),
            family(
                [Some(3), Some(6), None]
                    .into_iter()
                    .map(|max_depth| ClassicalAlgorithm::DecisionTreeRegressor { max_depth })
                    .collect(),
            ),
            family(
                [3, 5, 7]
                    .into_iter()
                    .map(|n_neighbors| ClassicalAlgorithm::KnnRegressor { n_neighbors })
                    .collect(),
            ),
        ],
    }
}

fn family(grid: Vec<ClassicalAlgorithm>) -> CandidateFamily {
    CandidateFamily {
        name: grid.first().map(ClassicalAlgorithm::family).unwrap_or("empty"),
        grid,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::Estimator;
    use ndarray::array;

    #[test]
    fn test_candidate_order_and_sizes() {
        let families = candidate_families(TaskKind::Classification);
        let names: Vec<&str> = families.iter().map(|f| f.name).collect();
        assert_eq!(
            names,
            vec![
                "Random Forest",
                "Decision Tree",
                "AdaBoost",
                "Logistic Regression",
                "K-Neighbors Classifier"
            ]
        );
        assert_eq!(families[2].grid.len(), 15);
        for f in &families {
            assert!(f.grid.iter().all(|a| a.family() == f.name));
        }
        assert_eq!(candidate_families(TaskKind::Regression).len(), 3);
    }

    #[test]
    fn test_algorithm_serde_tag() {
        let algo = ClassicalAlgorithm::Knn { n_neighbors: 5 };
        let json = serde_json::to_value(algo).unwrap();
        assert_eq!(json["algorithm"], "knn");
        assert_eq!(json["n_neighbors"], 5);
    }

    #[test]
    fn test_every_classifier_fits() {
        let x = array![[0.0, 1.0], [0.2, 0.8], [0.1, 1.1], [3.0, -1.0], [3.2, -0.8], [2.9, -1.2]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        for family in candidate_families(TaskKind::Classification) {
            let algo = family.grid[0];
            let model = algo.fit(x.view(), y.view(), 42).unwrap();
            assert_eq!(model.predict(x.view()).len(), 6, "{}", family.name);
        }
    }
}
