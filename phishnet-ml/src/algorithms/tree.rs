//! CART decision trees for classification (gini / entropy) and regression
//! (squared error), with sample weights and optional feature sub-sampling.

use crate::algorithms::Estimator;
use crate::error::MlError;
use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::Rng;
use rand::rngs::StdRng;
use serde::{Deserialize, Serialize};

/// Split-quality measure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Criterion {
    Gini,
    Entropy,
    SquaredError,
}

impl Criterion {
    pub fn is_classification(self) -> bool {
        !matches!(self, Self::SquaredError)
    }
}

/// Growth limits for one tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TreeParams {
    pub criterion: Criterion,
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    /// Features examined per split; `None` means all of them.
    pub max_features: Option<usize>,
}

impl TreeParams {
    pub fn new(criterion: Criterion) -> Self {
        Self {
            criterion,
            max_depth: None,
            min_samples_split: 2,
            max_features: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

/// A fitted tree. Node 0 is the root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    params: TreeParams,
    n_features: usize,
    /// Sorted distinct labels (classification only).
    classes: Vec<f64>,
    nodes: Vec<Node>,
}

impl DecisionTree {
    /// Fit with uniform weights.
    pub fn fit(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        params: TreeParams,
        rng: &mut StdRng,
    ) -> Result<Self, MlError> {
        let weights = vec![1.0; y.len()];
        Self::fit_weighted(x, y, &weights, params, rng)
    }

    /// Fit with per-sample weights. Zero-weight samples are ignored.
    pub fn fit_weighted(
        x: ArrayView2<'_, f64>,
        y: ArrayView1<'_, f64>,
        weights: &[f64],
        params: TreeParams,
        rng: &mut StdRng,
    ) -> Result<Self, MlError> {
        if x.nrows() == 0 || x.nrows() != y.len() || y.len() != weights.len() {
            return Err(MlError::invalid_input(format!(
                "tree fit needs matching non-empty inputs, got {} rows, {} labels, {} weights",
                x.nrows(),
                y.len(),
                weights.len()
            )));
        }

        let classes = if params.criterion.is_classification() {
            sorted_classes(y)
        } else {
            Vec::new()
        };
        let mut builder = Builder {
            x,
            y,
            weights,
            params,
            classes: &classes,
            class_index: y.iter().map(|v| class_position(&classes, *v)).collect(),
            nodes: Vec::new(),
            rng,
        };
        let indices: Vec<usize> = (0..y.len()).filter(|&i| weights[i] > 0.0).collect();
        if indices.is_empty() {
            return Err(MlError::invalid_input("all sample weights are zero"));
        }
        builder.grow(indices, 0);
        let nodes = builder.nodes;

        Ok(Self {
            params,
            n_features: x.ncols(),
            classes,
            nodes,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn classes(&self) -> &[f64] {
        &self.classes
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], id: usize) -> usize {
            match &nodes[id] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, *left).max(walk(nodes, *right)),
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let mut id = 0;
        loop {
            match &self.nodes[id] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    id = if row[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
            }
        }
    }
}

impl Estimator for DecisionTree {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        x.rows().into_iter().map(|row| self.predict_row(row)).collect()
    }
}

pub(crate) fn sorted_classes(y: ArrayView1<'_, f64>) -> Vec<f64> {
    let mut classes: Vec<f64> = y.to_vec();
    classes.sort_by(f64::total_cmp);
    classes.dedup();
    classes
}

pub(crate) fn class_position(classes: &[f64], value: f64) -> usize {
    classes
        .binary_search_by(|c| c.total_cmp(&value))
        .unwrap_or_default()
}

struct Builder<'a, 'r> {
    x: ArrayView2<'a, f64>,
    y: ArrayView1<'a, f64>,
    weights: &'a [f64],
    params: TreeParams,
    classes: &'a [f64],
    class_index: Vec<usize>,
    nodes: Vec<Node>,
    rng: &'r mut StdRng,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    impurity: f64,
}

impl Builder<'_, '_> {
    fn grow(&mut self, indices: Vec<usize>, depth: usize) -> usize {
        let id = self.nodes.len();
        self.nodes.push(Node::Leaf {
            value: self.leaf_value(&indices),
        });

        let depth_reached = self.params.max_depth.is_some_and(|max| depth >= max);
        if depth_reached || indices.len() < self.params.min_samples_split.max(2) {
            return id;
        }
        let parent = self.node_impurity(&indices);
        if parent <= 1e-12 {
            return id;
        }
        let Some(best) = self.best_split(&indices) else {
            return id;
        };
        if best.impurity >= parent - 1e-12 {
            return id;
        }

        let (left, right): (Vec<usize>, Vec<usize>) = indices
            .into_iter()
            .partition(|&i| self.x[[i, best.feature]] <= best.threshold);
        let left_id = self.grow(left, depth + 1);
        let right_id = self.grow(right, depth + 1);
        self.nodes[id] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left: left_id,
            right: right_id,
        };
        id
    }

    fn candidate_features(&mut self) -> Vec<usize> {
        let n = self.x.ncols();
        match self.params.max_features {
            Some(k) if k < n => {
                let mut picked = rand::seq::index::sample(&mut *self.rng, n, k.max(1)).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n).collect(),
        }
    }

    fn best_split(&mut self, indices: &[usize]) -> Option<BestSplit> {
        let mut best: Option<BestSplit> = None;
        for feature in self.candidate_features() {
            let mut order = indices.to_vec();
            order.sort_by(|&a, &b| self.x[[a, feature]].total_cmp(&self.x[[b, feature]]));

            let mut left = Accumulator::new(self.params.criterion, self.classes.len());
            let mut right = Accumulator::new(self.params.criterion, self.classes.len());
            for &i in &order {
                right.add(self.weights[i], self.y[i], self.class_index[i]);
            }

            for pos in 0..order.len() - 1 {
                let i = order[pos];
                left.add(self.weights[i], self.y[i], self.class_index[i]);
                right.remove(self.weights[i], self.y[i], self.class_index[i]);

                let here = self.x[[i, feature]];
                let next = self.x[[order[pos + 1], feature]];
                if next <= here {
                    continue;
                }
                let impurity = left.weighted_impurity() + right.weighted_impurity();
                if best.as_ref().is_none_or(|b| impurity < b.impurity - 1e-12) {
                    best = Some(BestSplit {
                        feature,
                        threshold: here + (next - here) / 2.0,
                        impurity,
                    });
                }
            }
        }
        best
    }

    fn node_impurity(&self, indices: &[usize]) -> f64 {
        let mut acc = Accumulator::new(self.params.criterion, self.classes.len());
        for &i in indices {
            acc.add(self.weights[i], self.y[i], self.class_index[i]);
        }
        acc.weighted_impurity()
    }

    fn leaf_value(&self, indices: &[usize]) -> f64 {
        if self.params.criterion.is_classification() {
            let mut totals = vec![0.0; self.classes.len()];
            for &i in indices {
                totals[self.class_index[i]] += self.weights[i];
            }
            let mut best = 0;
            for (c, &w) in totals.iter().enumerate() {
                if w > totals[best] {
                    best = c;
                }
            }
            self.classes.get(best).copied().unwrap_or_default()
        } else {
            let (mut sum, mut total) = (0.0, 0.0);
            for &i in indices {
                sum += self.weights[i] * self.y[i];
                total += self.weights[i];
            }
            if total > 0.0 { sum / total } else { 0.0 }
        }
    }
}

/// Running sufficient statistics for one side of a split.
struct Accumulator {
    criterion: Criterion,
    class_weights: Vec<f64>,
    total: f64,
    sum: f64,
    sum_sq: f64,
}

impl Accumulator {
    fn new(criterion: Criterion, n_classes: usize) -> Self {
        Self {
            criterion,
            class_weights: vec![0.0; n_classes],
            total: 0.0,
            sum: 0.0,
            sum_sq: 0.0,
        }
    }

    fn add(&mut self, w: f64, y: f64, class: usize) {
        self.total += w;
        if self.criterion.is_classification() {
            self.class_weights[class] += w;
        } else {
            self.sum += w * y;
            self.sum_sq += w * y * y;
        }
    }

    fn remove(&mut self, w: f64, y: f64, class: usize) {
        self.total -= w;
        if self.criterion.is_classification() {
            self.class_weights[class] -= w;
        } else {
            self.sum -= w * y;
            self.sum_sq -= w * y * y;
        }
    }

    /// Impurity multiplied by the side's total weight.
    fn weighted_impurity(&self) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        match self.criterion {
            Criterion::Gini => {
                let sq: f64 = self
                    .class_weights
                    .iter()
                    .map(|w| (w / self.total).powi(2))
                    .sum();
                self.total * (1.0 - sq)
            }
            Criterion::Entropy => {
                let h: f64 = self
                    .class_weights
                    .iter()
                    .filter(|&&w| w > 0.0)
                    .map(|w| {
                        let p = w / self.total;
                        -p * p.log2()
                    })
                    .sum();
                self.total * h
            }
            Criterion::SquaredError => (self.sum_sq - self.sum * self.sum / self.total).max(0.0),
        }
    }
}

/// Number of features examined per split under a sampling rule.
pub fn feature_subset_size(n_features: usize, rule: MaxFeatures) -> Option<usize> {
    let n = n_features as f64;
    match rule {
        MaxFeatures::All => None,
        MaxFeatures::Sqrt => Some((n.sqrt() as usize).max(1)),
        MaxFeatures::Log2 => Some((n.log2() as usize).max(1)),
    }
}

/// Per-split feature sampling rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    All,
    Sqrt,
    Log2,
}

/// Draw a bootstrap sample as per-row multiplicities.
pub(crate) fn bootstrap_weights(n: usize, rng: &mut StdRng) -> Vec<f64> {
    let mut counts = vec![0.0; n];
    for _ in 0..n {
        counts[rng.gen_range(0..n)] += 1.0;
    }
    counts
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::SeedableRng;

    #[test]
    fn test_classifier_separates_threshold() {
        let x = array![[1.0], [2.0], [3.0], [10.0], [11.0], [12.0]];
        let y = array![0.0, 0.0, 0.0, 1.0, 1.0, 1.0];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(x.view(), y.view(), TreeParams::new(Criterion::Gini), &mut rng)
            .unwrap();
        assert_eq!(tree.depth(), 1);
        assert_eq!(tree.predict(x.view()), y);
        assert_eq!(tree.predict(array![[6.4], [6.6]].view()), array![0.0, 1.0]);
    }

    #[test]
    fn test_xor_has_no_improving_greedy_split() {
        let x = array![[0.0, 0.0], [0.0, 1.0], [1.0, 0.0], [1.0, 1.0]];
        let y = array![0.0, 1.0, 1.0, 0.0];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(x.view(), y.view(), TreeParams::new(Criterion::Entropy), &mut rng)
            .unwrap();
        assert_eq!(tree.depth(), 0);
        assert_eq!(tree.classes(), &[0.0, 1.0]);
    }

    #[test]
    fn test_regressor_fits_step_function() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![5.0, 5.0, 9.0, 9.0];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(
            x.view(),
            y.view(),
            TreeParams::new(Criterion::SquaredError),
            &mut rng,
        )
        .unwrap();
        assert_eq!(tree.predict(x.view()), y);
    }

    #[test]
    fn test_weights_steer_the_leaf_value() {
        let x = array![[1.0], [1.0]];
        let y = array![0.0, 1.0];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit_weighted(
            x.view(),
            y.view(),
            &[0.2, 0.8],
            TreeParams::new(Criterion::Gini),
            &mut rng,
        )
        .unwrap();
        assert_eq!(tree.predict_row(array![1.0].view()), 1.0);
    }

    #[test]
    fn test_feature_subset_size() {
        assert_eq!(feature_subset_size(30, MaxFeatures::Sqrt), Some(5));
        assert_eq!(feature_subset_size(30, MaxFeatures::Log2), Some(4));
        assert_eq!(feature_subset_size(30, MaxFeatures::All), None);
    }

    #[test]
    fn test_mismatched_inputs() {
        let mut rng = StdRng::seed_from_u64(0);
        let x = array![[1.0], [2.0]];
        let y = array![1.0];
        assert!(
            DecisionTree::fit(x.view(), y.view(), TreeParams::new(Criterion::Gini), &mut rng)
                .is_err()
        );
    }
}
