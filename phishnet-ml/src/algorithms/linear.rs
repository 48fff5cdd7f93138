//! Linear models: penalised logistic regression and elastic net.

use crate::algorithms::Estimator;
use crate::algorithms::tree::sorted_classes;
use crate::error::MlError;
use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

/// Regularisation applied to the coefficients (never the intercept).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Penalty {
    L1,
    L2,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LogisticParams {
    /// Inverse regularisation strength.
    pub c: f64,
    pub penalty: Penalty,
    pub max_iter: usize,
    pub learning_rate: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            penalty: Penalty::L2,
            max_iter: 300,
            learning_rate: 0.5,
        }
    }
}

/// Per-feature standardisation learned from the training matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Scaler {
    mean: Vec<f64>,
    scale: Vec<f64>,
}

impl Scaler {
    fn fit(x: ArrayView2<'_, f64>) -> Self {
        let mean = x.mean_axis(Axis(0)).map(|m| m.to_vec()).unwrap_or_default();
        let scale = x
            .std_axis(Axis(0), 0.0)
            .iter()
            .map(|&s| if s > 1e-12 { s } else { 1.0 })
            .collect();
        Self { mean, scale }
    }

    fn apply(&self, x: ArrayView2<'_, f64>) -> Array2<f64> {
        let mut out = x.to_owned();
        for (j, mut col) in out.columns_mut().into_iter().enumerate() {
            let (m, s) = (self.mean[j], self.scale[j]);
            col.mapv_inplace(|v| (v - m) / s);
        }
        out
    }
}

/// Binary logistic regression trained with full-batch gradient descent on
/// standardised features. L1 uses a proximal (soft-threshold) step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// `[negative, positive]` labels; a single entry means constant output.
    classes: Vec<f64>,
    scaler: Scaler,
    coef: Vec<f64>,
    intercept: f64,
}

impl LogisticRegression {
    pub fn fit(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, params: LogisticParams) -> Result<Self, MlError> {
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(MlError::invalid_input("logistic regression needs matching non-empty inputs"));
        }
        if params.c <= 0.0 {
            return Err(MlError::invalid_input("C must be positive"));
        }
        let classes = sorted_classes(y);
        if classes.len() > 2 {
            return Err(MlError::invalid_input(format!(
                "logistic regression supports two classes, found {}",
                classes.len()
            )));
        }

        let scaler = Scaler::fit(x);
        let xs = scaler.apply(x);
        let n = xs.nrows() as f64;
        let mut coef = Array1::<f64>::zeros(xs.ncols());
        let mut intercept = 0.0;

        if classes.len() == 2 {
            let target: Array1<f64> = y.mapv(|v| if v == classes[1] { 1.0 } else { 0.0 });
            let reg = 1.0 / (params.c * n);
            let lr = params.learning_rate;
            for _ in 0..params.max_iter {
                let z = xs.dot(&coef) + intercept;
                let residual = z.mapv(sigmoid) - &target;
                let mut grad = xs.t().dot(&residual) / n;
                if params.penalty == Penalty::L2 {
                    grad = grad + &coef * reg;
                }
                let grad_b = residual.sum() / n;

                coef = coef - grad * lr;
                intercept -= lr * grad_b;
                if params.penalty == Penalty::L1 {
                    let t = lr * reg;
                    coef.mapv_inplace(|w| w.signum() * (w.abs() - t).max(0.0));
                }
            }
        }

        Ok(Self {
            classes,
            scaler,
            coef: coef.to_vec(),
            intercept,
        })
    }

    /// Probability of the positive class.
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let xs = self.scaler.apply(x);
        let coef = ArrayView1::from(&self.coef[..]);
        (xs.dot(&coef) + self.intercept).mapv(sigmoid)
    }
}

impl Estimator for LogisticRegression {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        match self.classes.as_slice() {
            [neg, pos] => self
                .predict_proba(x)
                .mapv(|p| if p >= 0.5 { *pos } else { *neg }),
            [only] => Array1::from_elem(x.nrows(), *only),
            _ => Array1::zeros(x.nrows()),
        }
    }
}

fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ElasticNetParams {
    pub alpha: f64,
    pub l1_ratio: f64,
    pub max_iter: usize,
    pub tol: f64,
}

impl ElasticNetParams {
    pub fn new(alpha: f64, l1_ratio: f64) -> Self {
        Self {
            alpha,
            l1_ratio,
            max_iter: 1000,
            tol: 1e-4,
        }
    }
}

/// Elastic net regression fitted by cyclic coordinate descent, minimising
/// `1/(2n)·‖y − Xw − b‖² + α·ρ·‖w‖₁ + α·(1−ρ)/2·‖w‖²`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElasticNet {
    coef: Vec<f64>,
    intercept: f64,
}

impl ElasticNet {
    pub fn fit(x: ArrayView2<'_, f64>, y: ArrayView1<'_, f64>, params: ElasticNetParams) -> Result<Self, MlError> {
        if x.nrows() == 0 || x.nrows() != y.len() {
            return Err(MlError::invalid_input("elastic net needs matching non-empty inputs"));
        }
        if params.alpha < 0.0 || !(0.0..=1.0).contains(&params.l1_ratio) {
            return Err(MlError::invalid_input("alpha must be >= 0 and l1_ratio in [0, 1]"));
        }

        let n = x.nrows() as f64;
        let x_mean = x.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(x.ncols()));
        let y_mean = y.mean().unwrap_or(0.0);
        let xc = &x - &x_mean;
        let mut residual = &y - y_mean;
        let col_sq: Vec<f64> = xc.columns().into_iter().map(|c| c.dot(&c)).collect();

        let l1 = params.alpha * params.l1_ratio * n;
        let l2 = params.alpha * (1.0 - params.l1_ratio) * n;
        let mut coef = vec![0.0; x.ncols()];

        for _ in 0..params.max_iter {
            let mut max_change: f64 = 0.0;
            let mut max_coef: f64 = 0.0;
            for j in 0..coef.len() {
                if col_sq[j] == 0.0 {
                    continue;
                }
                let col = xc.column(j);
                let old = coef[j];
                let rho = col.dot(&residual) + col_sq[j] * old;
                let new = soft_threshold(rho, l1) / (col_sq[j] + l2);
                if new != old {
                    residual.scaled_add(old - new, &col);
                    coef[j] = new;
                }
                max_change = max_change.max((new - old).abs());
                max_coef = max_coef.max(new.abs());
            }
            if max_change <= params.tol * max_coef.max(1e-12) {
                break;
            }
        }

        let intercept = y_mean - x_mean.iter().zip(&coef).map(|(m, w)| m * w).sum::<f64>();
        Ok(Self { coef, intercept })
    }

    pub fn coefficients(&self) -> &[f64] {
        &self.coef
    }
}

impl Estimator for ElasticNet {
    fn predict(&self, x: ArrayView2<'_, f64>) -> Array1<f64> {
        let coef = ArrayView1::from(&self.coef[..]);
        x.dot(&coef) + self.intercept
    }
}

fn soft_threshold(value: f64, threshold: f64) -> f64 {
    value.signum() * (value.abs() - threshold).max(0.0)
}
