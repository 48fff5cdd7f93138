//! Feature preprocessing fitted during transformation and reused at prediction.

pub mod imputer;

pub use imputer::KnnImputer;

use crate::data::DataBatch;
use crate::error::MlError;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

/// The fitted transformer persisted as `transformer.bin`: which columns are
/// features, in which order, and how their missing values are filled.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    pub feature_columns: Vec<String>,
    pub imputer: KnnImputer,
}

impl Preprocessor {
    /// Fit on the feature columns of `batch`.
    pub fn fit(batch: &DataBatch, feature_columns: Vec<String>, n_neighbors: usize) -> Result<Self, MlError> {
        let x = feature_matrix(batch, &feature_columns)?;
        let mut imputer = KnnImputer::new(n_neighbors);
        imputer.fit(&x)?;
        Ok(Self {
            feature_columns,
            imputer,
        })
    }

    /// Select the feature columns from `batch` and impute missing values.
    pub fn transform(&self, batch: &DataBatch) -> Result<Array2<f64>, MlError> {
        let x = feature_matrix(batch, &self.feature_columns)?;
        self.imputer.transform(&x)
    }
}

/// Dense matrix of the named columns; missing cells are NaN.
pub fn feature_matrix(batch: &DataBatch, columns: &[String]) -> Result<Array2<f64>, MlError> {
    let rows = batch.numeric_matrix(columns)?;
    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((batch.row_count(), columns.len()), flat)?)
}
