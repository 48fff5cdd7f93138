//! The composed "transform then predict" unit written as `model.bin`, and
//! batch prediction over a CSV file.

use crate::algorithms::{ClassicalAlgorithm, Estimator, FittedModel};
use crate::config::TaskKind;
use crate::data::DataBatch;
use crate::error::MlError;
use crate::features::Preprocessor;
use crate::persistence::{atomic_write_json, load_json};
use ndarray::Array1;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Column appended by batch prediction.
pub const PREDICTION_COLUMN: &str = "predicted_column";

/// Fitted preprocessor plus fitted model. Inputs go through the preprocessor
/// first, so callers hand in raw rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComposedPredictor {
    pub task: TaskKind,
    pub algorithm: ClassicalAlgorithm,
    pub preprocessor: Preprocessor,
    pub model: FittedModel,
    pub trained_at: chrono::DateTime<chrono::Utc>,
}

impl ComposedPredictor {
    pub fn new(
        task: TaskKind,
        algorithm: ClassicalAlgorithm,
        preprocessor: Preprocessor,
        model: FittedModel,
    ) -> Self {
        Self {
            task,
            algorithm,
            preprocessor,
            model,
            trained_at: chrono::Utc::now(),
        }
    }

    pub fn feature_columns(&self) -> &[String] {
        &self.preprocessor.feature_columns
    }

    pub fn predict(&self, batch: &DataBatch) -> Result<Array1<f64>, MlError> {
        let x = self.preprocessor.transform(batch)?;
        Ok(self.model.predict(x.view()))
    }

    pub fn save(&self, path: &Path) -> Result<(), MlError> {
        atomic_write_json(path, self)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, MlError> {
        load_json(path)?
            .ok_or_else(|| MlError::model(format!("no model found at {}", path.display())))
    }
}

/// Result of [`predict_csv`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub output_path: PathBuf,
    pub rows: usize,
}

/// Score every row of `input`, dropping `target_column` if present, and write
/// the rows with an extra [`PREDICTION_COLUMN`] to `output`.
pub fn predict_csv(
    predictor: &ComposedPredictor,
    input: &Path,
    output: &Path,
    target_column: &str,
) -> Result<PredictionSummary, MlError> {
    let mut batch = DataBatch::read_csv(input)?;
    if batch.is_empty() {
        return Err(MlError::dataset(format!("{} has no rows", input.display())));
    }
    batch.drop_column(target_column);

    let predictions = predictor.predict(&batch)?;
    let values = predictions
        .iter()
        .map(|&p| match predictor.task {
            // Classifier outputs are whole labels.
            TaskKind::Classification if p.fract() == 0.0 => serde_json::Value::from(p as i64),
            _ => serde_json::Value::from(p),
        })
        .collect();
    batch.push_column(PREDICTION_COLUMN, values)?;
    batch.write_csv(output)?;

    info!(
        input = %input.display(),
        output = %output.display(),
        rows = batch.row_count(),
        "Batch prediction written"
    );
    Ok(PredictionSummary {
        output_path: output.to_path_buf(),
        rows: batch.row_count(),
    })
}
