//! Data transformation: fit the KNN imputer on training features, impute
//! both splits, re-attach the (remapped) label and write `.npy` arrays plus
//! the fitted transformer.

use crate::artifacts::{TransformationArtifact, ValidationArtifact};
use crate::config::{TaskKind, TransformationConfig};
use crate::data::DataBatch;
use crate::error::{MlError, PipelineError, StageContext, StageKind};
use crate::features::Preprocessor;
use crate::layout::ArtifactLayout;
use crate::npy;
use crate::persistence::atomic_write_json;
use ndarray::{Array1, Array2, Axis, concatenate};
use tracing::info;

const STAGE: StageKind = StageKind::Transformation;

pub struct DataTransformation {
    config: TransformationConfig,
    task: TaskKind,
    layout: ArtifactLayout,
}

impl DataTransformation {
    pub fn new(config: TransformationConfig, task: TaskKind, layout: ArtifactLayout) -> Self {
        Self {
            config,
            task,
            layout,
        }
    }

    /// Only a validated (`status == true`) artifact is accepted.
    pub fn run(&self, validation: &ValidationArtifact) -> Result<TransformationArtifact, PipelineError> {
        let paths = validation.valid_paths().ok_or_else(|| {
            PipelineError::precondition(
                STAGE,
                format!(
                    "validation reported drift in {:?}; refusing to transform unvalidated data",
                    validation.drifted_columns()
                ),
            )
        })?;

        let train = DataBatch::read_csv(&paths.train_path)
            .stage_context(STAGE, "failed to read validated train split")?;
        let test = DataBatch::read_csv(&paths.test_path)
            .stage_context(STAGE, "failed to read validated test split")?;

        let target = &self.config.target_column;
        for (name, batch) in [("train", &train), ("test", &test)] {
            if batch.column_index(target).is_none() {
                return Err(PipelineError::stage(
                    STAGE,
                    format!("target column '{target}' missing from {name} split"),
                ));
            }
        }

        let feature_columns: Vec<String> = train
            .columns
            .iter()
            .filter(|c| *c != target)
            .cloned()
            .collect();
        let preprocessor = Preprocessor::fit(&train, feature_columns.clone(), self.config.imputer_neighbors)
            .stage_context(STAGE, "failed to fit imputer")?;

        let train_arr = self
            .to_array(&preprocessor, &train)
            .stage_context(STAGE, "failed to transform train split")?;
        let test_arr = self
            .to_array(&preprocessor, &test)
            .stage_context(STAGE, "failed to transform test split")?;

        let artifact = TransformationArtifact {
            transformed_train_path: self.layout.transformed_train_path(),
            transformed_test_path: self.layout.transformed_test_path(),
            transformer_path: self.layout.transformer_path(),
            feature_columns,
        };
        npy::write_npy(&artifact.transformed_train_path, &train_arr)
            .stage_context(STAGE, "failed to write transformed train array")?;
        npy::write_npy(&artifact.transformed_test_path, &test_arr)
            .stage_context(STAGE, "failed to write transformed test array")?;
        atomic_write_json(&artifact.transformer_path, &preprocessor)
            .stage_context(STAGE, "failed to save fitted transformer")?;

        info!(
            train_shape = ?train_arr.dim(),
            test_shape = ?test_arr.dim(),
            "Transformation complete"
        );
        Ok(artifact)
    }

    /// Imputed features with the label appended as the last column.
    fn to_array(&self, preprocessor: &Preprocessor, batch: &DataBatch) -> Result<Array2<f64>, MlError> {
        let x = preprocessor.transform(batch)?;
        let y = self.labels(batch)?;
        Ok(concatenate(Axis(1), &[x.view(), y.view().insert_axis(Axis(1))])?)
    }

    fn labels(&self, batch: &DataBatch) -> Result<Array1<f64>, MlError> {
        let mut y = batch.numeric_column(&self.config.target_column)?;
        if self.task == TaskKind::Classification {
            for value in &mut y {
                if let Some(rule) = self.config.label_remap.iter().find(|r| r.from == *value) {
                    *value = rule.to;
                }
            }
        }
        Ok(Array1::from_vec(y))
    }
}
