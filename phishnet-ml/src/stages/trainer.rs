//! Model training: grid search over the candidate families, quality gates,
//! then persistence of the composed predictor.

use crate::algorithms::{Estimator, candidate_families};
use crate::artifacts::{TrainerArtifact, TransformationArtifact};
use crate::config::TrainerConfig;
use crate::error::{MlError, PipelineError, StageContext, StageKind};
use crate::features::Preprocessor;
use crate::layout::ArtifactLayout;
use crate::metrics;
use crate::npy;
use crate::persistence::{hash_file, load_json};
use crate::predictor::ComposedPredictor;
use crate::search::{FamilyReport, SearchData, TrialRecord, grid_search};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis, s};
use tracing::{info, warn};

const STAGE: StageKind = StageKind::Training;

/// The artifact plus what the search measured, for tracking sinks.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub artifact: TrainerArtifact,
    pub trials: Vec<TrialRecord>,
    pub families: Vec<FamilyReport>,
    /// Non-fatal gate violations (overfitting, below expected score).
    pub warnings: Vec<String>,
}

pub struct ModelTrainer {
    config: TrainerConfig,
    layout: ArtifactLayout,
}

impl ModelTrainer {
    pub fn new(config: TrainerConfig, layout: ArtifactLayout) -> Self {
        Self { config, layout }
    }

    pub fn run(&self, transformation: &TransformationArtifact) -> Result<TrainingOutcome, PipelineError> {
        let train = npy::read_npy(&transformation.transformed_train_path)
            .stage_context(STAGE, "failed to read transformed train array")?;
        let test = npy::read_npy(&transformation.transformed_test_path)
            .stage_context(STAGE, "failed to read transformed test array")?;
        let (x_train, y_train) = split_label(&train).stage_context(STAGE, "malformed train array")?;
        let (x_test, y_test) = split_label(&test).stage_context(STAGE, "malformed test array")?;
        if x_train.ncols() != x_test.ncols() {
            return Err(PipelineError::stage(
                STAGE,
                format!(
                    "train has {} features but test has {}",
                    x_train.ncols(),
                    x_test.ncols()
                ),
            ));
        }

        let task = self.config.task;
        let families = candidate_families(task);
        let data = SearchData {
            x_train,
            y_train,
            x_test,
            y_test,
        };
        let report = grid_search(task, &families, data, self.config.cv_folds, self.config.seed)
            .stage_context(STAGE, "model search failed")?;

        let best = report.best().clone();
        info!(
            family = %best.family,
            cv_score = best.cv_score,
            train_score = best.train_score,
            test_score = best.test_score,
            "Best model selected"
        );
        if best.test_score < self.config.min_score_floor {
            return Err(PipelineError::QualityGate {
                score: best.test_score,
                floor: self.config.min_score_floor,
            });
        }
        let warnings = self.soft_gates(&best);

        let preprocessor: Preprocessor = load_json(&transformation.transformer_path)
            .stage_context(STAGE, "failed to load fitted transformer")?
            .ok_or_else(|| {
                PipelineError::stage(
                    STAGE,
                    format!(
                        "transformer not found at {}",
                        transformation.transformer_path.display()
                    ),
                )
            })?;

        let trials = report.trials.clone();
        let family_reports = report.families.clone();
        let (_, model) = report.into_best();
        let train_metric = metrics::metric_for(task, &y_train.to_vec(), &model.predict(x_train).to_vec());
        let test_metric = metrics::metric_for(task, &y_test.to_vec(), &model.predict(x_test).to_vec());

        let predictor = ComposedPredictor::new(task, best.algorithm, preprocessor, model);
        let trained_model_path = self.layout.trained_model_path();
        let final_model_path = self.layout.final_model_path();
        predictor
            .save(&trained_model_path)
            .stage_context(STAGE, "failed to save trained model")?;
        predictor
            .save(&final_model_path)
            .stage_context(STAGE, "failed to publish final model")?;
        let model_sha256 =
            hash_file(&trained_model_path).stage_context(STAGE, "failed to hash trained model")?;

        let params = serde_json::to_value(best.algorithm)
            .stage_context(STAGE, "failed to serialise model parameters")?;
        info!(
            path = %final_model_path.display(),
            sha256 = %model_sha256,
            "Model published"
        );

        Ok(TrainingOutcome {
            artifact: TrainerArtifact {
                trained_model_path,
                final_model_path,
                model_family: best.family,
                params,
                train_metric,
                test_metric,
                model_sha256,
            },
            trials,
            families: family_reports,
            warnings,
        })
    }

    fn soft_gates(&self, best: &FamilyReport) -> Vec<String> {
        let mut warnings = Vec::new();
        let gap = (best.train_score - best.test_score).abs();
        if gap > self.config.overfitting_threshold {
            let msg = format!(
                "train/test score gap {gap:.4} exceeds {:.4}",
                self.config.overfitting_threshold
            );
            warn!(family = %best.family, "{msg}");
            warnings.push(msg);
        }
        if best.test_score < self.config.expected_score {
            let msg = format!(
                "test score {:.4} is below the expected {:.4}",
                best.test_score, self.config.expected_score
            );
            warn!(family = %best.family, "{msg}");
            warnings.push(msg);
        }
        warnings
    }
}

/// Features are every column but the last; the label is the last.
fn split_label(array: &Array2<f64>) -> Result<(ArrayView2<'_, f64>, ArrayView1<'_, f64>), MlError> {
    let (rows, cols) = array.dim();
    if cols < 2 || rows == 0 {
        return Err(MlError::dataset(format!(
            "expected at least one row and two columns, got {rows}x{cols}"
        )));
    }
    Ok((
        array.slice(s![.., ..cols - 1]),
        array.index_axis(Axis(1), cols - 1),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::data::DataBatch;
    use crate::persistence::atomic_write_json;
    use chrono::Utc;
    use serde_json::json;
    use tempfile::TempDir;

    fn rows(n: usize) -> Vec<Vec<f64>> {
        (0..n)
            .map(|i| {
                let label = (i % 2) as f64;
                vec![label * 5.0 + (i % 3) as f64 * 0.1, (i % 4) as f64, label]
            })
            .collect()
    }

    fn to_array(rows: &[Vec<f64>]) -> Array2<f64> {
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Array2::from_shape_vec((rows.len(), 3), flat).unwrap()
    }

    fn fixture(dir: &TempDir, floor: f64) -> (ModelTrainer, TransformationArtifact) {
        let mut config = PipelineConfig::default();
        config.artifacts.artifact_dir = dir.path().join("artifacts");
        config.artifacts.model_dir = dir.path().join("final_model");
        config.trainer.min_score_floor = floor;
        let layout = ArtifactLayout::new(&config, &Utc::now());

        let train = rows(30);
        let test = rows(10);
        let artifact = TransformationArtifact {
            transformed_train_path: layout.transformed_train_path(),
            transformed_test_path: layout.transformed_test_path(),
            transformer_path: layout.transformer_path(),
            feature_columns: vec!["a".into(), "b".into()],
        };
        npy::write_npy(&artifact.transformed_train_path, &to_array(&train)).unwrap();
        npy::write_npy(&artifact.transformed_test_path, &to_array(&test)).unwrap();

        let batch = DataBatch::new(
            vec!["a".into(), "b".into()],
            train.iter().map(|r| vec![json!(r[0]), json!(r[1])]).collect(),
        );
        let pre = Preprocessor::fit(&batch, artifact.feature_columns.clone(), 3).unwrap();
        atomic_write_json(&artifact.transformer_path, &pre).unwrap();

        (ModelTrainer::new(config.trainer, layout), artifact)
    }

    #[test]
    fn test_trains_and_publishes_model() {
        let dir = TempDir::new().unwrap();
        let (trainer, transformation) = fixture(&dir, 0.6);
        let outcome = trainer.run(&transformation).unwrap();
        let artifact = &outcome.artifact;

        assert!(artifact.trained_model_path.exists());
        assert!(artifact.final_model_path.exists());
        assert_eq!(artifact.model_sha256.len(), 64);
        assert_eq!(artifact.test_metric.score(), 1.0);
        assert_eq!(artifact.model_family, "Random Forest");
        assert_eq!(outcome.families.len(), 5);
        assert!(outcome.warnings.is_empty());

        let loaded = ComposedPredictor::load(&artifact.final_model_path).unwrap();
        assert_eq!(loaded.feature_columns(), ["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_floor_blocks_persistence() {
        let dir = TempDir::new().unwrap();
        let (trainer, transformation) = fixture(&dir, 1.01);
        let err = trainer.run(&transformation).unwrap_err();
        assert!(matches!(err, PipelineError::QualityGate { floor, .. } if floor == 1.01));
        assert!(!trainer.layout.trained_model_path().exists());
        assert!(!trainer.layout.final_model_path().exists());
    }

    #[test]
    fn test_soft_gates_warn_but_publish() {
        let dir = TempDir::new().unwrap();
        let (mut trainer, transformation) = fixture(&dir, 0.6);
        trainer.config.expected_score = 1.01;
        trainer.config.overfitting_threshold = -1.0;

        let outcome = trainer.run(&transformation).unwrap();
        assert!(outcome.artifact.trained_model_path.exists());
        assert!(outcome.artifact.final_model_path.exists());
        assert_eq!(outcome.warnings.len(), 2);
        assert!(outcome.warnings[0].contains("gap"));
        assert!(outcome.warnings[1].contains("below the expected 1.0100"));
    }

    #[test]
    fn test_split_label_rejects_single_column() {
        let arr = Array2::<f64>::zeros((3, 1));
        assert!(split_label(&arr).is_err());
    }
}
