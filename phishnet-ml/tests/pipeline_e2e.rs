//! End-to-end runs of the training pipeline over small synthetic collections.
//!
//! Rows repeat with period 10 and the split is unshuffled, so the 80-row train
//! split and the 20-row test split have identical value distributions unless
//! a test deliberately shifts the tail.

use phishnet_ml::config::{SourceConfig, TrackingBackend};
use phishnet_ml::data::DataBatch;
use phishnet_ml::tracking::ExperimentRegistry;
use phishnet_ml::{
    ComposedPredictor, PREDICTION_COLUMN, PipelineConfig, PipelineError, PipelineOutcome,
    PipelineState, RunSummary, SyncOutcome, TrainingPipeline, predict_csv,
};
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const SCHEMA: &str = "\
columns:
  - having_IP_Address: int64
  - URL_Length: int64
  - Result: int64
numerical_columns:
  - having_IP_Address
  - URL_Length
";

/// Write a 100-row collection; the last `shifted` rows get +1000 on the
/// first feature.
fn write_collection(dir: &Path, shifted: usize) -> PathBuf {
    let path = dir.join("phisingData.csv");
    let mut csv = String::from("_id,having_IP_Address,URL_Length,Result\n");
    for i in 0..100 {
        let cycle = i % 10;
        let label = if cycle < 5 { 1 } else { -1 };
        let mut ip = cycle as i64;
        if i >= 100 - shifted {
            ip += 1000;
        }
        csv.push_str(&format!("row{i},{ip},{},{label}\n", cycle % 5));
    }
    std::fs::write(&path, csv).unwrap();
    path
}

fn config_in(dir: &TempDir, shifted: usize) -> PipelineConfig {
    let schema_path = dir.path().join("schema.yaml");
    std::fs::write(&schema_path, SCHEMA).unwrap();

    let mut config = PipelineConfig::default();
    config.artifacts.artifact_dir = dir.path().join("artifacts");
    config.artifacts.model_dir = dir.path().join("final_model");
    config.ingestion.source = SourceConfig::Csv {
        path: write_collection(dir.path(), shifted),
    };
    config.ingestion.shuffle = false;
    config.validation.schema_path = schema_path;
    config
}

fn read_summary(pipeline: &TrainingPipeline) -> RunSummary {
    let text = std::fs::read_to_string(pipeline.layout().run_summary_path()).unwrap();
    serde_json::from_str(&text).unwrap()
}

#[tokio::test]
async fn identical_distributions_complete_through_training() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, 0);
    config.tracking.backend = TrackingBackend::File;
    let mut pipeline = TrainingPipeline::new(config.clone()).unwrap();

    let outcome = pipeline.run().await.unwrap();
    let PipelineOutcome::Completed { trainer, sync } = outcome else {
        panic!("expected a completed run");
    };
    assert_eq!(sync, SyncOutcome::Disabled);
    assert_eq!(pipeline.state(), PipelineState::Unsynced);

    let report = std::fs::read_to_string(pipeline.layout().drift_report_path()).unwrap();
    let report: serde_yaml::Value = serde_yaml::from_str(&report).unwrap();
    for column in ["having_IP_Address", "URL_Length", "Result"] {
        assert_eq!(report[column]["drift_status"], serde_yaml::Value::Bool(false));
        assert_eq!(report[column]["p_value"].as_f64(), Some(1.0));
    }

    assert!(trainer.final_model_path.exists());
    assert!(trainer.trained_model_path.exists());
    assert!(trainer.test_metric.score() >= 0.6);
    assert!(pipeline.layout().transformed_train_path().exists());

    let summary = read_summary(&pipeline);
    assert_eq!(summary.state, PipelineState::Unsynced);
    assert_eq!(
        summary.history.iter().map(|t| t.to).collect::<Vec<_>>(),
        vec![
            PipelineState::Ingesting,
            PipelineState::Validating,
            PipelineState::Transforming,
            PipelineState::Training,
            PipelineState::Syncing,
            PipelineState::Unsynced,
        ]
    );
    assert!(summary.error.is_none());

    let registry =
        ExperimentRegistry::load(&config.artifacts.artifact_dir.join("experiments.json")).unwrap();
    assert_eq!(registry.runs.len(), 1);
    assert_eq!(registry.runs[0].model_sha256, trainer.model_sha256);
}

#[tokio::test]
async fn shifted_column_is_rejected_without_training() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = TrainingPipeline::new(config_in(&dir, 20)).unwrap();

    let outcome = pipeline.run().await.unwrap();
    let PipelineOutcome::Rejected { validation } = outcome else {
        panic!("expected the drift gate to reject the run");
    };
    assert!(!validation.status());
    assert_eq!(validation.drifted_columns(), ["having_IP_Address".to_string()]);
    assert!(validation.invalid_paths().unwrap().test_path.exists());
    assert!(validation.valid_paths().is_none());
    assert_eq!(pipeline.state(), PipelineState::Rejected);

    let layout = pipeline.layout();
    assert!(layout.drift_report_path().exists());
    assert!(!layout.transformation_dir().exists());
    assert!(!layout.trainer_dir().exists());
    assert!(!layout.final_model_path().exists());
    assert_eq!(read_summary(&pipeline).state, PipelineState::Rejected);
}

#[tokio::test]
async fn score_below_floor_fails_and_writes_no_model() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, 0);
    config.trainer.min_score_floor = 1.01;
    let mut pipeline = TrainingPipeline::new(config).unwrap();

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::QualityGate { .. }));
    assert_eq!(pipeline.state(), PipelineState::Failed);
    assert!(!pipeline.layout().trained_model_path().exists());
    assert!(!pipeline.layout().final_model_path().exists());

    let summary = read_summary(&pipeline);
    assert_eq!(summary.state, PipelineState::Failed);
    assert!(summary.error.unwrap().contains("quality gate"));
    assert!(summary.transformation.is_some());
    assert!(summary.trainer.is_none());
}

#[tokio::test]
async fn soft_gate_warnings_are_recorded_not_fatal() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, 0);
    config.trainer.expected_score = 1.01;
    config.trainer.overfitting_threshold = -1.0;
    let mut pipeline = TrainingPipeline::new(config).unwrap();

    let PipelineOutcome::Completed { trainer, .. } = pipeline.run().await.unwrap() else {
        panic!("expected a completed run");
    };
    assert!(trainer.final_model_path.exists());
    assert_eq!(pipeline.state(), PipelineState::Unsynced);

    let summary = read_summary(&pipeline);
    assert_eq!(summary.warnings.len(), 2);
    assert!(summary.warnings.iter().any(|w| w.contains("gap")));
    assert!(summary.warnings.iter().any(|w| w.contains("expected")));
    assert!(summary.error.is_none());
}

#[tokio::test]
async fn completed_pipeline_refuses_a_second_run() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = TrainingPipeline::new(config_in(&dir, 0)).unwrap();
    pipeline.run().await.unwrap();
    let history = pipeline.history().to_vec();
    let first_summary = std::fs::read_to_string(pipeline.layout().run_summary_path()).unwrap();

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(err, PipelineError::Precondition { .. }));
    assert_eq!(pipeline.state(), PipelineState::Unsynced);
    assert_eq!(pipeline.history(), history.as_slice());
    assert_eq!(
        std::fs::read_to_string(pipeline.layout().run_summary_path()).unwrap(),
        first_summary
    );
    assert!(!pipeline.layout().invalid_train_path().exists());
}

#[tokio::test]
async fn missing_source_fails_in_ingestion() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, 0);
    config.ingestion.source = SourceConfig::Csv {
        path: dir.path().join("nowhere.csv"),
    };
    let mut pipeline = TrainingPipeline::new(config).unwrap();

    let err = pipeline.run().await.unwrap_err();
    assert_eq!(err.stage_kind(), Some(phishnet_ml::StageKind::Ingestion));
    assert_eq!(pipeline.state(), PipelineState::Failed);
}

#[tokio::test]
async fn local_mirror_marks_run_synced() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, 0);
    let mirror = dir.path().join("bucket");
    config.sync.enabled = true;
    config.sync.target_uri = Some(format!("file://{}", mirror.display()));
    let mut pipeline = TrainingPipeline::new(config).unwrap();

    let outcome = pipeline.run().await.unwrap();
    let PipelineOutcome::Completed { sync, .. } = outcome else {
        panic!("expected a completed run");
    };
    assert!(sync.is_synced());
    assert_eq!(pipeline.state(), PipelineState::Synced);

    let ts = pipeline.layout().timestamp();
    assert!(mirror.join("final_model").join(ts).join("model.bin").exists());
    assert!(
        mirror
            .join("artifact")
            .join(ts)
            .join("run_summary.json")
            .exists()
    );
}

#[tokio::test]
async fn failed_mirror_keeps_training_result() {
    let dir = TempDir::new().unwrap();
    let mut config = config_in(&dir, 0);
    config.sync.enabled = true;
    config.sync.target_uri = Some("s3://phishnet-test".into());
    config.sync.aws_cli = dir.path().join("no-such-aws").display().to_string();
    let mut pipeline = TrainingPipeline::new(config).unwrap();

    let outcome = pipeline.run().await.unwrap();
    let PipelineOutcome::Completed { trainer, sync } = outcome else {
        panic!("expected a completed run");
    };
    assert!(matches!(sync, SyncOutcome::Failed { .. }));
    assert!(trainer.final_model_path.exists());
    assert_eq!(pipeline.state(), PipelineState::Unsynced);
}

#[tokio::test]
async fn published_model_scores_the_feature_store() {
    let dir = TempDir::new().unwrap();
    let mut pipeline = TrainingPipeline::new(config_in(&dir, 0)).unwrap();
    let PipelineOutcome::Completed { trainer, .. } = pipeline.run().await.unwrap() else {
        panic!("expected a completed run");
    };

    let predictor = ComposedPredictor::load(&trainer.final_model_path).unwrap();
    let input = pipeline.layout().feature_store_path();
    let output = dir.path().join("prediction_output").join("prediction.csv");
    let summary = predict_csv(&predictor, &input, &output, "Result").unwrap();
    assert_eq!(summary.rows, 100);

    let original = DataBatch::read_csv(&input).unwrap();
    let predicted = DataBatch::read_csv(&output).unwrap();
    assert!(predicted.column_index("Result").is_none());
    let expected: Vec<f64> = original
        .numeric_column("Result")
        .unwrap()
        .into_iter()
        .map(|label| if label == 1.0 { 1.0 } else { 0.0 })
        .collect();
    assert_eq!(predicted.numeric_column(PREDICTION_COLUMN).unwrap(), expected);

    // Reloading the same file predicts identically.
    let again = ComposedPredictor::load(&trainer.final_model_path).unwrap();
    assert_eq!(
        again.predict(&original).unwrap(),
        predictor.predict(&original).unwrap()
    );
}
