//! Per-run directory layout.
//!
//! ```text
//! artifacts/<%m_%d_%Y_%H_%M_%S>/
//!   data_ingestion/feature_store/<feature_store_file>
//!   data_ingestion/ingested/{train,test}.csv
//!   data_validation/{valid,invalid}/{train,test}.csv
//!   data_validation/drift_report.yaml
//!   data_transformation/{train.npy,test.npy,transformer.bin}
//!   model_trainer/model.bin
//!   run_summary.json
//! final_model/model.bin
//! ```

use crate::config::PipelineConfig;
use chrono::{DateTime, TimeZone};
use std::path::{Path, PathBuf};

pub const TIMESTAMP_FORMAT: &str = "%m_%d_%Y_%H_%M_%S";

/// Resolved paths for one pipeline run.
#[derive(Debug, Clone)]
pub struct ArtifactLayout {
    timestamp: String,
    run_root: PathBuf,
    model_dir: PathBuf,
    feature_store_file: String,
    train_file: String,
    test_file: String,
    report_file: String,
    model_file: String,
}

impl ArtifactLayout {
    pub fn new<Tz: TimeZone>(config: &PipelineConfig, started_at: &DateTime<Tz>) -> Self
    where
        Tz::Offset: std::fmt::Display,
    {
        let timestamp = started_at.format(TIMESTAMP_FORMAT).to_string();
        Self {
            run_root: config.artifacts.artifact_dir.join(&timestamp),
            timestamp,
            model_dir: config.artifacts.model_dir.clone(),
            feature_store_file: config.ingestion.feature_store_file.clone(),
            train_file: config.ingestion.train_file.clone(),
            test_file: config.ingestion.test_file.clone(),
            report_file: config.validation.report_file.clone(),
            model_file: config.trainer.model_file.clone(),
        }
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn run_root(&self) -> &Path {
        &self.run_root
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }

    pub fn feature_store_path(&self) -> PathBuf {
        self.run_root
            .join("data_ingestion")
            .join("feature_store")
            .join(&self.feature_store_file)
    }

    pub fn ingested_train_path(&self) -> PathBuf {
        self.ingested_dir().join(&self.train_file)
    }

    pub fn ingested_test_path(&self) -> PathBuf {
        self.ingested_dir().join(&self.test_file)
    }

    fn ingested_dir(&self) -> PathBuf {
        self.run_root.join("data_ingestion").join("ingested")
    }

    fn validation_dir(&self) -> PathBuf {
        self.run_root.join("data_validation")
    }

    pub fn valid_train_path(&self) -> PathBuf {
        self.validation_dir().join("valid").join(&self.train_file)
    }

    pub fn valid_test_path(&self) -> PathBuf {
        self.validation_dir().join("valid").join(&self.test_file)
    }

    pub fn invalid_train_path(&self) -> PathBuf {
        self.validation_dir().join("invalid").join(&self.train_file)
    }

    pub fn invalid_test_path(&self) -> PathBuf {
        self.validation_dir().join("invalid").join(&self.test_file)
    }

    pub fn drift_report_path(&self) -> PathBuf {
        self.validation_dir().join(&self.report_file)
    }

    pub fn transformation_dir(&self) -> PathBuf {
        self.run_root.join("data_transformation")
    }

    pub fn transformed_train_path(&self) -> PathBuf {
        self.transformation_dir()
            .join(Path::new(&self.train_file).with_extension("npy"))
    }

    pub fn transformed_test_path(&self) -> PathBuf {
        self.transformation_dir()
            .join(Path::new(&self.test_file).with_extension("npy"))
    }

    pub fn transformer_path(&self) -> PathBuf {
        self.transformation_dir().join("transformer.bin")
    }

    pub fn trainer_dir(&self) -> PathBuf {
        self.run_root.join("model_trainer")
    }

    pub fn trained_model_path(&self) -> PathBuf {
        self.trainer_dir().join(&self.model_file)
    }

    pub fn final_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.model_file)
    }

    pub fn run_summary_path(&self) -> PathBuf {
        self.run_root.join("run_summary.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn test_layout_paths() {
        let started = Utc.with_ymd_and_hms(2024, 3, 7, 9, 5, 2).unwrap();
        let layout = ArtifactLayout::new(&PipelineConfig::default(), &started);

        assert_eq!(layout.timestamp(), "03_07_2024_09_05_02");
        assert_eq!(
            layout.run_root(),
            Path::new("artifacts/03_07_2024_09_05_02")
        );
        assert!(layout
            .ingested_train_path()
            .ends_with("data_ingestion/ingested/train.csv"));
        assert!(layout
            .invalid_test_path()
            .ends_with("data_validation/invalid/test.csv"));
        assert!(layout
            .drift_report_path()
            .ends_with("data_validation/drift_report.yaml"));
        assert!(layout
            .transformed_test_path()
            .ends_with("data_transformation/test.npy"));
        assert!(layout
            .trained_model_path()
            .ends_with("model_trainer/model.bin"));
        assert_eq!(layout.final_model_path(), Path::new("final_model/model.bin"));
    }
}
