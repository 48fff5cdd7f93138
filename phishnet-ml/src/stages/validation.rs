//! Data validation: schema conformance, then per-column drift between the
//! train and test splits. The drift report is always written; the splits are
//! copied under `valid/` or `invalid/` depending on the verdict.

use crate::artifacts::{IngestionArtifact, SplitPaths, ValidationArtifact};
use crate::config::ValidationConfig;
use crate::data::{DataBatch, DatasetSchema};
use crate::drift::DriftReport;
use crate::error::{PipelineError, StageContext, StageKind};
use crate::layout::ArtifactLayout;
use std::path::Path;
use tracing::{info, warn};

const STAGE: StageKind = StageKind::Validation;

pub struct DataValidation {
    config: ValidationConfig,
    layout: ArtifactLayout,
}

impl DataValidation {
    pub fn new(config: ValidationConfig, layout: ArtifactLayout) -> Self {
        Self { config, layout }
    }

    pub fn run(&self, ingestion: &IngestionArtifact) -> Result<ValidationArtifact, PipelineError> {
        let schema = DatasetSchema::load(&self.config.schema_path)
            .stage_context(STAGE, "failed to read dataset schema")?;
        let train = DataBatch::read_csv(&ingestion.train_path)
            .stage_context(STAGE, "failed to read train split")?;
        let test = DataBatch::read_csv(&ingestion.test_path)
            .stage_context(STAGE, "failed to read test split")?;

        for (name, batch) in [("train", &train), ("test", &test)] {
            schema
                .check_column_count(batch)
                .stage_context(STAGE, format!("{name} split does not match the schema"))?;
            schema
                .check_numerical_columns(batch)
                .stage_context(STAGE, format!("{name} split is missing numerical columns"))?;
        }

        let report = DriftReport::compute(&train, &test, self.config.drift_threshold)
            .stage_context(STAGE, "drift computation failed")?;
        let report_path = self.layout.drift_report_path();
        report
            .write_yaml(&report_path)
            .stage_context(STAGE, "failed to write drift report")?;

        let artifact = if report.status() {
            let paths = SplitPaths {
                train_path: self.layout.valid_train_path(),
                test_path: self.layout.valid_test_path(),
            };
            copy_splits(ingestion, &paths)?;
            info!(columns = report.columns.len(), "No drift detected");
            ValidationArtifact::Valid {
                paths,
                drift_report_path: report_path,
            }
        } else {
            let paths = SplitPaths {
                train_path: self.layout.invalid_train_path(),
                test_path: self.layout.invalid_test_path(),
            };
            copy_splits(ingestion, &paths)?;
            let drifted_columns = report.drifted_columns();
            warn!(drifted = ?drifted_columns, "Drift detected between train and test");
            ValidationArtifact::Invalid {
                paths,
                drift_report_path: report_path,
                drifted_columns,
            }
        };
        Ok(artifact)
    }
}

fn copy_splits(ingestion: &IngestionArtifact, to: &SplitPaths) -> Result<(), PipelineError> {
    copy_file(&ingestion.train_path, &to.train_path)?;
    copy_file(&ingestion.test_path, &to.test_path)
}

fn copy_file(from: &Path, to: &Path) -> Result<(), PipelineError> {
    if let Some(parent) = to.parent() {
        std::fs::create_dir_all(parent)
            .stage_context(STAGE, format!("failed to create {}", parent.display()))?;
    }
    std::fs::copy(from, to).stage_context(
        STAGE,
        format!("failed to copy {} to {}", from.display(), to.display()),
    )?;
    Ok(())
}
