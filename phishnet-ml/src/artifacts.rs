//! Typed artifacts handed from one stage to the next.
//!
//! Each artifact is created by exactly one stage, never mutated afterwards and
//! only points at files on disk (or carries what a stage measured).

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Output of the ingestion stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestionArtifact {
    pub feature_store_path: PathBuf,
    pub train_path: PathBuf,
    pub test_path: PathBuf,
    pub train_rows: usize,
    pub test_rows: usize,
}

/// A train/test file pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SplitPaths {
    pub train_path: PathBuf,
    pub test_path: PathBuf,
}

/// Output of the validation stage. Which pair exists is fixed by the variant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ValidationArtifact {
    /// No column drifted; the splits were copied under `valid/`.
    Valid {
        paths: SplitPaths,
        drift_report_path: PathBuf,
    },
    /// At least one column drifted; the splits were copied under `invalid/`.
    Invalid {
        paths: SplitPaths,
        drift_report_path: PathBuf,
        drifted_columns: Vec<String>,
    },
}

impl ValidationArtifact {
    /// `true` when no drift was detected.
    pub fn status(&self) -> bool {
        matches!(self, Self::Valid { .. })
    }

    pub fn valid_paths(&self) -> Option<&SplitPaths> {
        match self {
            Self::Valid { paths, .. } => Some(paths),
            Self::Invalid { .. } => None,
        }
    }

    pub fn invalid_paths(&self) -> Option<&SplitPaths> {
        match self {
            Self::Valid { .. } => None,
            Self::Invalid { paths, .. } => Some(paths),
        }
    }

    pub fn drift_report_path(&self) -> &PathBuf {
        match self {
            Self::Valid {
                drift_report_path, ..
            }
            | Self::Invalid {
                drift_report_path, ..
            } => drift_report_path,
        }
    }

    pub fn drifted_columns(&self) -> &[String] {
        match self {
            Self::Valid { .. } => &[],
            Self::Invalid {
                drifted_columns, ..
            } => drifted_columns,
        }
    }
}

/// Output of the transformation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformationArtifact {
    pub transformed_train_path: PathBuf,
    pub transformed_test_path: PathBuf,
    pub transformer_path: PathBuf,
    /// Feature columns in matrix order; the label is stored after them.
    pub feature_columns: Vec<String>,
}

/// Evaluation snapshot for a classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationMetric {
    pub f1_score: f64,
    pub precision_score: f64,
    pub recall_score: f64,
}

/// Evaluation snapshot for a regressor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetric {
    pub rmse: f64,
    pub mae: f64,
    pub r2_score: f64,
}

/// Either kind of snapshot, depending on the task.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MetricRecord {
    Classification(ClassificationMetric),
    Regression(RegressionMetric),
}

impl MetricRecord {
    /// The selection score: F1 for classification, R² for regression.
    pub fn score(&self) -> f64 {
        match self {
            Self::Classification(m) => m.f1_score,
            Self::Regression(m) => m.r2_score,
        }
    }

    /// Flat name/value pairs for tracking sinks.
    pub fn named_values(&self) -> Vec<(&'static str, f64)> {
        match self {
            Self::Classification(m) => vec![
                ("f1_score", m.f1_score),
                ("precision", m.precision_score),
                ("recall_score", m.recall_score),
            ],
            Self::Regression(m) => vec![("rmse", m.rmse), ("mae", m.mae), ("r2_score", m.r2_score)],
        }
    }
}

/// Output of the training stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainerArtifact {
    pub trained_model_path: PathBuf,
    pub final_model_path: PathBuf,
    pub model_family: String,
    pub params: serde_json::Value,
    pub train_metric: MetricRecord,
    pub test_metric: MetricRecord,
    pub model_sha256: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> SplitPaths {
        SplitPaths {
            train_path: PathBuf::from("train.csv"),
            test_path: PathBuf::from("test.csv"),
        }
    }

    #[test]
    fn test_validation_artifact_exposes_one_pair() {
        let valid = ValidationArtifact::Valid {
            paths: paths(),
            drift_report_path: PathBuf::from("report.yaml"),
        };
        assert!(valid.status());
        assert!(valid.valid_paths().is_some());
        assert!(valid.invalid_paths().is_none());

        let invalid = ValidationArtifact::Invalid {
            paths: paths(),
            drift_report_path: PathBuf::from("report.yaml"),
            drifted_columns: vec!["URL_Length".into()],
        };
        assert!(!invalid.status());
        assert!(invalid.valid_paths().is_none());
        assert_eq!(invalid.drifted_columns(), ["URL_Length".to_string()]);
    }

    #[test]
    fn test_validation_artifact_serde_tag() {
        let valid = ValidationArtifact::Valid {
            paths: paths(),
            drift_report_path: PathBuf::from("report.yaml"),
        };
        let json = serde_json::to_value(&valid).unwrap();
        assert_eq!(json["outcome"], "valid");
        let back: ValidationArtifact = serde_json::from_value(json).unwrap();
        assert_eq!(back, valid);
    }

    #[test]
    fn test_metric_record_score() {
        let m = MetricRecord::Regression(RegressionMetric {
            rmse: 0.5,
            mae: 0.4,
            r2_score: 0.81,
        });
        assert_eq!(m.score(), 0.81);
        assert_eq!(m.named_values().len(), 3);
    }
}
