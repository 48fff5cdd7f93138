//! # phishnet-ml: training pipeline for the phishing-URL classifier
//!
//! Pulls a tabular collection, splits it, gates it on schema conformance and
//! train/test drift, imputes missing features, searches a grid of classical
//! models and publishes the winner as a single "preprocess then predict" file.
//!
//! ```text
//! ingest -> validate -> (rejected | transform -> train -> track -> mirror)
//! ```
//!
//! Everything a stage produces is an artifact on disk; the orchestrator in
//! [`pipeline`] threads them from one stage to the next.

// Foundation
pub mod config;
pub mod error;
pub mod layout;
pub mod persistence;

// Data and artifacts
pub mod artifacts;
pub mod data;
pub mod npy;

// Statistics and models
pub mod algorithms;
pub mod drift;
pub mod features;
pub mod metrics;
pub mod predictor;
pub mod search;
pub mod stats;

// Stages and orchestration
pub mod pipeline;
pub mod stages;
pub mod sync;
pub mod tracking;

// Re-exports
pub use artifacts::{
    ClassificationMetric, IngestionArtifact, MetricRecord, RegressionMetric, TrainerArtifact,
    TransformationArtifact, ValidationArtifact,
};
pub use config::{PipelineConfig, ResolvedCredentials, TaskKind, load_config};
pub use drift::DriftReport;
pub use error::{MlError, PipelineError, StageKind, SyncError};
pub use layout::ArtifactLayout;
pub use pipeline::{PipelineOutcome, PipelineState, RunSummary, TrainingPipeline};
pub use predictor::{ComposedPredictor, PREDICTION_COLUMN, PredictionSummary, predict_csv};
pub use sync::SyncOutcome;
pub use tracking::ExperimentTracker;
