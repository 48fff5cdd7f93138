//! Error types for the phishnet-ml crate.
//!
//! `MlError` is what individual operations return; `PipelineError` is what a
//! stage surfaces to the orchestrator, tagged with the stage that raised it.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::panic::Location;
use thiserror::Error;

/// Low-level error type for data, model and I/O operations.
#[derive(Debug, Error)]
pub enum MlError {
    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("Schema error: {0}")]
    Schema(String),

    #[error("Model error: {0}")]
    Model(String),

    #[error("Array format error: {0}")]
    ArrayFormat(String),

    #[error("Upstream source error: {0}")]
    Upstream(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

impl MlError {
    pub fn dataset(msg: impl Into<String>) -> Self {
        Self::Dataset(msg.into())
    }

    pub fn schema(msg: impl Into<String>) -> Self {
        Self::Schema(msg.into())
    }

    pub fn model(msg: impl Into<String>) -> Self {
        Self::Model(msg.into())
    }

    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Upstream(msg.into())
    }

    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }
}

/// The pipeline stage an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageKind {
    Ingestion,
    Validation,
    Transformation,
    Training,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Ingestion => "data ingestion",
            Self::Validation => "data validation",
            Self::Transformation => "data transformation",
            Self::Training => "model training",
        };
        f.write_str(name)
    }
}

/// Call-site captured when a stage error is raised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: &'static str,
    pub line: u32,
}

impl SourceLocation {
    #[track_caller]
    pub fn caller() -> Self {
        let loc = Location::caller();
        Self {
            file: loc.file(),
            line: loc.line(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)
    }
}

type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Domain error returned by stages and the orchestrator.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A stage aborted on an I/O, input or library failure.
    #[error("{stage} failed at [{location}]: {message}")]
    Stage {
        stage: StageKind,
        message: String,
        location: SourceLocation,
        #[source]
        source: Option<BoxError>,
    },

    /// The best candidate scored below the absolute floor.
    #[error("quality gate failed: best model score {score:.4} is below the floor {floor:.4}")]
    QualityGate { score: f64, floor: f64 },

    /// A stage was invoked with an artifact it must not consume.
    #[error("precondition violated for {stage}: {message}")]
    Precondition { stage: StageKind, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl PipelineError {
    /// Stage failure without an underlying cause.
    #[track_caller]
    pub fn stage(stage: StageKind, message: impl Into<String>) -> Self {
        Self::Stage {
            stage,
            message: message.into(),
            location: SourceLocation::caller(),
            source: None,
        }
    }

    /// Stage failure wrapping the original cause.
    #[track_caller]
    pub fn stage_with<E>(stage: StageKind, message: impl Into<String>, cause: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Stage {
            stage,
            message: message.into(),
            location: SourceLocation::caller(),
            source: Some(Box::new(cause)),
        }
    }

    pub fn precondition(stage: StageKind, message: impl Into<String>) -> Self {
        Self::Precondition {
            stage,
            message: message.into(),
        }
    }

    /// The stage this error is attributed to, if any.
    pub fn stage_kind(&self) -> Option<StageKind> {
        match self {
            Self::Stage { stage, .. } | Self::Precondition { stage, .. } => Some(*stage),
            Self::QualityGate { .. } => Some(StageKind::Training),
            Self::Config(_) => None,
        }
    }
}

/// Attach a stage tag and call-site to a fallible operation.
pub trait StageContext<T> {
    fn stage_context(self, stage: StageKind, message: impl Into<String>) -> Result<T, PipelineError>;
}

impl<T, E> StageContext<T> for Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    #[track_caller]
    fn stage_context(self, stage: StageKind, message: impl Into<String>) -> Result<T, PipelineError> {
        match self {
            Ok(value) => Ok(value),
            Err(cause) => Err(PipelineError::stage_with(stage, message, cause)),
        }
    }
}

/// Failure of the best-effort mirror step. Never unwinds a training result.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("local directory not found: {0}")]
    MissingDirectory(std::path::PathBuf),

    #[error("unsupported mirror target: {0}")]
    UnsupportedTarget(String),

    #[error("sync command `{command}` exited with status {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr: String,
    },

    #[error("sync command `{command}` timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("walk error: {0}")]
    Walk(#[from] walkdir::Error),
}
