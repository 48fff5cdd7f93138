//! Training pipeline orchestrator.
//!
//! Runs ingestion, validation, transformation and training in order, stops
//! cleanly on drift, and mirrors the run when training succeeds. Every state
//! change is logged and kept in the run history, which is written to
//! `run_summary.json` at the end of the run.

use crate::artifacts::{IngestionArtifact, TrainerArtifact, TransformationArtifact, ValidationArtifact};
use crate::config::{Credentials, PipelineConfig, ResolvedCredentials};
use crate::data::{DataSource, source_from_config};
use crate::error::{PipelineError, StageContext, StageKind};
use crate::layout::ArtifactLayout;
use crate::persistence::atomic_write_json;
use crate::stages::{DataIngestion, DataTransformation, DataValidation, ModelTrainer};
use crate::sync::{ArtifactSync, SyncOutcome};
use crate::tracking::{ExperimentTracker, RunRecord, tracker_from_config};
use chrono::{DateTime, Local, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

/// Where a run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineState {
    Idle,
    Ingesting,
    Validating,
    Transforming,
    Training,
    Syncing,
    /// Trained and mirrored.
    Synced,
    /// Trained, but the mirror failed or is disabled.
    Unsynced,
    /// Drift detected; nothing was trained.
    Rejected,
    Failed,
}

impl PipelineState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Synced | Self::Unsynced | Self::Rejected | Self::Failed
        )
    }

    pub fn can_transition_to(&self, next: PipelineState) -> bool {
        use PipelineState::*;
        match (self, next) {
            (Idle, Ingesting)
            | (Ingesting, Validating)
            | (Validating, Transforming)
            | (Validating, Rejected)
            | (Transforming, Training)
            | (Training, Syncing)
            | (Syncing, Synced)
            | (Syncing, Unsynced) => true,
            (current, Failed) => !current.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Ingesting => "ingesting",
            Self::Validating => "validating",
            Self::Transforming => "transforming",
            Self::Training => "training",
            Self::Syncing => "syncing",
            Self::Synced => "synced",
            Self::Unsynced => "unsynced",
            Self::Rejected => "rejected",
            Self::Failed => "failed",
        };
        write!(f, "{name}")
    }
}

/// A recorded state change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateTransition {
    pub from: PipelineState,
    pub to: PipelineState,
    pub at: DateTime<Utc>,
}

/// How a run that did not error ended.
#[derive(Debug, Clone)]
pub enum PipelineOutcome {
    Completed {
        trainer: TrainerArtifact,
        sync: SyncOutcome,
    },
    Rejected {
        validation: ValidationArtifact,
    },
}

/// Written to `run_summary.json` in the run root.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub timestamp: String,
    pub state: PipelineState,
    pub history: Vec<StateTransition>,
    pub ingestion: Option<IngestionArtifact>,
    pub validation: Option<ValidationArtifact>,
    pub transformation: Option<TransformationArtifact>,
    pub trainer: Option<TrainerArtifact>,
    pub sync: Option<SyncOutcome>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub error: Option<String>,
}

impl RunSummary {
    fn new(timestamp: &str) -> Self {
        Self {
            timestamp: timestamp.to_string(),
            state: PipelineState::Idle,
            history: Vec::new(),
            ingestion: None,
            validation: None,
            transformation: None,
            trainer: None,
            sync: None,
            warnings: Vec::new(),
            error: None,
        }
    }
}

pub struct TrainingPipeline {
    config: PipelineConfig,
    layout: ArtifactLayout,
    source: Box<dyn DataSource>,
    tracker: Box<dyn ExperimentTracker>,
    state: PipelineState,
    history: Vec<StateTransition>,
}

impl TrainingPipeline {
    /// Pipeline for a run starting now (local time names the run root).
    pub fn new(config: PipelineConfig) -> Result<Self, PipelineError> {
        Self::starting_at(config, &Local::now())
    }

    pub fn starting_at<Tz: TimeZone>(
        config: PipelineConfig,
        started_at: &DateTime<Tz>,
    ) -> Result<Self, PipelineError>
    where
        Tz::Offset: fmt::Display,
    {
        config.validate()?;
        let layout = ArtifactLayout::new(&config, started_at);
        let source = source_from_config(&config.ingestion.source, None);
        let tracker = build_tracker(&config, None)?;
        Ok(Self {
            config,
            layout,
            source,
            tracker,
            state: PipelineState::Idle,
            history: Vec::new(),
        })
    }

    /// Rebuild the configured source and tracker with resolved secrets. Call
    /// before `with_source` or `with_tracker`, which replace them outright.
    pub fn with_credentials(
        mut self,
        credentials: ResolvedCredentials,
    ) -> Result<Self, PipelineError> {
        self.source = source_from_config(&self.config.ingestion.source, credentials.source);
        self.tracker = build_tracker(&self.config, credentials.tracking)?;
        Ok(self)
    }

    /// Replace the upstream source built from config.
    pub fn with_source(mut self, source: Box<dyn DataSource>) -> Self {
        self.source = source;
        self
    }

    /// Replace the tracking sink built from config.
    pub fn with_tracker(mut self, tracker: Box<dyn ExperimentTracker>) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn layout(&self) -> &ArtifactLayout {
        &self.layout
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn history(&self) -> &[StateTransition] {
        &self.history
    }

    /// Run every stage once. Stage errors propagate unchanged after the run
    /// is marked `Failed` and its summary written.
    ///
    /// A pipeline owns a single timestamped run root, so only an `Idle`
    /// pipeline can run; later calls fail without touching the run root.
    pub async fn run(&mut self) -> Result<PipelineOutcome, PipelineError> {
        if self.state != PipelineState::Idle {
            return Err(PipelineError::Precondition {
                stage: StageKind::Ingestion,
                message: format!(
                    "pipeline already ran (state: {}); build a new pipeline for another run",
                    self.state
                ),
            });
        }
        let mut summary = RunSummary::new(self.layout.timestamp());
        info!(
            pipeline = %self.config.artifacts.pipeline_name,
            run_root = %self.layout.run_root().display(),
            "Training pipeline started"
        );

        let result = self.execute(&mut summary).await;
        if let Err(e) = &result {
            if !self.state.is_terminal() {
                self.transition(PipelineState::Failed);
            }
            summary.error = Some(e.to_string());
        }
        self.write_summary(&mut summary);
        result
    }

    async fn execute(&mut self, summary: &mut RunSummary) -> Result<PipelineOutcome, PipelineError> {
        self.transition(PipelineState::Ingesting);
        let ingestion = DataIngestion::new(self.config.ingestion.clone(), self.layout.clone())
            .run(&*self.source)
            .await?;
        summary.ingestion = Some(ingestion.clone());

        self.transition(PipelineState::Validating);
        let stage = DataValidation::new(self.config.validation.clone(), self.layout.clone());
        let validation = blocking(StageKind::Validation, move || stage.run(&ingestion)).await?;
        summary.validation = Some(validation.clone());

        if !validation.status() {
            self.transition(PipelineState::Rejected);
            warn!(
                drifted = ?validation.drifted_columns(),
                report = %validation.drift_report_path().display(),
                "Run rejected by the drift gate"
            );
            return Ok(PipelineOutcome::Rejected { validation });
        }

        self.transition(PipelineState::Transforming);
        let stage = DataTransformation::new(
            self.config.transformation.clone(),
            self.config.trainer.task,
            self.layout.clone(),
        );
        let validated = validation.clone();
        let transformation =
            blocking(StageKind::Transformation, move || stage.run(&validated)).await?;
        summary.transformation = Some(transformation.clone());

        self.transition(PipelineState::Training);
        let stage = ModelTrainer::new(self.config.trainer.clone(), self.layout.clone());
        let training = blocking(StageKind::Training, move || stage.run(&transformation)).await?;
        summary.trainer = Some(training.artifact.clone());
        summary.warnings = training.warnings.clone();

        let record = RunRecord::from_outcome(
            &self.config.tracking.experiment_name,
            self.layout.timestamp(),
            &training,
        );
        if let Err(e) = self.tracker.log_run(&record).await {
            warn!(sink = self.tracker.name(), error = %e, "Experiment tracking failed");
        }

        self.transition(PipelineState::Syncing);
        // Checkpoint so the mirrored run root carries a summary.
        self.write_summary(summary);
        let sync = self.mirror().await;
        self.transition(if sync.is_synced() {
            PipelineState::Synced
        } else {
            PipelineState::Unsynced
        });
        summary.sync = Some(sync.clone());

        Ok(PipelineOutcome::Completed {
            trainer: training.artifact,
            sync,
        })
    }

    async fn mirror(&self) -> SyncOutcome {
        if !self.config.sync.enabled {
            info!("Mirror disabled; run stays local");
            return SyncOutcome::Disabled;
        }
        match ArtifactSync::new(self.config.sync.clone())
            .mirror_run(&self.layout)
            .await
        {
            Ok(report) => SyncOutcome::Synced(report),
            Err(e) => {
                warn!(error = %e, "Mirror failed; training result kept locally");
                SyncOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    fn transition(&mut self, to: PipelineState) {
        let from = self.state;
        debug_assert!(
            from.can_transition_to(to),
            "illegal pipeline transition {from} -> {to}"
        );
        info!(from = %from, to = %to, "Pipeline state changed");
        self.history.push(StateTransition {
            from,
            to,
            at: Utc::now(),
        });
        self.state = to;
    }

    fn write_summary(&self, summary: &mut RunSummary) {
        summary.state = self.state;
        summary.history = self.history.clone();
        let path = self.layout.run_summary_path();
        if let Err(e) = atomic_write_json(&path, summary) {
            warn!(path = %path.display(), error = %e, "Failed to write run summary");
        }
    }
}

fn build_tracker(
    config: &PipelineConfig,
    credentials: Option<Credentials>,
) -> Result<Box<dyn ExperimentTracker>, PipelineError> {
    tracker_from_config(&config.tracking, &config.artifacts.artifact_dir, credentials)
        .map_err(|e| PipelineError::Config(format!("tracking sink: {e}")))
}

/// Run a CPU-bound stage on the blocking pool.
async fn blocking<T, F>(stage: StageKind, work: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, PipelineError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .stage_context(stage, "stage worker panicked")?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_legal_transitions() {
        use PipelineState::*;
        assert!(Idle.can_transition_to(Ingesting));
        assert!(Validating.can_transition_to(Rejected));
        assert!(Syncing.can_transition_to(Unsynced));
        assert!(Training.can_transition_to(Failed));
        assert!(!Rejected.can_transition_to(Failed));
        assert!(!Validating.can_transition_to(Training));
        assert!(!Idle.can_transition_to(Synced));
    }

    #[test]
    fn test_terminal_states() {
        use PipelineState::*;
        for state in [Synced, Unsynced, Rejected, Failed] {
            assert!(state.is_terminal());
        }
        for state in [Idle, Ingesting, Validating, Transforming, Training, Syncing] {
            assert!(!state.is_terminal());
        }
    }

    #[test]
    fn test_invalid_config_is_rejected_up_front() {
        let mut config = PipelineConfig::default();
        config.ingestion.test_size = 1.5;
        assert!(matches!(
            TrainingPipeline::new(config),
            Err(PipelineError::Config(_))
        ));
    }

    #[tokio::test]
    async fn test_second_run_is_refused() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut config = PipelineConfig::default();
        config.artifacts.artifact_dir = dir.path().join("artifacts");
        config.ingestion.source = crate::config::SourceConfig::Csv {
            path: dir.path().join("missing.csv"),
        };
        let mut pipeline = TrainingPipeline::new(config).unwrap();

        assert!(pipeline.run().await.is_err());
        assert_eq!(pipeline.state(), PipelineState::Failed);
        let history = pipeline.history().len();

        let err = pipeline.run().await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Precondition {
                stage: StageKind::Ingestion,
                ..
            }
        ));
        assert!(err.to_string().contains("already ran"));
        assert_eq!(pipeline.state(), PipelineState::Failed);
        assert_eq!(pipeline.history().len(), history);
    }

    #[test]
    fn test_with_credentials_rebuilds_source_and_tracker() {
        let mut config = PipelineConfig::default();
        config.ingestion.source = crate::config::SourceConfig::Api {
            url: "https://example.test/rows".into(),
            credentials: None,
            timeout_secs: 5,
        };
        config.tracking.backend = crate::config::TrackingBackend::Mlflow;
        config.tracking.tracking_uri = Some("http://localhost:5000".into());
        let credentials = ResolvedCredentials {
            source: Some(Credentials::Bearer { token: "t".into() }),
            tracking: None,
        };

        let pipeline = TrainingPipeline::new(config)
            .unwrap()
            .with_credentials(credentials)
            .unwrap();
        assert_eq!(pipeline.source.source_info().source_type, "api");
        assert_eq!(pipeline.tracker.name(), "mlflow");
    }

    #[test]
    fn test_state_serialises_snake_case() {
        assert_eq!(
            serde_json::to_string(&PipelineState::Unsynced).unwrap(),
            "\"unsynced\""
        );
        assert_eq!(PipelineState::Transforming.to_string(), "transforming");
    }
}
