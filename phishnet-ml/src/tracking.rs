//! Experiment tracking sinks.
//!
//! A tracker receives one [`RunRecord`] per successful training run. Tracking
//! is a side channel: the orchestrator logs a failed `log_run` as a warning
//! and carries on.

use crate::artifacts::MetricRecord;
use crate::config::{Credentials, TrackingBackend, TrackingConfig};
use crate::error::MlError;
use crate::persistence::{atomic_write_json, load_json};
use crate::search::{FamilyReport, TrialRecord};
use crate::stages::TrainingOutcome;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Everything a sink needs to know about one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    pub id: String,
    pub experiment: String,
    /// The run's artifact timestamp.
    pub run_name: String,
    pub model_family: String,
    pub params: Value,
    pub train_metric: MetricRecord,
    pub test_metric: MetricRecord,
    pub model_path: PathBuf,
    pub model_sha256: String,
    #[serde(default)]
    pub trials: Vec<TrialRecord>,
    #[serde(default)]
    pub families: Vec<FamilyReport>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl RunRecord {
    pub fn from_outcome(experiment: &str, run_name: &str, outcome: &TrainingOutcome) -> Self {
        let artifact = &outcome.artifact;
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            experiment: experiment.to_string(),
            run_name: run_name.to_string(),
            model_family: artifact.model_family.clone(),
            params: artifact.params.clone(),
            train_metric: artifact.train_metric,
            test_metric: artifact.test_metric,
            model_path: artifact.final_model_path.clone(),
            model_sha256: artifact.model_sha256.clone(),
            trials: outcome.trials.clone(),
            families: outcome.families.clone(),
            warnings: outcome.warnings.clone(),
            created_at: Utc::now(),
        }
    }

    /// Metrics flattened to `train_<name>` / `test_<name>` pairs.
    pub fn flat_metrics(&self) -> Vec<(String, f64)> {
        let prefixed = |prefix: &str, record: &MetricRecord| {
            record
                .named_values()
                .into_iter()
                .map(|(name, value)| (format!("{prefix}_{name}"), value))
                .collect::<Vec<_>>()
        };
        let mut metrics = prefixed("train", &self.train_metric);
        metrics.extend(prefixed("test", &self.test_metric));
        metrics
    }

    /// Parameters flattened to strings; the `algorithm` tag is kept as-is.
    pub fn flat_params(&self) -> Vec<(String, String)> {
        let mut params = vec![("model_family".to_string(), self.model_family.clone())];
        if let Value::Object(map) = &self.params {
            for (key, value) in map {
                let text = match value {
                    Value::String(s) => s.clone(),
                    Value::Null => "None".to_string(),
                    other => other.to_string(),
                };
                params.push((key.clone(), text));
            }
        }
        params
    }
}

#[async_trait]
pub trait ExperimentTracker: Send + Sync {
    fn name(&self) -> &'static str;

    async fn log_run(&self, record: &RunRecord) -> Result<(), MlError>;
}

/// Build the sink selected by `config`. `artifact_dir` anchors the file
/// registry; `credentials` are the resolved secrets for the MLflow server.
pub fn tracker_from_config(
    config: &TrackingConfig,
    artifact_dir: &Path,
    credentials: Option<Credentials>,
) -> Result<Box<dyn ExperimentTracker>, MlError> {
    Ok(match (config.backend, &config.tracking_uri) {
        (TrackingBackend::File, _) => Box::new(FileTracker::new(artifact_dir.join(&config.registry_file))),
        (TrackingBackend::Mlflow, Some(uri)) => Box::new(MlflowTracker::new(
            uri.clone(),
            config.experiment_name.clone(),
            credentials,
        )?),
        _ => Box::new(NoopTracker),
    })
}

// ---------------------------------------------------------------------------
// NoopTracker
// ---------------------------------------------------------------------------

pub struct NoopTracker;

#[async_trait]
impl ExperimentTracker for NoopTracker {
    fn name(&self) -> &'static str {
        "none"
    }

    async fn log_run(&self, _record: &RunRecord) -> Result<(), MlError> {
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// FileTracker
// ---------------------------------------------------------------------------

/// Registry of tracked runs, persisted as one JSON document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExperimentRegistry {
    pub runs: Vec<RunRecord>,
}

impl ExperimentRegistry {
    pub fn load(path: &Path) -> Result<Self, MlError> {
        Ok(load_json(path)?.unwrap_or_default())
    }

    pub fn save(&self, path: &Path) -> Result<(), MlError> {
        atomic_write_json(path, self)?;
        Ok(())
    }

    pub fn add(&mut self, run: RunRecord) {
        self.runs.push(run);
    }

    /// Runs of one experiment ordered by test score, best first.
    pub fn leaderboard(&self, experiment: &str) -> Vec<&RunRecord> {
        let mut runs: Vec<&RunRecord> = self
            .runs
            .iter()
            .filter(|r| r.experiment == experiment)
            .collect();
        runs.sort_by(|a, b| b.test_metric.score().total_cmp(&a.test_metric.score()));
        runs
    }
}

/// Appends runs to a local `experiments.json`.
pub struct FileTracker {
    path: PathBuf,
}

impl FileTracker {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ExperimentTracker for FileTracker {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn log_run(&self, record: &RunRecord) -> Result<(), MlError> {
        let path = self.path.clone();
        let record = record.clone();
        tokio::task::spawn_blocking(move || {
            let mut registry = ExperimentRegistry::load(&path)?;
            registry.add(record);
            registry.save(&path)?;
            debug!(path = %path.display(), runs = registry.runs.len(), "Experiment registry updated");
            Ok::<_, MlError>(())
        })
        .await
        .map_err(|e| MlError::model(format!("registry worker failed: {e}")))?
    }
}

// ---------------------------------------------------------------------------
// MlflowTracker
// ---------------------------------------------------------------------------

/// MLflow tracking server over its REST API.
pub struct MlflowTracker {
    base_url: String,
    experiment_name: String,
    credentials: Option<Credentials>,
    client: reqwest::Client,
}

impl MlflowTracker {
    pub fn new(
        base_url: String,
        experiment_name: String,
        credentials: Option<Credentials>,
    ) -> Result<Self, MlError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            experiment_name,
            credentials,
            client,
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}/api/2.0/{endpoint}", self.base_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.credentials {
            Some(credentials) => credentials.apply(request),
            None => request,
        }
    }

    async fn send(&self, request: reqwest::RequestBuilder, what: &str) -> Result<Value, MlError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| MlError::upstream(format!("mlflow {what} request failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(MlError::upstream(format!(
                "mlflow {what} returned {status}: {body}"
            )));
        }
        let text = response.text().await?;
        if text.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&text)?)
    }

    async fn experiment_id(&self) -> Result<String, MlError> {
        let lookup = self
            .authorize(
                self.client
                    .get(self.url("mlflow/experiments/get-by-name"))
                    .query(&[("experiment_name", &self.experiment_name)]),
            )
            .send()
            .await
            .map_err(|e| MlError::upstream(format!("mlflow experiment lookup failed: {e}")))?;

        if lookup.status().is_success() {
            let body: Value = lookup.json().await?;
            if let Some(id) = body["experiment"]["experiment_id"].as_str() {
                return Ok(id.to_string());
            }
        } else if lookup.status() != reqwest::StatusCode::NOT_FOUND {
            return Err(MlError::upstream(format!(
                "mlflow experiment lookup returned {}",
                lookup.status()
            )));
        }

        let created = self
            .send(
                self.client
                    .post(self.url("mlflow/experiments/create"))
                    .json(&json!({ "name": self.experiment_name })),
                "experiment create",
            )
            .await?;
        created["experiment_id"]
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| MlError::upstream("mlflow experiment create returned no id"))
    }

    async fn upload_model(&self, artifact_path: &str, record: &RunRecord) -> Result<(), MlError> {
        let bytes = tokio::fs::read(&record.model_path).await?;
        let file_name = record
            .model_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "model.bin".to_string());
        let url = format!(
            "{}/api/2.0/mlflow-artifacts/artifacts/{artifact_path}/model/{file_name}",
            self.base_url
        );
        self.send(self.client.put(url).body(bytes), "artifact upload")
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ExperimentTracker for MlflowTracker {
    fn name(&self) -> &'static str {
        "mlflow"
    }

    async fn log_run(&self, record: &RunRecord) -> Result<(), MlError> {
        let experiment_id = self.experiment_id().await?;
        let started = record.created_at.timestamp_millis();

        let created = self
            .send(
                self.client.post(self.url("mlflow/runs/create")).json(&json!({
                    "experiment_id": experiment_id,
                    "run_name": record.run_name,
                    "start_time": started,
                    "tags": [{ "key": "model_sha256", "value": record.model_sha256 }],
                })),
                "run create",
            )
            .await?;
        let info = &created["run"]["info"];
        let run_id = info["run_id"]
            .as_str()
            .ok_or_else(|| MlError::upstream("mlflow run create returned no run_id"))?
            .to_string();

        let metrics: Vec<Value> = record
            .flat_metrics()
            .into_iter()
            .map(|(key, value)| json!({ "key": key, "value": value, "timestamp": started, "step": 0 }))
            .collect();
        let params: Vec<Value> = record
            .flat_params()
            .into_iter()
            .map(|(key, value)| json!({ "key": key, "value": value }))
            .collect();
        self.send(
            self.client.post(self.url("mlflow/runs/log-batch")).json(&json!({
                "run_id": run_id,
                "metrics": metrics,
                "params": params,
            })),
            "log-batch",
        )
        .await?;

        // Artifact URIs look like `mlflow-artifacts:/<experiment>/<run>/artifacts`.
        let artifact_path = info["artifact_uri"]
            .as_str()
            .and_then(|uri| uri.strip_prefix("mlflow-artifacts:/"))
            .map(|p| p.trim_start_matches('/').to_string())
            .unwrap_or_else(|| format!("{experiment_id}/{run_id}/artifacts"));
        self.upload_model(&artifact_path, record).await?;

        self.send(
            self.client.post(self.url("mlflow/runs/update")).json(&json!({
                "run_id": run_id,
                "status": "FINISHED",
                "end_time": Utc::now().timestamp_millis(),
            })),
            "run update",
        )
        .await?;

        info!(run_id = %run_id, experiment = %self.experiment_name, "Run logged to MLflow");
        Ok(())
    }
}
